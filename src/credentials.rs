//! Encrypted credential store
//!
//! Persists the single connection profile under the user's private data
//! directory. Two files live side by side:
//!
//! - `encryption-keys.json`: `{"key": <base64 32 bytes>, "iv": <base64 16 bytes>}`,
//!   created once on first use
//! - `user-config.enc`: base64 of `nonce || XChaCha20-Poly1305 ciphertext`
//!
//! Every save draws a fresh 24-byte nonce. The persisted IV is bound in as
//! associated data, so a blob only opens with the key file it was sealed with.
//!
//! If the key file cannot be read or written the store keeps working with
//! process-lifetime keys; saved configuration then does not survive a restart.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::models::CredentialBlob;

pub const KEY_FILE: &str = "encryption-keys.json";
pub const BLOB_FILE: &str = "user-config.enc";

const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;
const NONCE_LEN: usize = 24;
const TAG_LEN: usize = 16;

/// Default store directory (`~/.local/share/echolingo` on Linux)
pub fn default_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("echolingo"))
}

// =============================================================================
// Key Material
// =============================================================================

#[derive(Serialize, Deserialize)]
struct KeyFile {
    key: String,
    iv: String,
}

/// Symmetric key and IV. `persisted` is false for process-lifetime keys.
#[derive(Clone)]
pub struct KeyMaterial {
    key: [u8; KEY_LEN],
    iv: [u8; IV_LEN],
    persisted: bool,
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("key", &"***")
            .field("persisted", &self.persisted)
            .finish()
    }
}

impl KeyMaterial {
    /// Fresh random key material, not written anywhere
    pub fn ephemeral() -> Self {
        let mut key = [0u8; KEY_LEN];
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut key);
        OsRng.fill_bytes(&mut iv);
        Self {
            key,
            iv,
            persisted: false,
        }
    }

    /// Read the key file at `path`, creating it if absent.
    ///
    /// Never fails: when the file cannot be read, parsed or written, returns
    /// ephemeral keys and logs the degradation.
    pub async fn load_or_create(path: &Path) -> Self {
        match Self::try_load_or_create(path).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(
                    "{}; using temporary keys, configuration will not survive a restart",
                    Error::EncryptionUnavailable(e.to_string())
                );
                Self::ephemeral()
            }
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    async fn try_load_or_create(path: &Path) -> Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                let file: KeyFile = serde_json::from_str(&content)
                    .map_err(|e| Error::EncryptionUnavailable(format!("malformed key file: {}", e)))?;
                let key = decode_fixed::<KEY_LEN>(&file.key, "key")?;
                let iv = decode_fixed::<IV_LEN>(&file.iv, "iv")?;
                debug!(path = %path.display(), "loaded key material");
                Ok(Self {
                    key,
                    iv,
                    persisted: true,
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let mut keys = Self::ephemeral();
                let file = KeyFile {
                    key: BASE64.encode(keys.key),
                    iv: BASE64.encode(keys.iv),
                };
                let content = serde_json::to_string_pretty(&file)
                    .map_err(|e| Error::EncryptionUnavailable(e.to_string()))?;
                write_private(path, content.as_bytes()).await?;
                keys.persisted = true;
                info!(path = %path.display(), "created new key material");
                Ok(keys)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let cipher = XChaCha20Poly1305::new_from_slice(&self.key)
            .map_err(|e| Error::EncryptionUnavailable(format!("invalid key: {}", e)))?;

        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = cipher
            .encrypt(
                XNonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: &self.iv,
                },
            )
            .map_err(|e| Error::EncryptionUnavailable(format!("encryption failed: {}", e)))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    fn open(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < NONCE_LEN + TAG_LEN {
            return Err(Error::ConfigInvalid("encrypted configuration is truncated".to_string()));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);

        let cipher = XChaCha20Poly1305::new_from_slice(&self.key)
            .map_err(|e| Error::EncryptionUnavailable(format!("invalid key: {}", e)))?;
        cipher
            .decrypt(
                XNonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: &self.iv,
                },
            )
            .map_err(|_| Error::ConfigInvalid("authentication tag verification failed".to_string()))
    }
}

fn decode_fixed<const N: usize>(value: &str, field: &str) -> Result<[u8; N]> {
    let bytes = BASE64
        .decode(value.trim())
        .map_err(|e| Error::EncryptionUnavailable(format!("{} is not base64: {}", field, e)))?;
    bytes.try_into().map_err(|bytes: Vec<u8>| {
        Error::EncryptionUnavailable(format!("{} has {} bytes, expected {}", field, bytes.len(), N))
    })
}

/// Write through a temp file in the same directory, then rename over `path`
async fn write_private(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let temp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    tokio::fs::write(&temp_path, content).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = tokio::fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o600)).await;
    }

    #[cfg(windows)]
    {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            tokio::fs::remove_file(path).await?;
        }
    }

    if let Err(e) = tokio::fs::rename(&temp_path, path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e.into());
    }
    Ok(())
}

// =============================================================================
// Credential Store
// =============================================================================

pub struct CredentialStore {
    blob_path: PathBuf,
    keys: KeyMaterial,
    /// Serialises file I/O of this store instance
    io_lock: Mutex<()>,
}

impl CredentialStore {
    /// Open the store in `dir`, loading or creating key material.
    pub async fn open(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let keys = KeyMaterial::load_or_create(&dir.join(KEY_FILE)).await;
        Self {
            blob_path: dir.join(BLOB_FILE),
            keys,
            io_lock: Mutex::new(()),
        }
    }

    /// Whether saved configuration will survive a restart
    pub fn is_persistent(&self) -> bool {
        self.keys.is_persisted()
    }

    pub fn blob_path(&self) -> &Path {
        &self.blob_path
    }

    /// Encrypt and overwrite the stored profile
    pub async fn save(&self, blob: &CredentialBlob) -> Result<()> {
        let _guard = self.io_lock.lock().await;

        let plaintext =
            serde_json::to_vec(blob).map_err(|e| Error::ConfigInvalid(e.to_string()))?;
        let sealed = self.keys.seal(&plaintext)?;
        write_private(&self.blob_path, BASE64.encode(sealed).as_bytes()).await?;

        if !self.keys.is_persisted() {
            warn!("configuration saved with temporary keys and will be unreadable after restart");
        }
        info!(host = %blob.host, "configuration saved");
        Ok(())
    }

    /// Stored profile, or `None` when absent, unreadable or corrupt
    pub async fn load(&self) -> Option<CredentialBlob> {
        let _guard = self.io_lock.lock().await;

        let content = match tokio::fs::read_to_string(&self.blob_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("could not read stored configuration: {}", e);
                return None;
            }
        };

        match self.decode(&content) {
            Ok(blob) => Some(blob),
            Err(e) => {
                warn!("ignoring stored configuration: {}", e);
                None
            }
        }
    }

    /// Delete the stored profile. Key material stays.
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.io_lock.lock().await;
        match tokio::fs::remove_file(&self.blob_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn decode(&self, content: &str) -> Result<CredentialBlob> {
        let sealed = BASE64
            .decode(content.trim())
            .map_err(|e| Error::ConfigInvalid(format!("not base64: {}", e)))?;
        let plaintext = self.keys.open(&sealed)?;
        serde_json::from_slice(&plaintext).map_err(|e| Error::ConfigInvalid(e.to_string()))
    }
}
