//! Data structures and types for EchoLingo
//!
//! Contains the shared models used across the application organized by domain:
//! - **Server**: connection parameters and login credentials for the WebDAV store
//! - **Listing**: directory entries returned by PROPFIND
//! - **Handles**: registered remote files served by the local proxy

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Path prefix used when the user leaves it blank
pub const DEFAULT_PATH_PREFIX: &str = "/dav";

// =============================================================================
// Server Models
// =============================================================================

/// Transport scheme of the remote server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    #[default]
    Https,
}

impl Scheme {
    /// Port used when none is configured
    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "http" => Ok(Scheme::Http),
            "https" => Ok(Scheme::Https),
            other => Err(Error::ConfigInvalid(format!("unsupported scheme '{}'", other))),
        }
    }
}

/// Address of a WebDAV server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    pub path_prefix: String,
}

impl ServerConfig {
    /// `scheme://host:port/prefix`, without a trailing slash
    pub fn base_url(&self) -> String {
        format!(
            "{}://{}:{}{}",
            self.scheme,
            self.host,
            self.port,
            self.path_prefix.trim_end_matches('/')
        )
    }

    /// Absolute URL of `remote_path` below the prefix, each segment percent-encoded.
    ///
    /// A trailing slash on `remote_path` is kept so collection URLs stay collections.
    pub fn url_for(&self, remote_path: &str) -> String {
        let encoded: Vec<String> = remote_path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| urlencoding::encode(s).into_owned())
            .collect();

        let mut url = format!("{}/{}", self.base_url(), encoded.join("/"));
        if remote_path.ends_with('/') && !encoded.is_empty() {
            url.push('/');
        }
        url
    }

    /// Lowercased host name, the key of the auth binding table
    pub fn auth_host(&self) -> String {
        self.host.to_lowercase()
    }
}

impl fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base_url())
    }
}

/// Basic-auth login
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Value for the `Authorization` header
    pub fn basic_token(&self) -> String {
        let raw = format!("{}:{}", self.username, self.password);
        format!("Basic {}", BASE64.encode(raw.as_bytes()))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// The single persisted connection profile
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialBlob {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    pub path_prefix: String,
    pub username: String,
    pub password: String,
}

impl CredentialBlob {
    pub fn server(&self) -> ServerConfig {
        ServerConfig {
            scheme: self.scheme,
            host: self.host.clone(),
            port: self.port,
            path_prefix: self.path_prefix.clone(),
        }
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.username.clone(), self.password.clone())
    }

    /// Validate and fill defaults the way the configuration dialog does:
    /// host is required, port 0 becomes the scheme default, an empty prefix
    /// becomes `/dav`, and the prefix always starts with `/`.
    pub fn normalize(mut self) -> Result<Self> {
        self.host = self.host.trim().to_string();
        if self.host.is_empty() {
            return Err(Error::ConfigInvalid("server address is required".to_string()));
        }
        if self.host.contains("://") || self.host.contains('/') || self.host.contains(' ') {
            return Err(Error::ConfigInvalid(format!(
                "server address '{}' must be a bare host name",
                self.host
            )));
        }

        if self.port == 0 {
            self.port = self.scheme.default_port();
        }

        let prefix = self.path_prefix.trim();
        let prefix = if prefix.is_empty() {
            DEFAULT_PATH_PREFIX.to_string()
        } else if prefix.starts_with('/') {
            prefix.to_string()
        } else {
            format!("/{}", prefix)
        };
        let trimmed = prefix.trim_end_matches('/');
        self.path_prefix = if trimmed.is_empty() {
            "/".to_string()
        } else {
            trimmed.to_string()
        };

        Ok(self)
    }

    /// Copy safe to print: password replaced by asterisks
    pub fn masked(&self) -> Self {
        Self {
            password: "*".repeat(self.password.chars().count().min(8)),
            ..self.clone()
        }
    }
}

impl fmt::Debug for CredentialBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialBlob")
            .field("scheme", &self.scheme)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("path_prefix", &self.path_prefix)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

// =============================================================================
// Listing Models
// =============================================================================

/// File or collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// One entry of a remote directory listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DavEntry {
    pub filename: String,
    /// Path relative to the server prefix, always starting with `/`
    pub path: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub size: u64,
    pub lastmod: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl DavEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Format size for display (e.g., "4.2 GB", "890 MB")
    pub fn format_size(&self) -> String {
        format_size(self.size)
    }
}

impl fmt::Display for DavEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            EntryKind::Directory => write!(f, "{}/", self.filename),
            EntryKind::File => write!(f, "{} ({})", self.filename, self.format_size()),
        }
    }
}

// =============================================================================
// Handle Models
// =============================================================================

/// A remote file registered with the local proxy
#[derive(Debug, Clone)]
pub struct RemoteHandle {
    pub id: String,
    pub remote_path: String,
    pub server: ServerConfig,
    /// Kept per handle so requests for different handles never share state
    pub credentials: Credentials,
    pub content_type: String,
    pub size: Option<u64>,
}

/// Guess a MIME type from a file name's extension
pub fn guess_content_type(path: &str) -> &'static str {
    let ext = path
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "flac" => "audio/flac",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "srt" => "application/x-subrip",
        "vtt" => "text/vtt",
        _ => "application/octet-stream",
    }
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Human-readable byte count
pub fn format_size(bytes: u64) -> String {
    const GB: f64 = 1024.0 * 1024.0 * 1024.0;
    const MB: f64 = 1024.0 * 1024.0;
    const KB: f64 = 1024.0;

    let b = bytes as f64;
    if b >= GB {
        format!("{:.1} GB", b / GB)
    } else if b >= MB {
        format!("{:.0} MB", b / MB)
    } else if b >= KB {
        format!("{:.0} KB", b / KB)
    } else {
        format!("{} B", bytes)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn blob() -> CredentialBlob {
        CredentialBlob {
            scheme: Scheme::Https,
            host: "dav.example.com".to_string(),
            port: 0,
            path_prefix: "".to_string(),
            username: "alice".to_string(),
            password: "secret".to_string(),
        }
    }

    #[test]
    fn test_scheme_default_port() {
        assert_eq!(Scheme::Http.default_port(), 80);
        assert_eq!(Scheme::Https.default_port(), 443);
        assert_eq!("HTTP".parse::<Scheme>().unwrap(), Scheme::Http);
        assert!("ftp".parse::<Scheme>().is_err());
    }

    #[test]
    fn test_normalize_fills_defaults() {
        let b = blob().normalize().unwrap();
        assert_eq!(b.port, 443);
        assert_eq!(b.path_prefix, "/dav");
    }

    #[test]
    fn test_normalize_prefix_slashes() {
        let mut b = blob();
        b.path_prefix = "remote.php/webdav/".to_string();
        assert_eq!(b.normalize().unwrap().path_prefix, "/remote.php/webdav");

        let mut b = blob();
        b.path_prefix = "/".to_string();
        let b = b.normalize().unwrap();
        assert_eq!(b.path_prefix, "/");
        assert_eq!(b.server().base_url(), "https://dav.example.com:443");
    }

    #[test]
    fn test_normalize_rejects_bad_host() {
        let mut b = blob();
        b.host = "  ".to_string();
        assert!(matches!(b.normalize(), Err(Error::ConfigInvalid(_))));

        let mut b = blob();
        b.host = "https://dav.example.com".to_string();
        assert!(matches!(b.normalize(), Err(Error::ConfigInvalid(_))));
    }

    #[test]
    fn test_url_for_encodes_segments() {
        let server = blob().normalize().unwrap().server();
        assert_eq!(
            server.url_for("/Movies/My Film (2020).mp4"),
            "https://dav.example.com:443/dav/Movies/My%20Film%20%282020%29.mp4"
        );
        assert_eq!(server.url_for("/"), "https://dav.example.com:443/dav/");
        assert_eq!(
            server.url_for("/Movies/"),
            "https://dav.example.com:443/dav/Movies/"
        );
    }

    #[test]
    fn test_basic_token() {
        let creds = Credentials::new("user", "pass");
        assert_eq!(creds.basic_token(), "Basic dXNlcjpwYXNz");
    }

    #[test]
    fn test_debug_redacts_password() {
        let b = blob();
        assert!(!format!("{:?}", b).contains("secret"));
        assert!(!format!("{:?}", b.credentials()).contains("secret"));
        assert_eq!(b.masked().password, "******");
    }

    #[test]
    fn test_guess_content_type() {
        assert_eq!(guess_content_type("/a/b/film.MP4"), "video/mp4");
        assert_eq!(guess_content_type("clip.mkv"), "video/x-matroska");
        assert_eq!(guess_content_type("subs.vtt"), "text/vtt");
        assert_eq!(guess_content_type("/dir.with.dots/noext"), "application/octet-stream");
    }

    #[test]
    fn test_entry_serializes_type_field() {
        let entry = DavEntry {
            filename: "a.mp4".to_string(),
            path: "/a.mp4".to_string(),
            kind: EntryKind::File,
            size: 1024,
            lastmod: None,
            content_type: None,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "file");
        assert_eq!(entry.to_string(), "a.mp4 (1 KB)");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(500), "500 B");
        assert_eq!(format_size(890 * 1024 * 1024), "890 MB");
        assert_eq!(format_size(4_509_715_660), "4.2 GB");
    }
}
