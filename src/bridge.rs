//! UI-facing operations
//!
//! Directory listing, file URL registration and connection configuration,
//! each returning a serialisable result with a `success` flag instead of an
//! error. Failures carry a message and an [`ErrorKind`] so a front end can
//! pick the right prompt (re-enter credentials, re-select a file, ...).

use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::credentials::CredentialStore;
use crate::error::{Error, ErrorKind, Result};
use crate::models::{CredentialBlob, DavEntry};
use crate::remote::{DavClient, Gateway};
use crate::stream::{Registration, StreamProxy};

/// Outcome of an operation with no payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl OpResult {
    fn from_result(result: Result<()>) -> Self {
        match result {
            Ok(()) => Self {
                success: true,
                error: None,
                error_kind: None,
            },
            Err(e) => Self {
                success: false,
                error: Some(e.to_string()),
                error_kind: Some(e.kind()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectoryListing {
    pub success: bool,
    pub contents: Vec<DavEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileUrl {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

/// Wires the credential store, the gateway and the proxy together.
///
/// The proxy is started on first use, sharing the gateway's auth registry.
pub struct Bridge {
    store: CredentialStore,
    gateway: Gateway,
    proxy: OnceCell<StreamProxy>,
    proxy_port: u16,
    max_bind_attempts: u32,
}

impl Bridge {
    pub fn new(store: CredentialStore, gateway: Gateway, proxy_port: u16, max_bind_attempts: u32) -> Self {
        Self {
            store,
            gateway,
            proxy: OnceCell::new(),
            proxy_port,
            max_bind_attempts,
        }
    }

    /// Use an already running proxy. It must share `gateway`'s registry.
    pub fn with_proxy(store: CredentialStore, gateway: Gateway, proxy: StreamProxy) -> Self {
        Self {
            store,
            gateway,
            proxy_port: proxy.port(),
            proxy: OnceCell::new_with(Some(proxy)),
            max_bind_attempts: 1,
        }
    }

    /// The running proxy, starting it if needed
    pub async fn proxy(&self) -> Result<&StreamProxy> {
        self.proxy
            .get_or_try_init(|| {
                StreamProxy::start(self.gateway.clone(), self.proxy_port, self.max_bind_attempts)
            })
            .await
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub async fn get_directory_contents(&self, path: &str) -> DirectoryListing {
        match self.list(path).await {
            Ok(contents) => DirectoryListing {
                success: true,
                contents,
                error: None,
                error_kind: None,
            },
            Err(e) => {
                warn!(path, "directory listing failed: {}", e);
                DirectoryListing {
                    success: false,
                    contents: Vec::new(),
                    error: Some(e.to_string()),
                    error_kind: Some(e.kind()),
                }
            }
        }
    }

    /// Register `remote_path` with the proxy and return its local URL
    pub async fn get_file_url(&self, remote_path: &str) -> FileUrl {
        match self.register(remote_path).await {
            Ok(registration) => FileUrl {
                success: true,
                url: Some(registration.url),
                error: None,
                error_kind: None,
            },
            Err(e) => {
                warn!(path = remote_path, "file registration failed: {}", e);
                FileUrl {
                    success: false,
                    url: None,
                    error: Some(e.to_string()),
                    error_kind: Some(e.kind()),
                }
            }
        }
    }

    /// Validate, persist, and rebind the saved host to the new login
    pub async fn save_config(&self, blob: CredentialBlob) -> OpResult {
        OpResult::from_result(self.try_save(blob).await)
    }

    pub async fn get_config(&self) -> Option<CredentialBlob> {
        self.store.load().await
    }

    /// List the root collection with `blob` without saving it or touching
    /// the live auth bindings
    pub async fn test_connection(&self, blob: CredentialBlob) -> OpResult {
        let result = async {
            let blob = blob.normalize()?;
            let client = DavClient::new(self.gateway.detached(), blob.server(), blob.credentials());
            client.list("/").await.map(|_| ())
        }
        .await;
        OpResult::from_result(result)
    }

    async fn configured(&self) -> Result<CredentialBlob> {
        self.store
            .load()
            .await
            .ok_or_else(|| Error::ConfigInvalid("WebDAV connection is not configured".to_string()))
    }

    async fn list(&self, path: &str) -> Result<Vec<DavEntry>> {
        let blob = self.configured().await?;
        let client = DavClient::new(self.gateway.clone(), blob.server(), blob.credentials());
        client.list(path).await
    }

    /// Register `remote_path` from the saved connection with the proxy
    pub async fn register(&self, remote_path: &str) -> Result<Registration> {
        let blob = self.configured().await?;
        self.proxy()
            .await?
            .register(remote_path, &blob.server(), &blob.credentials())
            .await
    }

    async fn try_save(&self, blob: CredentialBlob) -> Result<()> {
        let blob = blob.normalize()?;
        self.store.save(&blob).await?;

        let host = blob.server().auth_host();
        if self
            .gateway
            .registry()
            .bind(&host, blob.credentials().basic_token())
        {
            info!(host = %host, "auth binding replaced by saved configuration");
        }
        Ok(())
    }
}
