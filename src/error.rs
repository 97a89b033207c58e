//! Error taxonomy shared by the proxy, the WebDAV client, the caption engine
//! and the credential store.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Server unreachable: {0}")]
    Unreachable(String),

    #[error("Caption parse failed: {0}")]
    ParseFailed(String),

    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("Encryption unavailable: {0}")]
    EncryptionUnavailable(String),

    #[error("Remote server returned HTTP {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Remote server returned an empty payload")]
    EmptyPayload,

    #[error("No free port after {attempts} attempts starting at {start}")]
    BindExhausted { start: u16, attempts: u32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Serialisable tag for an [`Error`], so UI callers can pick user-facing text
/// without matching on messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    AuthFailed,
    Unreachable,
    ParseFailed,
    ConfigInvalid,
    EncryptionUnavailable,
    Upstream,
    EmptyPayload,
    BindExhausted,
    Io,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::AuthFailed(_) => ErrorKind::AuthFailed,
            Error::Unreachable(_) => ErrorKind::Unreachable,
            Error::ParseFailed(_) => ErrorKind::ParseFailed,
            Error::ConfigInvalid(_) => ErrorKind::ConfigInvalid,
            Error::EncryptionUnavailable(_) => ErrorKind::EncryptionUnavailable,
            Error::Upstream { .. } => ErrorKind::Upstream,
            Error::EmptyPayload => ErrorKind::EmptyPayload,
            Error::BindExhausted { .. } => ErrorKind::BindExhausted,
            Error::Io(_) => ErrorKind::Io,
        }
    }

    /// Map a non-success remote status for `what` onto the taxonomy.
    pub fn from_status(status: reqwest::StatusCode, what: &str) -> Self {
        match status.as_u16() {
            401 | 403 => Error::AuthFailed(format!("{} (HTTP {})", what, status.as_u16())),
            404 => Error::NotFound(what.to_string()),
            code => Error::Upstream {
                status: code,
                message: format!("{}: {}", what, status.canonical_reason().unwrap_or("error")),
            },
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => Error::from_status(status, &e.to_string()),
            None => Error::Unreachable(e.to_string()),
        }
    }
}
