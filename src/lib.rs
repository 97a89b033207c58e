//! EchoLingo - language-learning player for media on a WebDAV server
//!
//! Streams remote media to a local player through an authenticated,
//! range-aware proxy and overlays two caption tracks for study.
//!
//! # Modules
//!
//! - `models` - Server configuration, credentials, directory entries, handles
//! - `remote` - Outbound gateway with auth rewriting, WebDAV client
//! - `stream` - Local streaming proxy, range parsing, player launcher
//! - `captions` - SRT/WebVTT parsing, dual tracks, captured clips
//! - `credentials` - Encrypted credential store
//! - `bridge` - UI-facing operations with serialisable results
//! - `cli` / `commands` / `config` - the `echolingo` binary

pub mod bridge;
pub mod captions;
pub mod cli;
pub mod commands;
pub mod config;
pub mod credentials;
pub mod error;
pub mod models;
pub mod remote;
pub mod stream;

// Re-export commonly used types
pub use error::{Error, ErrorKind, Result};
pub use models::{CredentialBlob, Credentials, DavEntry, EntryKind, RemoteHandle, Scheme, ServerConfig};

pub use bridge::Bridge;
pub use captions::{CaptionEntry, CaptionFormat, CaptionTrack, ClipList, DualTrack};
pub use credentials::CredentialStore;
pub use remote::{AuthRegistry, DavClient, Gateway};
pub use stream::{LocalPlayer, PlayerType, Registration, StreamProxy};
