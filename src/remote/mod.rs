//! Remote access
//!
//! - Gateway: the single outbound HTTP path, with host-scoped auth rewriting
//! - Dav: WebDAV listing, metadata and ranged fetches

pub mod dav;
pub mod gateway;

pub use dav::DavClient;
pub use gateway::{AuthRegistry, Gateway};
