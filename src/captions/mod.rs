//! Caption engine
//!
//! - Parser: SRT / WebVTT parsing and time lookup
//! - Clips: dual-track overlay and the captured-caption list

pub mod clips;
pub mod parser;

pub use clips::{format_timestamp, Clip, ClipList, DualTrack};
pub use parser::{parse, CaptionEntry, CaptionFormat, CaptionTrack};

use reqwest::header::HeaderMap;
use tracing::debug;

use crate::error::{Error, Result};
use crate::remote::Gateway;

/// Load and parse a caption track from a local path or an `http(s)` URL.
///
/// URLs are fetched through the gateway so proxied and bound-host sources
/// work the same as any other request. The body is read as UTF-8 text.
pub async fn load_track(source: &str, gateway: &Gateway) -> Result<CaptionTrack> {
    let text = if source.starts_with("http://") || source.starts_with("https://") {
        let response = gateway.get(source, HeaderMap::new()).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::from_status(status, source));
        }
        response
            .text()
            .await
            .map_err(|e| Error::Unreachable(e.to_string()))?
    } else {
        tokio::fs::read_to_string(source).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(source.to_string())
            } else {
                Error::Io(e)
            }
        })?
    };

    let track = parse(&text, Some(source))?;
    debug!(source, entries = track.len(), format = ?track.format, "caption track loaded");
    Ok(track)
}
