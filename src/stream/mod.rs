//! Streaming infrastructure
//!
//! - Proxy: local HTTP endpoint relaying remote media with range support
//! - Range: byte-range header parsing
//! - Player: mpv/VLC launcher

pub mod player;
pub mod proxy;
pub mod range;

pub use player::{LocalPlayer, PlayerType};
pub use proxy::{Registration, StreamProxy};
