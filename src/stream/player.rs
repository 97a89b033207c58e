//! Local player launcher
//!
//! Hands a proxy URL to mpv or VLC, with up to two caption tracks. Caption
//! sources may be local paths or URLs.

use std::process::Stdio;
use std::str::FromStr;
use thiserror::Error;
use tokio::process::{Child, Command};
use tracing::info;

/// Supported local players
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerType {
    #[default]
    Mpv,
    Vlc,
}

impl PlayerType {
    /// Executable name (or app bundle path on macOS)
    pub fn command(&self) -> &'static str {
        match self {
            PlayerType::Mpv => "mpv",
            PlayerType::Vlc => {
                #[cfg(target_os = "macos")]
                if std::path::Path::new("/Applications/VLC.app").exists() {
                    return "/Applications/VLC.app/Contents/MacOS/VLC";
                }
                "vlc"
            }
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            PlayerType::Mpv => "mpv",
            PlayerType::Vlc => "VLC",
        }
    }

    /// Player arguments for `url` with the given caption tracks
    pub fn args(&self, url: &str, captions: &[String]) -> Vec<String> {
        let mut args = vec![url.to_string()];
        match self {
            PlayerType::Mpv => {
                // Track ids count embedded subtitles first, so none are forced here.
                // mpv selects the first external file; the rest stay switchable.
                for caption in captions {
                    args.push(format!("--sub-file={}", caption));
                }
                args.push("--force-window=immediate".to_string());
            }
            PlayerType::Vlc => {
                // VLC shows one external track at a time
                if let Some(caption) = captions.first() {
                    args.push("--sub-file".to_string());
                    args.push(caption.clone());
                }
                args.push("--no-video-title-show".to_string());
            }
        }
        args
    }
}

impl std::fmt::Display for PlayerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for PlayerType {
    type Err = PlayerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mpv" => Ok(PlayerType::Mpv),
            "vlc" => Ok(PlayerType::Vlc),
            other => Err(PlayerError::Unsupported(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("Player '{0}' not found. Install it first.")]
    NotFound(String),
    #[error("Unsupported player '{0}' (expected mpv or vlc)")]
    Unsupported(String),
    #[error("Failed to start player: {0}")]
    StartFailed(#[from] std::io::Error),
    #[error("Caption file not found: {0}")]
    CaptionNotFound(String),
}

pub struct LocalPlayer {
    player_type: PlayerType,
}

impl LocalPlayer {
    pub fn new(player_type: PlayerType) -> Self {
        Self { player_type }
    }

    pub fn player_type(&self) -> PlayerType {
        self.player_type
    }

    /// Check whether the player executable can be found
    pub async fn is_available(&self) -> bool {
        let cmd = self.player_type.command();
        if cmd.starts_with('/') {
            return std::path::Path::new(cmd).exists();
        }

        Command::new("which")
            .arg(cmd)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Spawn the player on `url`. Local caption paths must exist; URLs are
    /// passed through untouched.
    pub async fn play(&self, url: &str, captions: &[String]) -> Result<Child, PlayerError> {
        for caption in captions {
            if !is_url(caption) && !std::path::Path::new(caption).exists() {
                return Err(PlayerError::CaptionNotFound(caption.clone()));
            }
        }

        let args = self.player_type.args(url, captions);
        info!(player = %self.player_type, url, captions = captions.len(), "launching player");

        let mut cmd = Command::new(self.player_type.command());
        cmd.args(&args);
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::null());

        cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PlayerError::NotFound(self.player_type.command().to_string())
            } else {
                PlayerError::StartFailed(e)
            }
        })
    }

    /// Play and wait for the player to exit
    pub async fn play_and_wait(&self, url: &str, captions: &[String]) -> Result<(), PlayerError> {
        let mut child = self.play(url, captions).await?;
        let _ = child.wait().await;
        Ok(())
    }
}

fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}
