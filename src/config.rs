//! Configuration management for EchoLingo
//!
//! Non-secret settings only; connection credentials live in the encrypted
//! credential store. Config is stored at ~/.config/echolingo/config.toml

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::stream::PlayerType;

pub const DEFAULT_PROXY_PORT: u16 = 18080;
pub const DEFAULT_MAX_BIND_ATTEMPTS: u32 = 64;

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// First port tried by the streaming proxy
    pub proxy_port: u16,
    /// How many consecutive ports to try before giving up
    pub max_bind_attempts: u32,
    /// Local player (mpv or vlc)
    pub player: String,
    /// Override for the outbound User-Agent
    pub user_agent: Option<String>,
    /// Override for the credential store directory
    pub data_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            proxy_port: DEFAULT_PROXY_PORT,
            max_bind_attempts: DEFAULT_MAX_BIND_ATTEMPTS,
            player: PlayerType::default().command().to_string(),
            user_agent: None,
            data_dir: None,
        }
    }
}

impl Config {
    /// Get config file path (~/.config/echolingo/config.toml)
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("echolingo").join("config.toml"))
    }

    /// Load config from the default path, or return default if not found
    pub fn load() -> Self {
        Self::path()
            .map(|p| Self::load_from(&p))
            .unwrap_or_default()
    }

    /// Load config from `path`; a missing or malformed file yields defaults
    pub fn load_from(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| toml::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Save config to the default path
    pub fn save(&self) -> Result<()> {
        let path = Self::path().ok_or_else(|| anyhow::anyhow!("Could not determine config path"))?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let toml = toml::to_string_pretty(self)?;
        std::fs::write(path, toml)?;
        Ok(())
    }

    /// Proxy port with fallback chain:
    /// 1. Environment variable ECHOLINGO_PROXY_PORT
    /// 2. Configured port
    pub fn proxy_port(&self) -> u16 {
        std::env::var("ECHOLINGO_PROXY_PORT")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(self.proxy_port)
    }

    /// Configured player, falling back to the default on an unknown name
    pub fn player_type(&self) -> PlayerType {
        self.player.parse().unwrap_or_default()
    }

    /// Credential store directory: configured override, then the platform
    /// data directory
    pub fn data_dir(&self) -> Option<PathBuf> {
        self.data_dir.clone().or_else(crate::credentials::default_dir)
    }
}
