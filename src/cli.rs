//! CLI - Command Line Interface for EchoLingo
//!
//! Every operation is scriptable. All output is JSON-parseable.
//!
//! # Examples
//!
//! ```bash
//! # Configure the WebDAV connection
//! echolingo config set --host dav.example.com --username alice --password secret
//! echolingo config test
//!
//! # Browse and play
//! echolingo ls /Movies
//! echolingo play /Movies/lesson01.mp4 --sub en.srt --sub es.vtt
//!
//! # Inspect a caption file
//! echolingo captions lesson01.srt --at 00:01:05
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::io::IsTerminal;
use std::path::PathBuf;

use crate::error::{Error, ErrorKind};
use crate::models::Scheme;
use crate::stream::PlayerType;

// =============================================================================
// Exit Codes
// =============================================================================

/// Exit codes for CLI operations (semantic for scripting)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    /// General error
    Error = 1,
    InvalidArgs = 2,
    /// Server unreachable or returned an unexpected status
    NetworkError = 3,
    /// No saved connection, or the saved one is invalid
    NotConfigured = 4,
    /// Remote path or caption file not found
    NotFound = 5,
    AuthFailed = 6,
    /// Caption text could not be parsed
    ParseFailed = 7,
    PlayerFailed = 8,
}

impl ExitCode {
    /// Exit code for a library error
    pub fn for_error(err: &Error) -> Self {
        Self::for_kind(err.kind())
    }

    pub fn for_kind(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::NotFound => ExitCode::NotFound,
            ErrorKind::AuthFailed => ExitCode::AuthFailed,
            ErrorKind::Unreachable | ErrorKind::Upstream | ErrorKind::EmptyPayload => {
                ExitCode::NetworkError
            }
            ErrorKind::ParseFailed => ExitCode::ParseFailed,
            ErrorKind::ConfigInvalid => ExitCode::NotConfigured,
            ErrorKind::EncryptionUnavailable | ErrorKind::BindExhausted | ErrorKind::Io => {
                ExitCode::Error
            }
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> std::process::ExitCode {
        std::process::ExitCode::from(code as u8)
    }
}

// =============================================================================
// Main CLI Structure
// =============================================================================

/// EchoLingo - language-learning player for media on a WebDAV server
#[derive(Parser, Debug)]
#[command(
    name = "echolingo",
    version,
    about = "Stream WebDAV media to a local player with dual-language captions",
    long_about = "Browse a WebDAV server, stream its media through a local \
                  range-aware proxy to mpv or VLC, and study with two caption \
                  tracks at once.",
    after_help = "EXAMPLES:\n\
                  echolingo config set --host dav.example.com -u alice -p secret\n\
                  echolingo ls /Movies\n\
                  echolingo play /Movies/a.mp4 --sub a.en.srt --sub a.es.vtt\n\
                  echolingo captions a.en.srt --at 65.5"
)]
pub struct Cli {
    /// Output format as JSON (default for non-TTY)
    #[arg(long, short = 'j', global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the encrypted credential store
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Check if JSON output should be used
    pub fn should_json(&self) -> bool {
        self.json || !std::io::stdout().is_terminal()
    }
}

// =============================================================================
// Subcommands
// =============================================================================

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage the saved WebDAV connection
    #[command(visible_alias = "cfg")]
    Config(ConfigCmd),

    /// List a remote directory
    Ls(LsCmd),

    /// Parse a caption file and show its entries
    #[command(visible_alias = "cap")]
    Captions(CaptionsCmd),

    /// Serve remote files through the local proxy until interrupted
    Serve(ServeCmd),

    /// Play a remote file in mpv or VLC
    #[command(visible_alias = "pl")]
    Play(PlayCmd),
}

// =============================================================================
// Config Command
// =============================================================================

#[derive(Args, Debug)]
pub struct ConfigCmd {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate and save connection settings
    Set(ConfigSetCmd),
    /// Show the saved connection (password masked)
    Show,
    /// Check the saved connection by listing the root directory
    Test,
    /// Delete the saved connection
    Clear,
}

#[derive(Args, Debug)]
pub struct ConfigSetCmd {
    /// Server host name (no scheme, no path)
    #[arg(long, short = 'H', required = true)]
    pub host: String,

    #[arg(long, short = 's', value_enum, default_value = "https")]
    pub scheme: SchemeArg,

    /// Port (defaults to 443 for https, 80 for http)
    #[arg(long, short = 'P')]
    pub port: Option<u16>,

    /// WebDAV path prefix
    #[arg(long, default_value = "/dav")]
    pub path: String,

    #[arg(long, short = 'u', required = true)]
    pub username: String,

    #[arg(long, short = 'p', required = true)]
    pub password: String,

    /// Save without testing the connection first
    #[arg(long)]
    pub no_test: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SchemeArg {
    Http,
    Https,
}

impl From<SchemeArg> for Scheme {
    fn from(arg: SchemeArg) -> Self {
        match arg {
            SchemeArg::Http => Scheme::Http,
            SchemeArg::Https => Scheme::Https,
        }
    }
}

// =============================================================================
// Ls Command
// =============================================================================

#[derive(Args, Debug)]
pub struct LsCmd {
    /// Remote directory (relative to the path prefix)
    #[arg(default_value = "/")]
    pub path: String,

    /// Only show directories and media files
    #[arg(long, short = 'm')]
    pub media_only: bool,
}

// =============================================================================
// Captions Command
// =============================================================================

#[derive(Args, Debug)]
pub struct CaptionsCmd {
    /// Caption file path or http(s) URL
    #[arg(required = true)]
    pub source: String,

    /// Only show the entry active at this time (seconds or [HH:]MM:SS[.mmm])
    #[arg(long, short = 'a')]
    pub at: Option<String>,
}

impl CaptionsCmd {
    pub fn parse_at(&self) -> Option<Result<f64, String>> {
        self.at.as_deref().map(|s| {
            parse_time(s).ok_or_else(|| format!("Invalid time '{}' (expected seconds or [HH:]MM:SS[.mmm])", s))
        })
    }
}

/// `65.5`, `01:05.5` or `0:01:05.500` → seconds
pub fn parse_time(s: &str) -> Option<f64> {
    let s = s.trim();
    let parts: Vec<&str> = s.split(':').collect();
    let value = match parts.len() {
        1 => parts[0].parse::<f64>().ok()?,
        2 => {
            let mins: u64 = parts[0].parse().ok()?;
            let secs: f64 = parts[1].parse().ok()?;
            mins as f64 * 60.0 + secs
        }
        3 => {
            let hours: u64 = parts[0].parse().ok()?;
            let mins: u64 = parts[1].parse().ok()?;
            let secs: f64 = parts[2].parse().ok()?;
            hours as f64 * 3600.0 + mins as f64 * 60.0 + secs
        }
        _ => return None,
    };
    (value.is_finite() && value >= 0.0).then_some(value)
}

// =============================================================================
// Serve / Play Commands
// =============================================================================

#[derive(Args, Debug)]
pub struct ServeCmd {
    /// Remote file paths to register
    #[arg(required = true)]
    pub paths: Vec<String>,

    /// First port to try (overrides config)
    #[arg(long)]
    pub port: Option<u16>,
}

#[derive(Args, Debug)]
pub struct PlayCmd {
    /// Remote file path
    #[arg(required = true)]
    pub path: String,

    /// Caption track (local path, URL, or remote path starting with dav:);
    /// repeat for a second track
    #[arg(long = "sub", short = 's', num_args = 1)]
    pub subs: Vec<String>,

    #[arg(long, value_enum)]
    pub player: Option<PlayerArg>,

    /// First port to try (overrides config)
    #[arg(long)]
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PlayerArg {
    Mpv,
    Vlc,
}

impl From<PlayerArg> for PlayerType {
    fn from(arg: PlayerArg) -> Self {
        match arg {
            PlayerArg::Mpv => PlayerType::Mpv,
            PlayerArg::Vlc => PlayerType::Vlc,
        }
    }
}

// =============================================================================
// JSON Output Types
// =============================================================================

/// JSON output wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonOutput<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "is_zero")]
    pub exit_code: i32,
}

fn is_zero(n: &i32) -> bool {
    *n == 0
}

impl<T: Serialize> JsonOutput<T> {
    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
            exit_code: 0,
        }
    }

    pub fn error_msg(msg: impl Into<String>, code: ExitCode) -> JsonOutput<()> {
        JsonOutput::<()> {
            data: None,
            error: Some(msg.into()),
            exit_code: code.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusOk {
    pub status: &'static str,
}

impl Default for StatusOk {
    fn default() -> Self {
        Self { status: "ok" }
    }
}

/// One registered file in `serve` / `play` output
#[derive(Debug, Serialize)]
pub struct ServedFile {
    pub path: String,
    pub url: String,
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

// =============================================================================
// Output Helpers
// =============================================================================

pub struct Output {
    pub json: bool,
    pub quiet: bool,
}

impl Output {
    pub fn new(cli: &Cli) -> Self {
        Self {
            json: cli.should_json(),
            quiet: cli.quiet,
        }
    }

    pub fn print<T: Serialize>(&self, data: T) -> anyhow::Result<()> {
        if self.json {
            let output = JsonOutput::success(data);
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            println!("{}", serde_json::to_string_pretty(&data)?);
        }
        Ok(())
    }

    /// Print human-readable text, or `data` as JSON in JSON mode
    pub fn print_or<T: Serialize>(&self, data: T, text: impl FnOnce() -> String) -> anyhow::Result<()> {
        if self.json {
            self.print(data)
        } else {
            println!("{}", text());
            Ok(())
        }
    }

    pub fn error(&self, msg: impl Into<String>, code: ExitCode) -> ExitCode {
        let msg = msg.into();
        if self.json {
            let output = JsonOutput::<()>::error_msg(&msg, code);
            if let Ok(json) = serde_json::to_string_pretty(&output) {
                eprintln!("{}", json);
            }
        } else if !self.quiet {
            eprintln!("Error: {}", msg);
        }
        code
    }

    pub fn info(&self, msg: impl std::fmt::Display) {
        if !self.quiet && !self.json {
            eprintln!("{}", msg);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
