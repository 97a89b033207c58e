//! CLI Command Handlers
//!
//! Implements all CLI commands on top of the [`Bridge`].
//! Each handler takes CLI args and Output, returns ExitCode.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::bridge::{Bridge, OpResult};
use crate::captions::{self, format_timestamp, CaptionEntry};
use crate::cli::{
    CaptionsCmd, Cli, ConfigAction, ConfigCmd, ConfigSetCmd, ExitCode, LsCmd, Output, PlayCmd,
    ServeCmd, ServedFile, StatusOk,
};
use crate::config::Config;
use crate::credentials::CredentialStore;
use crate::error::Error;
use crate::models::{guess_content_type, CredentialBlob};
use crate::remote::{AuthRegistry, Gateway};
use crate::stream::{LocalPlayer, PlayerType, Registration};

/// Prefix marking a caption argument as a path on the WebDAV server
const REMOTE_CAPTION_PREFIX: &str = "dav:";

// =============================================================================
// Context
// =============================================================================

/// Settings resolved from the config file and global flags
pub struct Context {
    pub config: Config,
    pub data_dir: Option<PathBuf>,
}

impl Context {
    pub fn from_cli(cli: &Cli) -> Self {
        let config = match &cli.config {
            Some(path) => Config::load_from(path),
            None => Config::load(),
        };
        let data_dir = cli.data_dir.clone().or_else(|| config.data_dir());
        Self { config, data_dir }
    }

    fn gateway(&self) -> Gateway {
        let registry = Arc::new(AuthRegistry::new());
        match &self.config.user_agent {
            Some(ua) => Gateway::with_user_agent(registry, ua.clone()),
            None => Gateway::new(registry),
        }
    }

    async fn bridge(&self, port: Option<u16>, output: &Output) -> Result<Bridge, ExitCode> {
        let Some(dir) = &self.data_dir else {
            return Err(output.error(
                "Could not determine a data directory; pass --data-dir",
                ExitCode::Error,
            ));
        };
        let store = CredentialStore::open(dir).await;
        if !store.is_persistent() {
            output.info("Warning: encryption keys could not be stored; configuration will not survive a restart");
        }
        Ok(Bridge::new(
            store,
            self.gateway(),
            port.unwrap_or_else(|| self.config.proxy_port()),
            self.config.max_bind_attempts,
        ))
    }
}

fn fail(output: &Output, context: &str, err: &Error) -> ExitCode {
    output.error(format!("{}: {}", context, err), ExitCode::for_error(err))
}

fn fail_op(output: &Output, context: &str, result: &OpResult) -> ExitCode {
    let code = result
        .error_kind
        .map(ExitCode::for_kind)
        .unwrap_or(ExitCode::Error);
    let msg = result.error.as_deref().unwrap_or("unknown error");
    output.error(format!("{}: {}", context, msg), code)
}

// =============================================================================
// Config Command
// =============================================================================

pub async fn config_cmd(cmd: ConfigCmd, ctx: &Context, output: &Output) -> ExitCode {
    let bridge = match ctx.bridge(None, output).await {
        Ok(bridge) => bridge,
        Err(code) => return code,
    };

    match cmd.action {
        ConfigAction::Set(set) => config_set(set, &bridge, output).await,
        ConfigAction::Show => match bridge.get_config().await {
            Some(blob) => print_blob(&blob, output),
            None => output.error(
                "No connection configured. Run `echolingo config set` first.",
                ExitCode::NotConfigured,
            ),
        },
        ConfigAction::Test => {
            let Some(blob) = bridge.get_config().await else {
                return output.error("No connection configured", ExitCode::NotConfigured);
            };
            output.info(format!("Testing {}...", blob.server()));
            let result = bridge.test_connection(blob).await;
            if !result.success {
                return fail_op(output, "Connection test failed", &result);
            }
            print_status(output, "Connection OK")
        }
        ConfigAction::Clear => match bridge.store().clear().await {
            Ok(()) => print_status(output, "Configuration cleared"),
            Err(e) => fail(output, "Failed to clear configuration", &e),
        },
    }
}

async fn config_set(cmd: ConfigSetCmd, bridge: &Bridge, output: &Output) -> ExitCode {
    let blob = CredentialBlob {
        scheme: cmd.scheme.into(),
        host: cmd.host,
        port: cmd.port.unwrap_or(0),
        path_prefix: cmd.path,
        username: cmd.username,
        password: cmd.password,
    };

    if !cmd.no_test {
        output.info(format!("Testing {}...", blob.server()));
        let result = bridge.test_connection(blob.clone()).await;
        if !result.success {
            return fail_op(output, "Connection test failed", &result);
        }
    }

    let result = bridge.save_config(blob).await;
    if !result.success {
        return fail_op(output, "Failed to save configuration", &result);
    }

    match bridge.get_config().await {
        Some(saved) => print_blob(&saved, output),
        None => print_status(output, "Configuration saved"),
    }
}

fn print_blob(blob: &CredentialBlob, output: &Output) -> ExitCode {
    let masked = blob.masked();
    let result = output.print_or(&masked, || {
        format!(
            "Server:   {}\nUsername: {}\nPassword: {}",
            masked.server(),
            masked.username,
            masked.password
        )
    });
    match result {
        Ok(()) => ExitCode::Success,
        Err(e) => output.error(format!("Failed to serialize: {}", e), ExitCode::Error),
    }
}

fn print_status(output: &Output, text: &str) -> ExitCode {
    match output.print_or(StatusOk::default(), || text.to_string()) {
        Ok(()) => ExitCode::Success,
        Err(e) => output.error(format!("Failed to serialize: {}", e), ExitCode::Error),
    }
}

// =============================================================================
// Ls Command
// =============================================================================

pub async fn ls_cmd(cmd: LsCmd, ctx: &Context, output: &Output) -> ExitCode {
    let bridge = match ctx.bridge(None, output).await {
        Ok(bridge) => bridge,
        Err(code) => return code,
    };

    let listing = bridge.get_directory_contents(&cmd.path).await;
    if !listing.success {
        return fail_op(output, "Listing failed", &OpResult {
            success: false,
            error: listing.error,
            error_kind: listing.error_kind,
        });
    }

    let mut entries = listing.contents;
    if cmd.media_only {
        entries.retain(|e| e.is_dir() || guess_content_type(&e.path) != "application/octet-stream");
    }

    let result = output.print_or(&entries, || {
        if entries.is_empty() {
            return "(empty)".to_string();
        }
        entries
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    });
    match result {
        Ok(()) => ExitCode::Success,
        Err(e) => output.error(format!("Failed to serialize: {}", e), ExitCode::Error),
    }
}

// =============================================================================
// Captions Command
// =============================================================================

#[derive(Serialize)]
struct CaptionLine<'a> {
    start: f64,
    end: f64,
    span: String,
    text: &'a str,
}

impl<'a> From<&'a CaptionEntry> for CaptionLine<'a> {
    fn from(entry: &'a CaptionEntry) -> Self {
        Self {
            start: entry.start,
            end: entry.end,
            span: format!("{} - {}", format_timestamp(entry.start), format_timestamp(entry.end)),
            text: &entry.text,
        }
    }
}

pub async fn captions_cmd(cmd: CaptionsCmd, ctx: &Context, output: &Output) -> ExitCode {
    let at = match cmd.parse_at() {
        Some(Ok(t)) => Some(t),
        Some(Err(msg)) => return output.error(msg, ExitCode::InvalidArgs),
        None => None,
    };

    let gateway = ctx.gateway();
    let track = match captions::load_track(&cmd.source, &gateway).await {
        Ok(track) => track,
        Err(e) => return fail(output, "Failed to load captions", &e),
    };

    let lines: Vec<CaptionLine> = match at {
        Some(t) => track.active_entries(t).into_iter().map(CaptionLine::from).collect(),
        None => track.entries().iter().map(CaptionLine::from).collect(),
    };

    if at.is_some() && lines.is_empty() {
        output.info("No caption at that time");
    }

    let result = output.print_or(&lines, || {
        lines
            .iter()
            .map(|l| format!("{}  {}", l.span, l.text))
            .collect::<Vec<_>>()
            .join("\n")
    });
    match result {
        Ok(()) => ExitCode::Success,
        Err(e) => output.error(format!("Failed to serialize: {}", e), ExitCode::Error),
    }
}

// =============================================================================
// Serve Command
// =============================================================================

fn served(path: &str, registration: Registration) -> ServedFile {
    ServedFile {
        path: path.to_string(),
        url: registration.url,
        content_type: registration.content_type,
        size: registration.size,
    }
}

pub async fn serve_cmd(cmd: ServeCmd, ctx: &Context, output: &Output) -> ExitCode {
    let bridge = match ctx.bridge(cmd.port, output).await {
        Ok(bridge) => bridge,
        Err(code) => return code,
    };

    let mut files = Vec::with_capacity(cmd.paths.len());
    for path in &cmd.paths {
        match bridge.register(path).await {
            Ok(registration) => files.push(served(path, registration)),
            Err(e) => return fail(output, &format!("Failed to register {}", path), &e),
        }
    }

    let result = output.print_or(&files, || {
        files
            .iter()
            .map(|f| format!("{}  ->  {}", f.path, f.url))
            .collect::<Vec<_>>()
            .join("\n")
    });
    if let Err(e) = result {
        return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
    }

    output.info("Serving. Press Ctrl-C to stop.");
    if let Err(e) = tokio::signal::ctrl_c().await {
        return output.error(format!("Failed to wait for Ctrl-C: {}", e), ExitCode::Error);
    }

    if let Ok(proxy) = bridge.proxy().await {
        proxy.shutdown();
    }
    ExitCode::Success
}

// =============================================================================
// Play Command
// =============================================================================

pub async fn play_cmd(cmd: PlayCmd, ctx: &Context, output: &Output) -> ExitCode {
    if cmd.subs.len() > 2 {
        return output.error("At most two caption tracks are supported", ExitCode::InvalidArgs);
    }

    let player_type: PlayerType = cmd
        .player
        .map(Into::into)
        .unwrap_or_else(|| ctx.config.player_type());
    let player = LocalPlayer::new(player_type);
    if !player.is_available().await {
        return output.error(
            format!("{} not found. Install it first.", player_type.display_name()),
            ExitCode::PlayerFailed,
        );
    }

    let bridge = match ctx.bridge(cmd.port, output).await {
        Ok(bridge) => bridge,
        Err(code) => return code,
    };

    let registration = match bridge.register(&cmd.path).await {
        Ok(registration) => registration,
        Err(e) => return fail(output, "Failed to open remote file", &e),
    };

    let mut caption_sources = Vec::new();
    for sub in &cmd.subs {
        let source = match sub.strip_prefix(REMOTE_CAPTION_PREFIX) {
            Some(remote) => match bridge.register(remote).await {
                Ok(caption) => caption.url,
                Err(e) => {
                    output.info(format!("Skipping captions {}: {}", sub, e));
                    continue;
                }
            },
            None => sub.clone(),
        };

        // A track that does not parse is dropped; playback continues without it
        match captions::load_track(&source, bridge.gateway()).await {
            Ok(track) => {
                output.info(format!("Captions {}: {} entries", sub, track.len()));
                caption_sources.push(source);
            }
            Err(e) => output.info(format!("Skipping captions {}: {}", sub, e)),
        }
    }

    #[derive(Serialize)]
    struct PlaySuccess {
        status: &'static str,
        player: String,
        #[serde(flatten)]
        file: ServedFile,
        captions: Vec<String>,
    }

    let response = PlaySuccess {
        status: "playing",
        player: player_type.display_name().to_string(),
        file: served(&cmd.path, registration),
        captions: caption_sources.clone(),
    };
    let url = response.file.url.clone();
    if let Err(e) = output.print(&response) {
        return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
    }

    output.info(format!("Opening in {}...", player_type.display_name()));
    match player.play_and_wait(&url, &caption_sources).await {
        Ok(()) => ExitCode::Success,
        Err(e) => output.error(format!("Failed to start player: {}", e), ExitCode::PlayerFailed),
    }
}
