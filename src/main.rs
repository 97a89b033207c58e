//! EchoLingo - language-learning player for media on a WebDAV server
//!
//! # Usage
//!
//! ```bash
//! echolingo config set --host dav.example.com -u alice -p secret
//! echolingo ls /Movies
//! echolingo play /Movies/lesson01.mp4 --sub lesson01.en.srt --sub lesson01.es.vtt
//! echolingo serve /Movies/lesson01.mp4 --json
//! ```
//!
//! Logs go to stderr; set `ECHOLINGO_LOG` (or `RUST_LOG`) to adjust, e.g.
//! `ECHOLINGO_LOG=echolingo=debug`.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use echolingo::cli::{Cli, Command, ExitCode, Output};
use echolingo::commands::{self, Context};

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.quiet);

    run_cli(cli).await.into()
}

fn init_tracing(quiet: bool) {
    let default = if quiet { "echolingo=error" } else { "echolingo=info" };
    let filter = std::env::var("ECHOLINGO_LOG")
        .ok()
        .and_then(|v| EnvFilter::try_new(v).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Run CLI command and return exit code
async fn run_cli(cli: Cli) -> ExitCode {
    let output = Output::new(&cli);
    let ctx = Context::from_cli(&cli);

    match cli.command {
        Command::Config(cmd) => commands::config_cmd(cmd, &ctx, &output).await,
        Command::Ls(cmd) => commands::ls_cmd(cmd, &ctx, &output).await,
        Command::Captions(cmd) => commands::captions_cmd(cmd, &ctx, &output).await,
        Command::Serve(cmd) => commands::serve_cmd(cmd, &ctx, &output).await,
        Command::Play(cmd) => commands::play_cmd(cmd, &ctx, &output).await,
    }
}
