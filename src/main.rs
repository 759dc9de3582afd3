//! Transit API edge server.
//!
//! # Architecture Overview
//!
//! ```text
//!   api.yml ──▶ config ──▶ lifecycle::Orchestrator ──▶ http::HttpServer
//!      │                        ▲        ▲                   │
//!      └── ConfigWatcher ───────┘        │                   ▼
//!                                 SignalListener     correlation → cors
//!                                                    → recovery → routes
//! ```
//!
//! The orchestrator owns the single listener. File changes reload it
//! (stop, then start); SIGINT/SIGTERM stop it and end the process.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio::sync::mpsc;

use transit_edge::config::{ConfigSource, ConfigWatcher};
use transit_edge::lifecycle::{Orchestrator, Shutdown, SignalListener};
use transit_edge::observability::init_logging;

#[derive(Parser)]
#[command(name = "transit-edge")]
#[command(version, about = "HTTP edge server for the transit data API", long_about = None)]
#[command(disable_version_flag = true)]
struct Cli {
    /// Print version
    #[arg(short = 'v', long, action = clap::ArgAction::Version)]
    version: Option<bool>,

    /// Configuration file. Without it, api.{yml,yaml,toml} is searched for
    /// in /run/config and the working directory.
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match init_logging() {
        Ok(handle) => Some(handle),
        Err(e) => {
            eprintln!("{e}");
            None
        }
    };

    let source = match cli.config {
        Some(path) if !path.is_file() => {
            tracing::error!(path = %path.display(), "specified config file does not exist");
            return ExitCode::FAILURE;
        }
        Some(path) => ConfigSource::File(path),
        None => ConfigSource::standard(None),
    };

    let signals = match SignalListener::register() {
        Ok(signals) => signals,
        Err(e) => {
            tracing::error!(error = %e, "Failed to register signal handlers");
            return ExitCode::FAILURE;
        }
    };
    let shutdown = Shutdown::new();
    let shutdown_rx = shutdown.subscribe();
    signals.spawn(shutdown);

    // Keep the watcher alive for the life of the process.
    let (_watcher, changes) = match source.resolve() {
        Ok(path) => {
            let (watcher, changes) = ConfigWatcher::new(&path);
            match watcher.run() {
                Ok(watcher) => (Some(watcher), changes),
                Err(e) => {
                    tracing::warn!(error = %e, "Config watch unavailable, hot reload disabled");
                    (None, changes)
                }
            }
        }
        Err(_) => (None, mpsc::unbounded_channel().1),
    };

    let mut orchestrator = Orchestrator::new(source, log_level);
    match orchestrator.run(shutdown_rx, changes).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}
