//! OS signal handling.
//!
//! # Responsibilities
//! - Register SIGTERM and SIGINT handlers up front so failures surface at startup
//! - Translate the first signal into a shutdown trigger
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Config reload comes from the file watcher, not SIGHUP

use std::io;

use tokio::task::JoinHandle;

use crate::lifecycle::Shutdown;
use crate::observability::LIFECYCLE_TARGET;

/// Registered shutdown signal streams.
pub struct SignalListener {
    #[cfg(unix)]
    sigterm: tokio::signal::unix::Signal,
    #[cfg(unix)]
    sigint: tokio::signal::unix::Signal,
}

impl SignalListener {
    #[cfg(unix)]
    pub fn register() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            sigterm: signal(SignalKind::terminate())?,
            sigint: signal(SignalKind::interrupt())?,
        })
    }

    #[cfg(not(unix))]
    pub fn register() -> io::Result<Self> {
        Ok(Self {})
    }

    /// Wait for the next shutdown signal and return its name.
    #[cfg(unix)]
    pub async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.sigterm.recv() => "SIGTERM",
            _ = self.sigint.recv() => "SIGINT",
        }
    }

    #[cfg(not(unix))]
    pub async fn recv(&mut self) -> &'static str {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "Ctrl+C",
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending().await
            }
        }
    }

    /// Trigger `shutdown` when the first signal arrives.
    pub fn spawn(mut self, shutdown: Shutdown) -> JoinHandle<()> {
        tokio::spawn(async move {
            let signal = self.recv().await;
            tracing::info!(target: LIFECYCLE_TARGET, signal, "Received shutdown signal");
            shutdown.trigger();
        })
    }
}
