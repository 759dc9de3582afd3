//! Lifecycle orchestrator.
//!
//! # Responsibilities
//! - Own the single active listener
//! - Load configuration, set the log threshold, start the listener
//! - Stop with the configured deadline; reload as stop-then-start
//! - Serialize shutdown signals and config changes in one control loop
//!
//! # States
//! ```text
//! Stopped → Starting → Running → Stopping → Stopped
//!              │                     │
//!              └─ load/bind failure ─┴──→ Stopped
//! ```

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::config::{ApiConfig, ConfigChange, ConfigError, ConfigSource};
use crate::http::{HttpServer, ServerError};
use crate::observability::logging::{set_threshold, LogLevelHandle};
use crate::observability::LIFECYCLE_TARGET;

/// Window during which bursts of file events collapse into one reload.
pub const RELOAD_DEBOUNCE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Why a start attempt ended in `Stopped`.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error("server did not bind within {0:?}")]
    StartupTimeout(Duration),

    #[error("server task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

struct ActiveServer {
    server: Arc<HttpServer>,
    task: JoinHandle<Result<(), ServerError>>,
    shutdown_timeout: Duration,
    local_addr: SocketAddr,
}

/// Owns the current listener and drives it through start, stop and reload.
pub struct Orchestrator {
    source: ConfigSource,
    log_level: Option<LogLevelHandle>,
    active: Option<ActiveServer>,
    state: LifecycleState,
}

impl Orchestrator {
    pub fn new(source: ConfigSource, log_level: Option<LogLevelHandle>) -> Self {
        Self {
            source,
            log_level,
            active: None,
            state: LifecycleState::Stopped,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Address of the running listener.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.active.as_ref().map(|active| active.local_addr)
    }

    /// Load configuration and start a listener. Any failure is logged and
    /// leaves the orchestrator `Stopped`.
    pub async fn start(&mut self) -> Result<SocketAddr, StartError> {
        if self.active.is_some() {
            self.stop().await;
        }
        self.state = LifecycleState::Starting;

        let result = self.try_start().await;
        self.state = match result {
            Ok(_) => LifecycleState::Running,
            Err(_) => LifecycleState::Stopped,
        };
        result
    }

    async fn try_start(&mut self) -> Result<SocketAddr, StartError> {
        let config = match self.source.load() {
            Ok(config) => config,
            Err(e) => {
                match e.issues() {
                    Some(issues) => tracing::error!(
                        target: LIFECYCLE_TARGET,
                        config_issues = ?issues,
                        "configuration issues"
                    ),
                    None => tracing::error!(
                        target: LIFECYCLE_TARGET,
                        error = %e,
                        "failed to read configuration"
                    ),
                }
                return Err(e.into());
            }
        };

        tracing::info!(
            target: LIFECYCLE_TARGET,
            config = %render_config(&config),
            "got config"
        );
        self.apply_log_level(&config);

        let server = Arc::new(HttpServer::new(&config));
        tracing::info!(
            target: LIFECYCLE_TARGET,
            address = %config.http.listen_address,
            "starting server"
        );

        let task = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.start().await })
        };

        let bound = tokio::time::timeout(config.timeouts.startup, server.wait_until_bound()).await;
        let failure = match bound {
            Ok(Some(local_addr)) => {
                self.active = Some(ActiveServer {
                    server,
                    task,
                    shutdown_timeout: config.timeouts.shutdown,
                    local_addr,
                });
                return Ok(local_addr);
            }
            Ok(None) => match task.await {
                Ok(Err(e)) => StartError::Server(e),
                Ok(Ok(())) => StartError::StartupTimeout(config.timeouts.startup),
                Err(e) => StartError::Task(e),
            },
            Err(_) => {
                server.stop(config.timeouts.shutdown).await;
                let _ = task.await;
                StartError::StartupTimeout(config.timeouts.startup)
            }
        };

        tracing::error!(target: LIFECYCLE_TARGET, error = %failure, "Failed to start server");
        Err(failure)
    }

    /// Stop the current listener, if any, within its shutdown deadline.
    pub async fn stop(&mut self) {
        tracing::info!(target: LIFECYCLE_TARGET, "stopping server");
        self.state = LifecycleState::Stopping;

        if let Some(active) = self.active.take() {
            active.server.stop(active.shutdown_timeout).await;
            match active.task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::debug!(error = %e, "Listener ended with an error"),
                Err(e) => tracing::debug!(error = %e, "Listener task failed"),
            }
        }

        self.state = LifecycleState::Stopped;
        tracing::info!(target: LIFECYCLE_TARGET, "stopped server successfully");
    }

    /// Stop, then start again with freshly loaded configuration.
    pub async fn reload(&mut self, file: &Path) -> Result<SocketAddr, StartError> {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            file = %file.display(),
            "config changed - reloading"
        );
        self.stop().await;
        self.start().await
    }

    /// Drive the orchestrator until shutdown.
    ///
    /// Returns `Stopped` after a shutdown signal. If the initial start fails
    /// the loop is never entered and `Err` carries the start failure.
    pub async fn run(
        &mut self,
        mut shutdown: broadcast::Receiver<()>,
        mut changes: mpsc::UnboundedReceiver<ConfigChange>,
    ) -> Result<LifecycleState, StartError> {
        if let Err(e) = self.start().await {
            self.stop().await;
            return Err(e);
        }

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    self.stop().await;
                    return Ok(self.state);
                }
                Some(change) = changes.recv() => {
                    let change = debounce(change, &mut changes).await;
                    // Failures are logged; a corrected file triggers the next attempt.
                    let _ = self.reload(&change.path).await;
                }
                exit = server_exit(&mut self.active) => {
                    self.active = None;
                    self.state = LifecycleState::Stopped;
                    let error = match exit {
                        Ok(Ok(())) => continue,
                        Ok(Err(e)) => e.to_string(),
                        Err(e) => e.to_string(),
                    };
                    tracing::error!(target: LIFECYCLE_TARGET, error = %error, "Failed to start server");
                }
            }
        }
    }

    fn apply_log_level(&self, config: &ApiConfig) {
        let (Some(handle), Some(level)) = (&self.log_level, config.level()) else {
            return;
        };
        if let Err(e) = set_threshold(handle, level) {
            tracing::warn!(error = %e, "Failed to apply log level");
        }
    }
}

/// Collapse events arriving within the debounce window into the last one.
async fn debounce(
    first: ConfigChange,
    changes: &mut mpsc::UnboundedReceiver<ConfigChange>,
) -> ConfigChange {
    let mut latest = first;
    while let Ok(Some(next)) = tokio::time::timeout(RELOAD_DEBOUNCE, changes.recv()).await {
        latest = next;
    }
    latest
}

/// Resolves when the running listener's task ends; pending when there is none.
async fn server_exit(
    active: &mut Option<ActiveServer>,
) -> Result<Result<(), ServerError>, tokio::task::JoinError> {
    match active {
        Some(active) => (&mut active.task).await,
        None => std::future::pending().await,
    }
}

fn render_config(config: &ApiConfig) -> String {
    serde_json::to_string(config).unwrap_or_else(|e| format!("<unserializable: {e}>"))
}
