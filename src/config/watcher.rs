//! Configuration file watcher for hot reload.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// A change notification for the watched configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigChange {
    /// The file that changed.
    pub path: PathBuf,
}

/// A watcher that monitors the configuration file for changes.
///
/// The parent directory is watched so that editors replacing the file
/// through a rename are still observed. Events for other files are dropped.
pub struct ConfigWatcher {
    path: PathBuf,
    change_tx: mpsc::UnboundedSender<ConfigChange>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver for change notifications.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<ConfigChange>) {
        let (change_tx, change_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                change_tx,
            },
            change_rx,
        )
    }

    /// Start watching. The returned watcher must be kept alive for events to flow.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.change_tx;
        let path = self.path.clone();
        let file_name = self.path.file_name().map(|name| name.to_os_string());

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if !(event.kind.is_modify() || event.kind.is_create()) {
                        return;
                    }
                    let touches_config = event
                        .paths
                        .iter()
                        .any(|changed| changed.file_name().map(|n| n.to_os_string()) == file_name);
                    if touches_config {
                        let _ = tx.send(ConfigChange { path: path.clone() });
                    }
                }
                Err(e) => tracing::error!(error = %e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = %self.path.display(), "Config watcher started");
        Ok(watcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_writes_to_the_watched_file_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api.yml");
        std::fs::write(&path, "log_level: info\n").unwrap();

        let (watcher, mut changes) = ConfigWatcher::new(&path);
        let _guard = watcher.run().unwrap();

        std::fs::write(dir.path().join("other.yml"), "unrelated").unwrap();
        std::fs::write(&path, "log_level: debug\n").unwrap();

        let change = tokio::time::timeout(Duration::from_secs(10), changes.recv())
            .await
            .expect("no change notification")
            .expect("watcher channel closed");
        assert_eq!(change.path, path);
    }
}
