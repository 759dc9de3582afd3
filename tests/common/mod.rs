//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tempfile::TempDir;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

/// In-memory sink for JSON log lines.
#[derive(Clone, Default)]
pub struct LogSink {
    buf: Arc<Mutex<Vec<u8>>>,
}

pub struct LogWriter {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl io::Write for LogWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogSink {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter {
            buf: Arc::clone(&self.buf),
        }
    }
}

impl LogSink {
    /// Every captured record, in emission order.
    pub fn records(&self) -> Vec<Value> {
        let buf = self.buf.lock().unwrap();
        String::from_utf8_lossy(&buf)
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    pub fn messages(&self) -> Vec<String> {
        self.records()
            .iter()
            .filter_map(|record| record["message"].as_str().map(str::to_string))
            .collect()
    }

    pub fn with_message(&self, message: &str) -> Vec<Value> {
        self.records()
            .into_iter()
            .filter(|record| record["message"] == message)
            .collect()
    }

    /// Poll until `count` records carry `message`.
    pub async fn wait_for(&self, message: &str, count: usize) -> Vec<Value> {
        for _ in 0..250 {
            let found = self.with_message(message);
            if found.len() >= count {
                return found;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("timed out waiting for {count} x {message:?}; saw {:?}", self.messages());
    }
}

/// Route this thread's events into a fresh sink, JSON formatted as in production.
pub fn capture_logs() -> (LogSink, DefaultGuard) {
    let sink = LogSink::default();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .flatten_event(true)
        .with_max_level(tracing::Level::TRACE)
        .with_writer(sink.clone())
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (sink, guard)
}

/// A valid YAML configuration listening on `listen_address`.
pub fn config_yaml(listen_address: &str, trusted_proxies: &[&str]) -> String {
    let proxies = trusted_proxies
        .iter()
        .map(|proxy| format!("\"{proxy}\""))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "log_level: debug\n\
         timeouts:\n  startup: 5s\n  shutdown: 2s\n  read_header: 2s\n\
         http:\n  listen_address: \"{listen_address}\"\n  cors:\n    allowed_origins: [\"*\"]\n  trusted_proxies: [{proxies}]\n"
    )
}

/// Write `content` as `api.yml` in a fresh temp dir.
pub fn write_config(content: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("api.yml");
    std::fs::write(&path, content).unwrap();
    (dir, path)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
