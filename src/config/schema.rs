//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the API edge.
//! All types derive Serde traits for deserialization from config files.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing_subscriber::filter::LevelFilter;

/// Root configuration for the API edge server.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    /// Log severity threshold (trace, debug, info, warn, error, fatal, panic, disabled).
    pub log_level: String,

    /// Startup, shutdown and header-read timeouts.
    pub timeouts: TimeoutConfig,

    /// Listener, CORS and trusted-proxy settings.
    pub http: HttpConfig,
}

impl ApiConfig {
    /// Parsed log level, if the configured string names a known level.
    pub fn level(&self) -> Option<LogLevel> {
        self.log_level.parse().ok()
    }
}

/// Timeout configuration for the listener lifecycle.
///
/// Zero durations are what an absent key deserializes to; validation
/// rejects them rather than substituting a default.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upper bound on binding the listener.
    #[serde(with = "humantime_serde")]
    pub startup: Duration,

    /// Upper bound on the graceful drain before connections are force-closed.
    #[serde(with = "humantime_serde")]
    pub shutdown: Duration,

    /// Time allowed for a client to send its request headers.
    #[serde(with = "humantime_serde")]
    pub read_header: Duration,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct HttpConfig {
    /// Listen address in `host:port` form (e.g. "0.0.0.0:8080" or ":8080").
    pub listen_address: String,

    /// Cross-origin settings.
    pub cors: CorsConfig,

    /// Peers allowed to supply a client IP through forwarding headers.
    pub trusted_proxies: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowed origins; `*` allows any.
    pub allowed_origins: Vec<String>,
}

/// Known log severities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
    Panic,
    Disabled,
}

impl LogLevel {
    /// The tracing threshold this level maps to.
    ///
    /// `fatal` and `panic` sit above every tracing level, so nothing but the
    /// lifecycle target passes them.
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Fatal | LogLevel::Panic | LogLevel::Disabled => LevelFilter::OFF,
        }
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "fatal" => Ok(LogLevel::Fatal),
            "panic" => Ok(LogLevel::Panic),
            "disabled" => Ok(LogLevel::Disabled),
            _ => Err(()),
        }
    }
}
