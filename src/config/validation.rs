//! Configuration validation.
//!
//! Every rule runs on every call and all failures are reported together;
//! a configuration is accepted only when no rule fails.

use std::net::IpAddr;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

use crate::config::schema::{ApiConfig, HttpConfig, TimeoutConfig};

/// A single failed validation rule. The display text is the issue reported to operators.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("An invalid log level was specified")]
    InvalidLogLevel,

    #[error("Startup timeout should be represented in the form '{{int}}s', e.g. '30s'")]
    InvalidStartupTimeout,

    #[error("Shutdown timeout should be represented in the form '{{int}}s', e.g. '30s'")]
    InvalidShutdownTimeout,

    #[error("ReadHeader timeout should be represented in the form '{{int}}s', e.g. '2s'")]
    InvalidReadHeaderTimeout,

    #[error("HTTP listen address is not valid")]
    InvalidListenAddress,

    #[error("No allowed origins specified")]
    NoAllowedOrigins,

    #[error("The allowed origin {0} is invalid")]
    InvalidOrigin(String),

    #[error("The trusted proxy {0} is invalid")]
    InvalidTrustedProxy(String),
}

/// Validate a configuration, collecting every issue.
pub fn validate_config(config: &ApiConfig) -> Result<(), Vec<ValidationError>> {
    let mut issues = Vec::new();

    if config.level().is_none() {
        issues.push(ValidationError::InvalidLogLevel);
    }
    issues.extend(validate_timeouts(&config.timeouts));
    issues.extend(validate_http(&config.http));

    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}

pub fn validate_timeouts(timeouts: &TimeoutConfig) -> Vec<ValidationError> {
    let mut issues = Vec::new();

    if !is_whole_seconds(timeouts.startup) {
        issues.push(ValidationError::InvalidStartupTimeout);
    }
    if !is_whole_seconds(timeouts.shutdown) {
        issues.push(ValidationError::InvalidShutdownTimeout);
    }
    if !is_whole_seconds(timeouts.read_header) {
        issues.push(ValidationError::InvalidReadHeaderTimeout);
    }

    issues
}

pub fn validate_http(http: &HttpConfig) -> Vec<ValidationError> {
    let mut issues = Vec::new();

    if split_host_port(&http.listen_address).is_none() {
        issues.push(ValidationError::InvalidListenAddress);
    }

    if http.cors.allowed_origins.is_empty() {
        issues.push(ValidationError::NoAllowedOrigins);
    }
    for origin in &http.cors.allowed_origins {
        if origin != "*" && !origin_pattern().is_match(origin) {
            issues.push(ValidationError::InvalidOrigin(origin.clone()));
        }
    }

    for proxy in &http.trusted_proxies {
        if proxy.parse::<IpAddr>().is_err() {
            issues.push(ValidationError::InvalidTrustedProxy(proxy.clone()));
        }
    }

    issues
}

/// A timeout must render as `{int}s` and be non-zero. A minute or more
/// renders with a minutes component, so the ceiling is 59s.
fn is_whole_seconds(duration: Duration) -> bool {
    duration.subsec_nanos() == 0 && (1..=59).contains(&duration.as_secs())
}

fn origin_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?:https?://)?([a-z0-9_-]+).+[a-z]{2,}$")
            .expect("origin pattern is a valid regex")
    })
}

/// Split a `host:port` listen address.
///
/// The host may be empty (all interfaces) or a bracketed IPv6 literal.
/// The port must fit in a `u16`.
pub fn split_host_port(address: &str) -> Option<(&str, u16)> {
    let colon = address.rfind(':')?;
    let (host_part, port) = (&address[..colon], &address[colon + 1..]);

    let host = if let Some(inner) = host_part.strip_prefix('[') {
        let inner = inner.strip_suffix(']')?;
        if inner.contains(['[', ']']) {
            return None;
        }
        inner
    } else {
        if host_part.contains([':', '[', ']']) {
            return None;
        }
        host_part
    };

    if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let port = port.parse::<u16>().ok()?;

    Some((host, port))
}
