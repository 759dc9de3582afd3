//! Structured logging.
//!
//! # Responsibilities
//! - Install the JSON subscriber
//! - Hold the process-wide severity threshold behind a reload handle
//!
//! # Design Decisions
//! - JSON lines with `level`, `message` and the build `version` at the top level
//! - `RUST_LOG` (or `info`) applies until the first configuration is loaded

use std::fmt::Write as _;

use tracing::{Event, Subscriber};
use tracing_subscriber::{
    fmt::{
        self,
        format::{Format, Json, Writer},
        FmtContext, FormatEvent, FormatFields,
    },
    layer::SubscriberExt,
    registry::LookupSpan,
    reload,
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

use crate::config::LogLevel;

/// Target used for lifecycle events so they survive any threshold but `disabled`.
pub const LIFECYCLE_TARGET: &str = "lifecycle";

/// Handle for swapping the severity threshold at runtime.
pub type LogLevelHandle = reload::Handle<EnvFilter, Registry>;

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to install log subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),

    #[error("failed to update log threshold: {0}")]
    Reload(#[from] reload::Error),
}

/// Install the global JSON subscriber and return the threshold handle.
pub fn init_logging() -> Result<LogLevelHandle, LoggingError> {
    let initial = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter, handle) = reload::Layer::new(initial);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().event_format(VersionedJson::new()))
        .try_init()?;

    Ok(handle)
}

/// Flattened JSON lines with a leading `version` field.
pub struct VersionedJson {
    inner: Format<Json>,
    version: &'static str,
}

impl VersionedJson {
    pub fn new() -> Self {
        Self {
            inner: fmt::format()
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .with_span_list(false)
                .with_file(true)
                .with_line_number(true),
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

impl Default for VersionedJson {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, N> FormatEvent<S, N> for VersionedJson
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let mut line = String::new();
        self.inner.format_event(ctx, Writer::new(&mut line), event)?;

        match line.strip_prefix('{') {
            Some(rest) => write!(writer, "{{\"version\":\"{}\",{rest}", self.version),
            None => writer.write_str(&line),
        }
    }
}

/// The filter for a configured level.
pub fn threshold_filter(level: LogLevel) -> EnvFilter {
    match level {
        LogLevel::Disabled => EnvFilter::new("off"),
        other => EnvFilter::new(format!("{},{LIFECYCLE_TARGET}=info", other.as_filter())),
    }
}

/// Swap the process-wide threshold.
pub fn set_threshold(handle: &LogLevelHandle, level: LogLevel) -> Result<(), LoggingError> {
    handle.reload(threshold_filter(level))?;
    Ok(())
}
