//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events (JSON lines on stdout)
//!
//! Per request:
//!     → one `request_info` event from the correlation middleware
//!
//! Lifecycle:
//!     → `lifecycle` target events, visible at any threshold except `disabled`
//! ```

pub mod logging;

pub use logging::{init_logging, LogLevelHandle, LIFECYCLE_TARGET};
