//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! api.yml / api.toml (first match in /run/config, ., extra dir)
//!     → loader.rs (parse, TRANSIT_* env overrides)
//!     → validation.rs (every rule, every issue)
//!     → ApiConfig (validated, immutable)
//!     → handed to the orchestrator for one listener generation
//!
//! On file change:
//!     watcher.rs detects change
//!     → ConfigChange on an mpsc channel
//!     → orchestrator stops the listener, reloads, starts again
//! ```
//!
//! # Design Decisions
//! - A config is either fully valid or rejected; nothing is partially applied
//! - Absent fields are zero/empty and fail validation instead of defaulting
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{ConfigError, ConfigSource};
pub use schema::{ApiConfig, CorsConfig, HttpConfig, LogLevel, TimeoutConfig};
pub use validation::{validate_config, ValidationError};
pub use watcher::{ConfigChange, ConfigWatcher};
