//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Orchestrator (orchestrator.rs):
//!     Load config → Validate → Set log threshold → Start listener
//!
//! Shutdown (shutdown.rs):
//!     Trigger → orchestrator stops listener → drain within deadline → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!
//! Config watcher:
//!     File change → orchestrator reload (stop, then start)
//! ```
//!
//! # Design Decisions
//! - One control loop: reload never overlaps shutdown
//! - Reload is strictly stop-then-start; at most one listener exists
//! - Shutdown has timeout: remaining connections are force-closed

pub mod orchestrator;
pub mod shutdown;
pub mod signals;

pub use orchestrator::{LifecycleState, Orchestrator, StartError};
pub use shutdown::Shutdown;
pub use signals::SignalListener;
