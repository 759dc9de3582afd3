//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → headers.rs (peer trusted? then X-Forwarded-For / X-Real-IP)
//!     → resolved client IP recorded in the request log
//! ```
//!
//! # Design Decisions
//! - No trust in client input unless the peer is a configured proxy

pub mod headers;

pub use headers::TrustedProxies;
