//! Request middleware pipeline.
//!
//! Layer order, outermost first:
//! ```text
//! correlation.rs (context id, client ip, timing, request_info log)
//!     → cors.rs (allowed origins, preflight)
//!     → recovery.rs (panic → 500 JSON + error log)
//!     → route handlers
//! ```
//! Recovery sits inside correlation so a recovered panic still gets its
//! `request_info` line with the 500 status.

pub mod correlation;
pub mod cors;
pub mod recovery;

pub use correlation::correlation_middleware;
pub use cors::cors_layer;
pub use recovery::handle_panic;
