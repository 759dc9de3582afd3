//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (accept loop, hyper auto builder, header-read timeout)
//!     → middleware/ (correlation → cors → recovery)
//!     → handlers.rs (static routes)
//!     → response.rs (JSON error bodies)
//! ```

pub mod handlers;
pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use request::{ContextId, CONTEXT_ID};
pub use server::{HttpServer, ListenerState, ServerError};
