//! Transit API edge server library.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::schema::ApiConfig;
pub use http::HttpServer;
pub use lifecycle::{Orchestrator, Shutdown};
