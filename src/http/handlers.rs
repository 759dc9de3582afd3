//! Route handlers. Stateless; every response is a bare status or a JSON error.

use axum::{http::StatusCode, response::Response, routing::get, Router};

use crate::http::response::respond_with_error;

/// The public routes, without middleware.
pub fn routes() -> Router {
    Router::new()
        .route("/", get(root))
        .route("/v0/healthcheck", get(healthcheck))
        .fallback(not_found)
}

pub async fn root() -> StatusCode {
    StatusCode::NO_CONTENT
}

pub async fn healthcheck() -> StatusCode {
    StatusCode::NO_CONTENT
}

pub async fn not_found() -> Response {
    respond_with_error(StatusCode::NOT_FOUND, "not found")
}
