//! JSON response bodies.
//!
//! Clients only ever see a status code and, for failures, a generic
//! `{"error": "..."}` body. Internal detail goes to the log stream.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Message returned for any failure that escapes a handler.
pub const SERVER_ERROR_MESSAGE: &str = "a server error was encountered";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
}

/// Respond with `{"error": message}`. An empty message becomes "unknown error".
pub fn respond_with_error(status: StatusCode, message: &str) -> Response {
    let error = if message.is_empty() {
        "unknown error".to_string()
    } else {
        message.to_string()
    };
    (status, Json(ErrorBody { error })).into_response()
}
