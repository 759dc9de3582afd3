//! Panic recovery boundary.
//!
//! Used with `tower_http::catch_panic::CatchPanicLayer::custom`. The panic
//! payload is logged; the client only receives the generic error body.

use std::any::Any;

use axum::{http::StatusCode, response::Response};

use crate::http::response::{respond_with_error, SERVER_ERROR_MESSAGE};

pub fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };

    tracing::error!(error = %detail, "recovery middleware");
    respond_with_error(StatusCode::INTERNAL_SERVER_ERROR, SERVER_ERROR_MESSAGE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::response::ErrorBody;
    use axum::{body::Body, http::Request, routing::get, Router};
    use tower::ServiceExt;
    use tower_http::catch_panic::CatchPanicLayer;

    #[tokio::test]
    async fn panic_becomes_generic_500() {
        let app: Router = Router::new()
            .route(
                "/boom",
                get(|| async { panic!("database exploded") as () }),
            )
            .layer(CatchPanicLayer::custom(handle_panic));

        let response = app
            .oneshot(Request::get("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.error, SERVER_ERROR_MESSAGE);
        assert!(!body.error.contains("database"));
    }
}
