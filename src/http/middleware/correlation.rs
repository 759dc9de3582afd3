//! Correlation middleware.
//! Assigns the context id, resolves the client IP and emits one
//! `request_info` line per request.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderValue, Request},
    middleware::Next,
    response::Response,
};

use crate::http::request::{ContextId, CONTEXT_ID};
use crate::security::TrustedProxies;

pub async fn correlation_middleware(
    State(proxies): State<Arc<TrustedProxies>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();

    let context_id = ContextId::resolve(
        request
            .headers()
            .get(&CONTEXT_ID)
            .and_then(|value| value.to_str().ok()),
    );
    request.extensions_mut().insert(context_id);

    let ip = proxies.client_ip(peer, request.headers());
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    // Handlers read the id from extensions before any response exists; a
    // header they set themselves takes precedence.
    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&context_id.to_string()) {
        response.headers_mut().entry(CONTEXT_ID).or_insert(value);
    }

    let latency_ns = u64::try_from(start.elapsed().as_nanos()).unwrap_or(u64::MAX);
    tracing::info!(
        ip = %ip,
        method = %method,
        path = %path,
        context_id = %context_id,
        latency_ns,
        status = response.status().as_u16(),
        "request_info"
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::connect_info::MockConnectInfo, http::StatusCode, middleware, routing::get,
        Extension, Router,
    };
    use tower::ServiceExt;
    use uuid::Uuid;

    fn app(peer: &str) -> Router {
        let proxies = Arc::new(TrustedProxies::from_config(&["10.0.0.2".to_string()]));
        Router::new()
            .route(
                "/echo",
                get(|Extension(id): Extension<ContextId>| async move { id.to_string() }),
            )
            .route(
                "/override",
                get(|| async { ([(CONTEXT_ID, "handler-chosen")], StatusCode::OK) }),
            )
            .fallback(|| async { StatusCode::NOT_FOUND })
            .layer(middleware::from_fn_with_state(proxies, correlation_middleware))
            .layer(MockConnectInfo(peer.parse::<SocketAddr>().unwrap()))
    }

    #[tokio::test]
    async fn mints_id_when_header_missing() {
        let response = app("127.0.0.1:5000")
            .oneshot(Request::get("/echo").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let header = response.headers().get(CONTEXT_ID).unwrap().to_str().unwrap();
        let id = Uuid::parse_str(header).unwrap();
        assert_eq!(id.get_version_num(), 7);
    }

    #[tokio::test]
    async fn handler_sees_the_same_id_as_the_response_header() {
        let response = app("127.0.0.1:5000")
            .oneshot(Request::get("/echo").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let header = response.headers().get(CONTEXT_ID).unwrap().to_str().unwrap().to_string();
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(header.as_bytes(), &body[..]);
    }

    #[tokio::test]
    async fn fresh_inbound_id_is_echoed() {
        let inbound = Uuid::now_v7().to_string();
        let response = app("127.0.0.1:5000")
            .oneshot(
                Request::get("/echo")
                    .header("context-id", &inbound)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers().get(CONTEXT_ID).unwrap(), inbound.as_str());
    }

    #[tokio::test]
    async fn handler_set_id_is_not_overwritten() {
        let response = app("127.0.0.1:5000")
            .oneshot(Request::get("/override").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.headers().get(CONTEXT_ID).unwrap(), "handler-chosen");
        assert_eq!(response.headers().get_all(CONTEXT_ID).iter().count(), 1);
    }

    #[tokio::test]
    async fn unmatched_routes_still_get_an_id() {
        let response = app("127.0.0.1:5000")
            .oneshot(Request::get("/missing").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().contains_key(CONTEXT_ID));
    }
}
