//! HTTP listener wrapper.
//!
//! # Responsibilities
//! - Build the Axum router with the middleware pipeline attached
//! - Bind the configured address and accept connections (HTTP/1.1 and HTTP/2)
//! - Enforce the header-read timeout
//! - Stop: refuse new connections, drain in-flight ones, force-close at the deadline
//!
//! # Listener states
//! ```text
//! Idle → Binding → Listening → Draining → (ForceClosing →) Stopped
//!   └──────────── stop() before start() ───────────────────→ Stopped
//! ```
//! The state lives in a watch channel so `start` (running on its own task)
//! and `stop` (called from the control loop) observe each other without locks.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::{extract::ConnectInfo, middleware, Router};
use hyper::{body::Incoming, Request};
use hyper_util::{
    rt::{TokioExecutor, TokioIo, TokioTimer},
    server::conn::auto,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tower::Service;
use tower_http::catch_panic::CatchPanicLayer;

use crate::config::{validation::split_host_port, ApiConfig};
use crate::http::handlers;
use crate::http::middleware::{correlation_middleware, cors_layer, handle_panic};
use crate::security::TrustedProxies;

/// Lifecycle of a single listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Idle,
    Binding,
    Listening,
    Draining,
    ForceClosing,
    Stopped,
}

impl ListenerState {
    fn is_closing(&self) -> bool {
        matches!(
            self,
            ListenerState::Draining | ListenerState::ForceClosing | ListenerState::Stopped
        )
    }
}

/// Error type for listener operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("failed to start HTTP server: listen tcp {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },
    /// Accepting stopped with a non-transient error.
    #[error("failed to start HTTP server: accept: {0}")]
    Accept(#[source] io::Error),
}

/// HTTP listener for the API edge.
pub struct HttpServer {
    app: Router,
    listen_address: String,
    read_header_timeout: Duration,
    state: watch::Sender<ListenerState>,
    local_addr: OnceLock<SocketAddr>,
}

impl HttpServer {
    /// Create a server exposing the public routes.
    pub fn new(config: &ApiConfig) -> Self {
        Self::with_routes(config, handlers::routes())
    }

    /// Create a server around `routes`, wrapped in the full middleware pipeline.
    pub fn with_routes(config: &ApiConfig, routes: Router) -> Self {
        let app = build_app(config, routes);
        let (state, _) = watch::channel(ListenerState::Idle);

        Self {
            app,
            listen_address: config.http.listen_address.clone(),
            read_header_timeout: config.timeouts.read_header,
            state,
            local_addr: OnceLock::new(),
        }
    }

    pub fn state(&self) -> ListenerState {
        *self.state.borrow()
    }

    /// The bound address, once `start` has bound the socket.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    /// Wait until `start` has either bound the socket or given up.
    /// Returns the bound address on success.
    pub async fn wait_until_bound(&self) -> Option<SocketAddr> {
        let mut rx = self.state.subscribe();
        let _ = rx
            .wait_for(|state| !matches!(state, ListenerState::Idle | ListenerState::Binding))
            .await;
        self.local_addr()
    }

    /// Bind and serve until stopped.
    ///
    /// Returns `Ok(())` after an intentional stop (including a stop that
    /// happened before this call). Returns an error if the address cannot be
    /// bound or accepting fails for a non-transient reason.
    pub async fn start(&self) -> Result<(), ServerError> {
        let mut admitted = false;
        self.state.send_if_modified(|state| {
            if *state == ListenerState::Idle {
                *state = ListenerState::Binding;
                admitted = true;
                true
            } else {
                false
            }
        });
        if !admitted {
            return Ok(());
        }
        let _stopped = StoppedOnDrop(&self.state);

        let listener = TcpListener::bind(bind_address(&self.listen_address))
            .await
            .and_then(|listener| listener.local_addr().map(|addr| (listener, addr)));
        let (listener, local_addr) = match listener {
            Ok(bound) => bound,
            Err(source) => {
                return Err(ServerError::Bind {
                    address: self.listen_address.clone(),
                    source,
                })
            }
        };
        let _ = self.local_addr.set(local_addr);
        self.state.send_if_modified(|state| {
            if *state == ListenerState::Binding {
                *state = ListenerState::Listening;
                true
            } else {
                false
            }
        });

        tracing::info!(address = %local_addr, "Listener bound");

        let mut state_rx = self.state.subscribe();
        let mut connections = JoinSet::new();
        let result = loop {
            tokio::select! {
                biased;
                _ = wait_for_state(&mut state_rx, ListenerState::is_closing) => break Ok(()),
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tracing::debug!(peer_addr = %peer, "Connection accepted");
                        connections.spawn(self.connection_task(stream, peer));
                    }
                    Err(e) if is_transient(&e) => {
                        tracing::debug!(error = %e, "Transient accept error");
                    }
                    Err(e) => break Err(ServerError::Accept(e)),
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        };

        // Release the port before draining so a successor can bind it.
        drop(listener);

        if result.is_err() {
            self.state.send_replace(ListenerState::ForceClosing);
        }

        tracing::debug!(connections = connections.len(), "Draining connections");
        loop {
            tokio::select! {
                joined = connections.join_next() => {
                    if joined.is_none() {
                        break;
                    }
                }
                _ = wait_for_state(&mut state_rx, |s| *s == ListenerState::ForceClosing) => {
                    connections.abort_all();
                    while connections.join_next().await.is_some() {}
                    break;
                }
            }
        }

        tracing::info!(address = %local_addr, "HTTP server stopped");
        result
    }

    /// Stop the listener, giving in-flight requests up to `deadline` to
    /// finish before their connections are closed. Idempotent, and a no-op
    /// apart from marking the server stopped if `start` never ran.
    pub async fn stop(&self, deadline: Duration) {
        let mut previous = ListenerState::Idle;
        self.state.send_modify(|state| {
            previous = *state;
            *state = match *state {
                ListenerState::Idle => ListenerState::Stopped,
                ListenerState::Binding | ListenerState::Listening => ListenerState::Draining,
                other => other,
            };
        });
        if matches!(previous, ListenerState::Idle | ListenerState::Stopped) {
            return;
        }

        let mut rx = self.state.subscribe();
        let drained = tokio::time::timeout(
            deadline,
            wait_for_state(&mut rx, |s| *s == ListenerState::Stopped),
        )
        .await
        .is_ok();

        if !drained {
            tracing::warn!(
                deadline_ms = u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
                "Shutdown deadline exceeded, closing remaining connections"
            );
            self.state.send_if_modified(|state| {
                if *state == ListenerState::Draining {
                    *state = ListenerState::ForceClosing;
                    true
                } else {
                    false
                }
            });
            wait_for_state(&mut rx, |s| *s == ListenerState::Stopped).await;
        }
    }

    fn connection_task(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
    ) -> impl Future<Output = ()> + Send + 'static {
        let app = self.app.clone();
        let read_header_timeout = self.read_header_timeout;
        let mut state_rx = self.state.subscribe();

        async move {
            // The protocol sniffing in `auto` runs before hyper's header timer,
            // so the first byte is held to the same deadline here.
            let mut first = [0u8; 1];
            tokio::select! {
                peeked = tokio::time::timeout(read_header_timeout, stream.peek(&mut first)) => {
                    match peeked {
                        Ok(Ok(n)) if n > 0 => {}
                        Ok(Ok(_)) => return,
                        Ok(Err(e)) => {
                            tracing::debug!(peer_addr = %peer, error = %e, "Connection error");
                            return;
                        }
                        Err(_) => {
                            tracing::debug!(peer_addr = %peer, "Header read timeout, closing idle connection");
                            return;
                        }
                    }
                }
                _ = wait_for_state(&mut state_rx, ListenerState::is_closing) => return,
            }

            let service = hyper::service::service_fn(move |mut request: Request<Incoming>| {
                request.extensions_mut().insert(ConnectInfo(peer));
                app.clone().call(request)
            });

            let mut builder = auto::Builder::new(TokioExecutor::new());
            builder
                .http1()
                .timer(TokioTimer::new())
                .header_read_timeout(read_header_timeout);

            let conn = builder.serve_connection(TokioIo::new(stream), service);
            tokio::pin!(conn);

            tokio::select! {
                res = conn.as_mut() => {
                    if let Err(e) = res {
                        tracing::debug!(peer_addr = %peer, error = %e, "Connection error");
                    }
                }
                _ = wait_for_state(&mut state_rx, ListenerState::is_closing) => {
                    conn.as_mut().graceful_shutdown();
                    if let Err(e) = conn.as_mut().await {
                        tracing::debug!(peer_addr = %peer, error = %e, "Connection error while draining");
                    }
                }
            }
        }
    }
}

/// Attach the middleware pipeline to `routes`.
pub fn build_app(config: &ApiConfig, routes: Router) -> Router {
    let proxies = Arc::new(TrustedProxies::from_config(&config.http.trusted_proxies));

    routes
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(cors_layer(&config.http.cors))
        .layer(middleware::from_fn_with_state(proxies, correlation_middleware))
}

/// Turn a validated `host:port` into something `TcpListener::bind` accepts.
/// An empty host means all IPv4 interfaces.
fn bind_address(listen_address: &str) -> String {
    match split_host_port(listen_address) {
        Some(("", port)) => format!("0.0.0.0:{port}"),
        Some((host, port)) if host.contains(':') => format!("[{host}]:{port}"),
        Some((host, port)) => format!("{host}:{port}"),
        None => listen_address.to_string(),
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
    )
}

async fn wait_for_state(
    rx: &mut watch::Receiver<ListenerState>,
    predicate: impl FnMut(&ListenerState) -> bool,
) {
    let _ = rx.wait_for(predicate).await;
}

/// Marks the listener stopped however `start` exits, including cancellation.
struct StoppedOnDrop<'a>(&'a watch::Sender<ListenerState>);

impl Drop for StoppedOnDrop<'_> {
    fn drop(&mut self) {
        self.0.send_replace(ListenerState::Stopped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CorsConfig, HttpConfig, TimeoutConfig};
    use axum::{http::StatusCode, routing::get};
    use std::time::Instant;

    fn config(listen_address: &str) -> ApiConfig {
        ApiConfig {
            log_level: "debug".into(),
            timeouts: TimeoutConfig {
                startup: Duration::from_secs(5),
                shutdown: Duration::from_secs(5),
                read_header: Duration::from_secs(2),
            },
            http: HttpConfig {
                listen_address: listen_address.into(),
                cors: CorsConfig {
                    allowed_origins: vec!["*".into()],
                },
                trusted_proxies: vec![],
            },
        }
    }

    fn client() -> reqwest::Client {
        reqwest::Client::builder().no_proxy().build().unwrap()
    }

    fn spawn(server: &Arc<HttpServer>) -> tokio::task::JoinHandle<Result<(), ServerError>> {
        let server = Arc::clone(server);
        tokio::spawn(async move { server.start().await })
    }

    #[test]
    fn bind_address_forms() {
        assert_eq!(bind_address(":8080"), "0.0.0.0:8080");
        assert_eq!(bind_address("127.0.0.1:80"), "127.0.0.1:80");
        assert_eq!(bind_address("[::1]:80"), "[::1]:80");
        assert_eq!(bind_address("localhost:80"), "localhost:80");
    }

    #[tokio::test]
    async fn stop_without_start_is_a_noop() {
        let server = HttpServer::new(&config("127.0.0.1:0"));
        server.stop(Duration::from_secs(1)).await;
        server.stop(Duration::from_secs(1)).await;
        assert_eq!(server.state(), ListenerState::Stopped);

        // A stopped server never binds.
        assert!(server.start().await.is_ok());
        assert_eq!(server.local_addr(), None);
    }

    #[tokio::test]
    async fn serves_then_stops_and_releases_the_port() {
        let server = Arc::new(HttpServer::new(&config("127.0.0.1:0")));
        let task = spawn(&server);
        let addr = server.wait_until_bound().await.unwrap();
        assert_eq!(server.state(), ListenerState::Listening);

        let response = client()
            .get(format!("http://{addr}/v0/healthcheck"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.headers().contains_key("context-id"));

        server.stop(Duration::from_secs(5)).await;
        assert!(task.await.unwrap().is_ok());
        assert_eq!(server.state(), ListenerState::Stopped);

        let rebound = TcpListener::bind(addr).await;
        assert!(rebound.is_ok(), "port should be released after stop");
    }

    #[tokio::test]
    async fn bind_failure_names_the_address() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let address = occupied.local_addr().unwrap().to_string();

        let server = HttpServer::new(&config(&address));
        let err = server.start().await.unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, ServerError::Bind { .. }));
        assert!(message.starts_with(&format!("failed to start HTTP server: listen tcp {address}: ")));
        assert_eq!(server.state(), ListenerState::Stopped);
        assert_eq!(server.wait_until_bound().await, None);
    }

    #[tokio::test]
    async fn silent_clients_are_closed_after_the_header_timeout() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let mut config = config("127.0.0.1:0");
        config.timeouts.read_header = Duration::from_secs(1);
        let server = Arc::new(HttpServer::new(&config));
        let task = spawn(&server);
        let addr = server.wait_until_bound().await.unwrap();

        let mut silent = TcpStream::connect(addr).await.unwrap();
        let mut buf = [0u8; 64];
        let closed = tokio::time::timeout(Duration::from_secs(4), silent.read(&mut buf)).await;
        assert!(
            matches!(closed, Ok(Ok(0)) | Ok(Err(_))),
            "connection sending nothing should be closed by the server"
        );

        let mut partial = TcpStream::connect(addr).await.unwrap();
        partial.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n").await.unwrap();
        let closed = tokio::time::timeout(Duration::from_secs(4), partial.read(&mut buf)).await;
        assert!(closed.is_ok(), "partial headers should hit the header timeout");

        server.stop(Duration::from_secs(1)).await;
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn in_flight_requests_finish_within_the_deadline() {
        let routes = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(300)).await;
                StatusCode::OK
            }),
        );
        let server = Arc::new(HttpServer::with_routes(&config("127.0.0.1:0"), routes));
        let task = spawn(&server);
        let addr = server.wait_until_bound().await.unwrap();

        let request = tokio::spawn(client().get(format!("http://{addr}/slow")).send());
        tokio::time::sleep(Duration::from_millis(100)).await;

        server.stop(Duration::from_secs(5)).await;
        let response = request.await.unwrap().unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn deadline_force_closes_stuck_connections() {
        let routes = Router::new().route(
            "/stuck",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                StatusCode::OK
            }),
        );
        let server = Arc::new(HttpServer::with_routes(&config("127.0.0.1:0"), routes));
        let task = spawn(&server);
        let addr = server.wait_until_bound().await.unwrap();

        let request = tokio::spawn(client().get(format!("http://{addr}/stuck")).send());
        tokio::time::sleep(Duration::from_millis(100)).await;

        let began = Instant::now();
        server.stop(Duration::from_millis(200)).await;
        assert!(began.elapsed() < Duration::from_secs(5));
        assert!(task.await.unwrap().is_ok());
        assert!(request.await.unwrap().is_err());
    }
}
