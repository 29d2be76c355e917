//! Shared helpers for relay integration tests.
//!
//! Use [`TestApp`] to drive the router in-process with
//! `tower::ServiceExt::oneshot`, and [`spawn_downstream`] when a test needs a
//! real HTTP endpoint to forward to.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::routing::post;
use axum::Router;
use http_body_util::BodyExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower::ServiceExt;

use webhook_relay::{router, AppState, CaptureSink, Forwarder, ServerConfig};

// ============================================================================
// Test App
// ============================================================================

/// The relay router with its log output captured.
pub struct TestApp {
    pub router: Router,
    pub sink: CaptureSink,
}

impl TestApp {
    pub fn new(config: ServerConfig) -> Self {
        let sink = CaptureSink::new();
        let state = AppState::with_sink(config, Arc::new(sink.clone()))
            .expect("Failed to build app state");

        Self {
            router: router(state),
            sink,
        }
    }

    /// Build an app whose forwarder is supplied by the test.
    pub fn with_forwarder(config: ServerConfig, forwarder: Forwarder) -> Self {
        let sink = CaptureSink::new();
        let mut state = AppState::with_sink(config, Arc::new(sink.clone()))
            .expect("Failed to build app state");
        state.forwarder = Some(forwarder);

        Self {
            router: router(state),
            sink,
        }
    }

    /// Send a request through the router via `tower::ServiceExt::oneshot`.
    pub async fn oneshot(&self, request: Request<Body>) -> (StatusCode, String) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("oneshot request failed");

        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read response body")
            .to_bytes();

        (status, String::from_utf8_lossy(&body).into_owned())
    }

    /// POST a raw body to `/webhook`, optionally with a signature header.
    pub async fn post_webhook(&self, body: &[u8], signature: Option<&str>) -> StatusCode {
        let mut request = Request::builder()
            .method(Method::POST)
            .uri("/webhook")
            .header("content-type", "application/json");

        if let Some(signature) = signature {
            request = request.header("X-Line-Signature", signature);
        }

        let request = request
            .body(Body::from(body.to_vec()))
            .expect("Failed to build request");

        self.oneshot(request).await.0
    }

    pub fn stdout(&self) -> String {
        self.sink.stdout()
    }

    pub fn stderr(&self) -> String {
        self.sink.stderr()
    }
}

// ============================================================================
// Downstream
// ============================================================================

/// One request seen by the downstream endpoint.
#[derive(Debug)]
pub struct Received {
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// A running downstream endpoint.
pub struct Downstream {
    pub addr: SocketAddr,
    /// Full URL of the callback path
    pub url: String,
    pub received: mpsc::UnboundedReceiver<Received>,
}

#[derive(Clone)]
struct DownstreamState {
    tx: mpsc::UnboundedSender<Received>,
    status: StatusCode,
    delay: Duration,
}

async fn capture(
    State(state): State<DownstreamState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let _ = state.tx.send(Received { headers, body });
    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }
    state.status
}

/// Spawn a downstream endpoint that records requests and answers `status`.
pub async fn spawn_downstream(status: StatusCode) -> Downstream {
    spawn_downstream_with_delay(status, Duration::ZERO).await
}

/// Like [`spawn_downstream`], but waits `delay` before answering.
pub async fn spawn_downstream_with_delay(status: StatusCode, delay: Duration) -> Downstream {
    let (tx, received) = mpsc::unbounded_channel();
    let app = Router::new()
        .route("/callback", post(capture))
        .with_state(DownstreamState { tx, status, delay });

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind downstream");
    let addr = listener.local_addr().expect("Failed to get downstream address");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Downstream server failed");
    });

    Downstream {
        addr,
        url: format!("http://{}/callback", addr),
        received,
    }
}

/// A local URL with nothing listening on it.
pub fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get address");
    drop(listener);
    format!("http://{}/callback", addr)
}
