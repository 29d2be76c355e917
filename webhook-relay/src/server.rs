//! Listener lifecycle: bind, serve, and shut down within a grace period.
//!
//! Shutdown is driven by a [`CancellationToken`] owned by the caller, so
//! this module knows nothing about OS signals.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::logger::LogSink;
use crate::web::{router, AppState};

/// How long in-flight requests may run after shutdown is requested.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// A bound, not yet serving, webhook server.
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    state: AppState,
    grace: Duration,
}

impl Server {
    /// Validate `config` and bind `0.0.0.0:{port}`, logging to the console.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let state = AppState::new(config)?;
        Self::bind_state(state).await
    }

    /// Like [`Server::bind`], but logging to `sink`.
    pub async fn bind_with_sink(
        config: ServerConfig,
        sink: Arc<dyn LogSink>,
    ) -> Result<Self, ServerError> {
        let state = AppState::with_sink(config, sink)?;
        Self::bind_state(state).await
    }

    async fn bind_state(state: AppState) -> Result<Self, ServerError> {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, state.config.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;

        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        info!(
            address = %local_addr,
            signature_verification = state.config.is_signature_verification_enabled(),
            forward_url = state.config.forward_url().unwrap_or(""),
            quiet = state.config.quiet,
            "webhook_server_listening"
        );
        state.logger.listening(local_addr, &state.config);

        Ok(Self {
            listener,
            state,
            grace: SHUTDOWN_GRACE,
        })
    }

    /// Override the shutdown grace period.
    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener.local_addr().map_err(ServerError::Serve)
    }

    /// Serve until `shutdown` is cancelled.
    ///
    /// After cancellation no new connections are accepted and idle
    /// connections close. In-flight requests get the grace period to finish;
    /// connections still open after that are aborted.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), ServerError> {
        let app = router(self.state);
        let grace = self.grace;
        let listener = self.listener;
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!(error = %e, "webhook_server_accept_failed");
                            continue;
                        }
                    };
                    connections.spawn(serve_connection(
                        stream,
                        peer,
                        app.clone(),
                        shutdown.clone(),
                    ));
                }
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "webhook_server_connection_task_failed");
                    }
                }
            }
        }

        drop(listener);
        info!(open_connections = connections.len(), "webhook_server_shutting_down");

        let drained = tokio::time::timeout(grace, async {
            while connections.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!(
                grace_seconds = grace.as_secs_f64(),
                open_connections = connections.len(),
                "webhook_server_grace_period_elapsed"
            );
            connections.shutdown().await;
        }

        info!("webhook_server_stopped");

        Ok(())
    }
}

/// Serve one HTTP/1.1 connection, closing it gracefully on shutdown.
///
/// Requests run inside this task, so aborting it drops the connection and
/// any request still in progress.
async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    app: Router,
    shutdown: CancellationToken,
) {
    let service = TowerToHyperService::new(app);
    let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        () = shutdown.cancelled() => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };

    if let Err(e) = result {
        debug!(peer = %peer, error = %e, "webhook_server_connection_error");
    }
}
