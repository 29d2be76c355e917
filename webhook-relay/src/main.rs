//! Webhook relay binary.
//!
//! Reads its configuration from the environment, serves the relay and shuts
//! down gracefully on SIGINT/SIGTERM.

use anyhow::{Context, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use webhook_relay::{Server, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Structured diagnostics on stderr; stdout belongs to the event log
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true).with_writer(std::io::stderr))
        .init();

    info!("webhook_relay_starting");

    let config = ServerConfig::from_env();
    info!(
        port = config.port,
        secret_configured = config.secret().is_some(),
        forward_url = ?config.forward_url(),
        quiet = config.quiet,
        "config_loaded"
    );

    let server = Server::bind(config)
        .await
        .context("Failed to start webhook server")?;

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    server.run(shutdown).await.context("Server error")?;

    info!("webhook_relay_shutdown_complete");

    Ok(())
}

/// Cancel `token` when a shutdown signal is received.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "ctrl_c_handler_failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "sigterm_handler_failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    token.cancel();
}
