//! Webhook endpoint handlers.
//!
//! A delivery goes through these stages in order:
//! 1. Verify the signature (only when a channel secret is configured)
//! 2. Decode and log the events, falling back to the raw body
//! 3. Forward the untouched body (only when a forward URL is configured)
//! 4. Return 200 OK
//!
//! Only a bad request or a failed signature check ends with another status.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::error::{ServerError, WebhookError};
use crate::forward::Forwarder;
use crate::logger::{EventLogger, LogSink};
use crate::payload;
use crate::web::signature::{verify_signature, SIGNATURE_HEADER};

/// Path LINE delivers webhooks to.
pub const WEBHOOK_PATH: &str = "/webhook";

/// Shared application state.
#[derive(Clone, Debug)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub logger: EventLogger,
    pub forwarder: Option<Forwarder>,
}

impl AppState {
    /// Build state that logs to the console.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let logger = EventLogger::console(config.quiet);
        Self::with_logger(config, logger)
    }

    /// Build state that logs to a custom sink.
    pub fn with_sink(config: ServerConfig, sink: Arc<dyn LogSink>) -> Result<Self, ServerError> {
        let logger = EventLogger::new(sink, config.quiet);
        Self::with_logger(config, logger)
    }

    fn with_logger(config: ServerConfig, logger: EventLogger) -> Result<Self, ServerError> {
        config.validate()?;

        let forwarder = config
            .forward_url()
            .map(Forwarder::new)
            .transpose()
            .map_err(ServerError::Forwarder)?;

        Ok(Self {
            config: Arc::new(config),
            logger,
            forwarder,
        })
    }
}

// =============================================================================
// Info banner
// =============================================================================

/// Banner text for `GET /`.
pub async fn index(State(state): State<AppState>) -> impl IntoResponse {
    let verification = if state.config.is_signature_verification_enabled() {
        "enabled"
    } else {
        "disabled"
    };
    let forwarding = state.config.forward_url().unwrap_or("disabled");

    format!(
        "LINE Webhook Server\n\n\
         POST {} to receive webhook events\n\
         Signature verification: {}\n\
         Forwarding: {}\n",
        WEBHOOK_PATH, verification, forwarding
    )
}

// =============================================================================
// Webhook
// =============================================================================

/// LINE webhook endpoint.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    match handle_delivery(&state, &headers, body).await {
        Ok(()) => (StatusCode::OK, "OK").into_response(),
        Err(err) => {
            state.logger.rejected(&Method::POST, WEBHOOK_PATH, &err);
            err.into_response()
        }
    }
}

async fn handle_delivery(
    state: &AppState,
    headers: &HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<(), WebhookError> {
    let body = body.map_err(|rejection| {
        warn!(error = %rejection, "webhook_body_unreadable");
        WebhookError::UnreadableBody(rejection.body_text())
    })?;

    // An empty header is the same as no header
    let signature = headers
        .get(SIGNATURE_HEADER)
        .filter(|value| !value.is_empty());

    info!(
        body_length = body.len(),
        has_signature = signature.is_some(),
        "webhook_received"
    );

    if let Some(secret) = state.config.secret() {
        let provided = signature.ok_or_else(|| {
            warn!("webhook_signature_missing");
            WebhookError::MissingSignature
        })?;

        let provided = provided.to_str().map_err(|_| {
            warn!("webhook_signature_not_ascii");
            WebhookError::InvalidSignature
        })?;

        if !verify_signature(secret, &body, provided) {
            warn!("webhook_signature_invalid");
            return Err(WebhookError::InvalidSignature);
        }
    }

    match payload::decode(&body) {
        Ok(payload) => {
            info!(
                destination = payload.destination.as_deref().unwrap_or(""),
                events = payload.events.len(),
                "webhook_decoded"
            );
            state.logger.payload(&Method::POST, WEBHOOK_PATH, &payload);
        }
        Err(e) => {
            warn!(error = %e, "webhook_payload_malformed");
            state.logger.raw_body(&Method::POST, WEBHOOK_PATH, &body);
        }
    }

    if let Some(forwarder) = &state.forwarder {
        match forwarder.forward(body, signature).await {
            Ok(status) => state.logger.forwarded(forwarder.url(), status),
            Err(e) => state.logger.forward_failed(forwarder.url(), &e),
        }
    }

    Ok(())
}

// =============================================================================
// Rejections
// =============================================================================

/// Fallback for unsupported methods on a known path.
pub async fn method_not_allowed(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
) -> Response {
    reject(&state, &method, &uri, WebhookError::MethodNotAllowed)
}

/// Fallback for unknown paths.
pub async fn not_found(State(state): State<AppState>, method: Method, uri: Uri) -> Response {
    reject(&state, &method, &uri, WebhookError::NotFound)
}

fn reject(state: &AppState, method: &Method, uri: &Uri, err: WebhookError) -> Response {
    warn!(method = %method, path = %uri.path(), status = err.status().as_u16(), "request_rejected");
    state.logger.rejected(method, uri.path(), &err);
    err.into_response()
}
