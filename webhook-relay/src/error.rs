//! Error types for the relay.
//!
//! Request errors become HTTP responses. Forward and payload problems are
//! logged and never reach the caller, so they have no response mapping.

use std::io;
use std::net::SocketAddr;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that end an inbound request with a non-200 status.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Failed to read request body: {0}")]
    UnreadableBody(String),

    #[error("Missing X-Line-Signature header")]
    MissingSignature,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Not found")]
    NotFound,
}

impl WebhookError {
    pub fn status(&self) -> StatusCode {
        match self {
            WebhookError::UnreadableBody(_) => StatusCode::BAD_REQUEST,
            WebhookError::MissingSignature => StatusCode::UNAUTHORIZED,
            WebhookError::InvalidSignature => StatusCode::FORBIDDEN,
            WebhookError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            WebhookError::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// Failure to relay a delivery downstream.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request timed out")]
    Timeout(#[source] reqwest::Error),

    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("downstream returned {0}")]
    Status(StatusCode),
}

impl From<reqwest::Error> for ForwardError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ForwardError::Timeout(e)
        } else {
            ForwardError::Transport(e)
        }
    }
}

/// Errors that stop the server from starting or serving.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to create forwarder: {0}")]
    Forwarder(#[source] ForwardError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] io::Error),
}
