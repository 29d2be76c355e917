//! Best-effort relay of accepted deliveries to a second endpoint.

use std::time::Duration;

use axum::body::Bytes;
use axum::http::{HeaderValue, StatusCode};
use reqwest::{header::CONTENT_TYPE, Client};
use tracing::{error, info};

use crate::error::ForwardError;
use crate::web::signature::SIGNATURE_HEADER;

/// Upper bound for one forward attempt, connect through response.
pub const FORWARD_TIMEOUT: Duration = Duration::from_secs(10);

/// Re-POSTs raw webhook bodies to a fixed URL.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: Client,
    url: String,
}

impl Forwarder {
    pub fn new(url: impl Into<String>) -> Result<Self, ForwardError> {
        Self::with_timeout(url, FORWARD_TIMEOUT)
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self, ForwardError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ForwardError::Client)?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send `body` unchanged, copying the signature header if there was one.
    ///
    /// Any non-2xx response counts as a failure.
    pub async fn forward(
        &self,
        body: Bytes,
        signature: Option<&HeaderValue>,
    ) -> Result<StatusCode, ForwardError> {
        info!(
            url = %self.url,
            body_length = body.len(),
            has_signature = signature.is_some(),
            "forward_starting"
        );

        let mut request = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .body(body);

        if let Some(signature) = signature {
            request = request.header(SIGNATURE_HEADER, signature.clone());
        }

        let response = match request.send().await {
            Ok(resp) => resp,
            Err(e) => {
                error!(url = %self.url, error = %e, timeout = e.is_timeout(), "forward_request_error");
                return Err(e.into());
            }
        };

        let status = response.status();
        if !status.is_success() {
            error!(url = %self.url, status_code = status.as_u16(), "forward_rejected");
            return Err(ForwardError::Status(status));
        }

        info!(url = %self.url, status_code = status.as_u16(), "forward_complete");

        Ok(status)
    }
}
