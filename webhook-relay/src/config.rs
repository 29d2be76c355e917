//! Configuration module for the webhook relay.
//!
//! The relay reads its settings once at startup. After that the
//! [`ServerConfig`] is shared read-only between the listener and every
//! request handler.

use std::env;

use thiserror::Error;
use tracing::warn;
use url::Url;

/// Port used when `PORT` is unset or unparseable.
pub const DEFAULT_PORT: u16 = 8080;

/// Configuration errors detected before the listener binds.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid forward URL {url:?}: {source}")]
    InvalidForwardUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unsupported forward URL scheme {scheme:?} (expected http or https)")]
    UnsupportedForwardScheme { scheme: String },
}

/// Immutable server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Port to listen on (all interfaces)
    pub port: u16,

    /// LINE channel secret used for signature verification
    pub secret: Option<String>,

    /// Downstream endpoint that receives a copy of every accepted delivery
    pub forward_url: Option<String>,

    /// Suppress developer log output on stdout
    pub quiet: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PORT)
    }
}

impl ServerConfig {
    /// Create a configuration with verification, forwarding and quiet mode off.
    pub fn new(port: u16) -> Self {
        Self {
            port,
            secret: None,
            forward_url: None,
            quiet: false,
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_PORT),

            secret: non_empty(env::var("LINE_CHANNEL_SECRET").ok()),

            forward_url: non_empty(env::var("FORWARD_URL").ok()),

            quiet: env::var("QUIET")
                .ok()
                .map(|v| parse_flag("QUIET", &v))
                .unwrap_or(false),
        }
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = non_empty(Some(secret.into()));
        self
    }

    pub fn with_forward_url(mut self, url: impl Into<String>) -> Self {
        self.forward_url = non_empty(Some(url.into()));
        self
    }

    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// The channel secret, if signature verification is enabled.
    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref().filter(|s| !s.trim().is_empty())
    }

    /// The forward target, if forwarding is enabled.
    pub fn forward_url(&self) -> Option<&str> {
        self.forward_url.as_deref().filter(|s| !s.trim().is_empty())
    }

    pub fn is_signature_verification_enabled(&self) -> bool {
        self.secret().is_some()
    }

    /// Check the settings that can only fail at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(raw) = self.forward_url() {
            let parsed = Url::parse(raw).map_err(|source| ConfigError::InvalidForwardUrl {
                url: raw.to_string(),
                source,
            })?;

            match parsed.scheme() {
                "http" | "https" => {}
                other => {
                    return Err(ConfigError::UnsupportedForwardScheme {
                        scheme: other.to_string(),
                    })
                }
            }
        }

        Ok(())
    }
}

/// Treat unset, empty and whitespace-only values the same way.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_flag(name: &str, raw: &str) -> bool {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "" | "0" | "false" | "no" | "off" => false,
        _ => {
            warn!(env_var = name, value = %raw, "Invalid boolean flag, using false");
            false
        }
    }
}
