//! Local LINE webhook relay.
//!
//! Receives webhook deliveries, verifies their signature, prints the events
//! for a developer and optionally relays the untouched body to another
//! endpoint. LINE always gets a prompt 200 unless the request itself is bad.
//!
//! ## Request flow
//!
//! ```text
//! POST /webhook → verify signature → decode + log → forward → 200 OK
//! ```

pub mod config;
pub mod error;
pub mod forward;
pub mod logger;
pub mod payload;
pub mod server;
pub mod web;

// Re-export commonly used types
pub use config::{ConfigError, ServerConfig};
pub use error::{ForwardError, ServerError, WebhookError};
pub use forward::Forwarder;
pub use logger::{CaptureSink, ConsoleSink, EventLogger, LogSink};
pub use payload::{Event, EventSource, WebhookPayload};
pub use server::{Server, SHUTDOWN_GRACE};
pub use web::{router, AppState};
