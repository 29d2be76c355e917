//! Developer-facing log output.
//!
//! Each request produces one block of text that is handed to the sink in a
//! single call, so concurrent requests never interleave line by line.
//! Structured diagnostics go through `tracing` separately.

use std::fmt::{self, Display};
use std::io::{self, Write};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use axum::http::{Method, StatusCode};
use chrono::{DateTime, Local, SecondsFormat};

use crate::config::ServerConfig;
use crate::error::{ForwardError, WebhookError};
use crate::payload::{Event, EventSource, WebhookPayload};

/// Where log blocks end up.
pub trait LogSink: Send + Sync {
    /// Regular output (stdout).
    fn write_out(&self, block: &str);

    /// Error output (stderr).
    fn write_err(&self, block: &str);
}

/// Writes to the process stdout/stderr, holding the stream lock per block.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl LogSink for ConsoleSink {
    fn write_out(&self, block: &str) {
        let mut out = io::stdout().lock();
        let _ = out.write_all(block.as_bytes()).and_then(|_| out.flush());
    }

    fn write_err(&self, block: &str) {
        let mut err = io::stderr().lock();
        let _ = err.write_all(block.as_bytes()).and_then(|_| err.flush());
    }
}

/// In-memory sink, mainly for tests.
#[derive(Debug, Default, Clone)]
pub struct CaptureSink {
    out: Arc<Mutex<String>>,
    err: Arc<Mutex<String>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written to regular output so far.
    pub fn stdout(&self) -> String {
        self.out.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Everything written to error output so far.
    pub fn stderr(&self) -> String {
        self.err.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl LogSink for CaptureSink {
    fn write_out(&self, block: &str) {
        self.out
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_str(block);
    }

    fn write_err(&self, block: &str) {
        self.err
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_str(block);
    }
}

/// Renders deliveries, rejections and forward outcomes for the developer.
#[derive(Clone)]
pub struct EventLogger {
    sink: Arc<dyn LogSink>,
    quiet: bool,
}

impl EventLogger {
    pub fn new(sink: Arc<dyn LogSink>, quiet: bool) -> Self {
        Self { sink, quiet }
    }

    pub fn console(quiet: bool) -> Self {
        Self::new(Arc::new(ConsoleSink), quiet)
    }

    /// Startup banner, printed once the listener is bound.
    pub fn listening(&self, addr: SocketAddr, config: &ServerConfig) {
        if self.quiet {
            return;
        }

        let mut block = String::new();
        line(&mut block, format_args!("Webhook server listening on {}", addr));
        line(
            &mut block,
            format_args!("  POST http://localhost:{}/webhook", addr.port()),
        );
        let verification = if config.is_signature_verification_enabled() {
            "enabled"
        } else {
            "disabled"
        };
        line(&mut block, format_args!("Signature verification: {}", verification));
        if let Some(url) = config.forward_url() {
            line(&mut block, format_args!("Forwarding to: {}", url));
        }
        self.sink.write_out(&block);
    }

    /// A delivery that decoded into a payload.
    pub fn payload(&self, method: &Method, path: &str, payload: &WebhookPayload) {
        if self.quiet {
            return;
        }

        let mut block = request_line(method, path, StatusCode::OK);
        block.push_str(&render_payload(payload));
        block.push('\n');
        self.sink.write_out(&block);
    }

    /// A delivery that was not valid JSON.
    pub fn raw_body(&self, method: &Method, path: &str, raw: &[u8]) {
        if self.quiet {
            return;
        }

        let mut block = request_line(method, path, StatusCode::OK);
        line(
            &mut block,
            format_args!("Raw body: {}", String::from_utf8_lossy(raw)),
        );
        block.push('\n');
        self.sink.write_out(&block);
    }

    /// A request that ended with a non-200 status. Always written.
    pub fn rejected(&self, method: &Method, path: &str, err: &WebhookError) {
        let status = err.status();
        let mut block = String::new();
        line(
            &mut block,
            format_args!(
                "[{}] {} {} - {} {}",
                timestamp(),
                method,
                path,
                status.as_u16(),
                err
            ),
        );
        self.sink.write_err(&block);
    }

    pub fn forwarded(&self, url: &str, status: StatusCode) {
        if self.quiet {
            return;
        }

        let mut block = String::new();
        line(&mut block, format_args!("Forwarded to {}: {}", url, status));
        self.sink.write_out(&block);
    }

    pub fn forward_failed(&self, url: &str, err: &ForwardError) {
        if self.quiet {
            return;
        }

        let mut block = String::new();
        line(
            &mut block,
            format_args!("[{}] Forward to {} failed: {}", timestamp(), url, err),
        );
        self.sink.write_err(&block);
    }
}

impl fmt::Debug for EventLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLogger")
            .field("quiet", &self.quiet)
            .finish_non_exhaustive()
    }
}

impl Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventSource::User { user_id } => write!(f, "user (User: {})", user_id),
            EventSource::Group { group_id, user_id } => {
                write!(f, "group (Group: {}", group_id)?;
                if let Some(user_id) = user_id {
                    write!(f, ", User: {}", user_id)?;
                }
                f.write_str(")")
            }
            EventSource::Room { room_id, user_id } => {
                write!(f, "room (Room: {}", room_id)?;
                if let Some(user_id) = user_id {
                    write!(f, ", User: {}", user_id)?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Render a decoded delivery, one line per fact.
pub fn render_payload(payload: &WebhookPayload) -> String {
    let mut out = String::new();

    if let Some(destination) = &payload.destination {
        line(&mut out, format_args!("Destination: {}", destination));
    }

    if payload.events.is_empty() {
        line(&mut out, "Events: (none)");
        return out;
    }

    let numbered = payload.events.len() > 1;
    for (i, event) in payload.events.iter().enumerate() {
        if numbered {
            line(&mut out, format_args!("--- Event {} ---", i + 1));
        }
        render_event(&mut out, event);
    }

    out
}

fn render_event(out: &mut String, event: &Event) {
    line(out, format_args!("Event Type: {}", event.kind));

    if let Some(mode) = &event.mode {
        line(out, format_args!("Mode: {}", mode));
    }
    if let Some(ms) = event.timestamp {
        match DateTime::from_timestamp_millis(ms) {
            Some(at) => line(
                out,
                format_args!(
                    "Timestamp: {} ({})",
                    ms,
                    at.to_rfc3339_opts(SecondsFormat::Millis, true)
                ),
            ),
            None => line(out, format_args!("Timestamp: {}", ms)),
        }
    }
    if let Some(id) = &event.webhook_event_id {
        line(out, format_args!("Webhook Event ID: {}", id));
    }
    if event.is_redelivery() {
        line(out, "Redelivery: true");
    }
    if let Some(source) = &event.source {
        line(out, format_args!("Source: {}", source));
    }
    if let Some(token) = &event.reply_token {
        line(out, format_args!("Reply Token: {}", token));
    }
    for (label, body) in event.bodies() {
        line(out, format_args!("{}: {}", label, body.compact()));
    }
}

fn request_line(method: &Method, path: &str, status: StatusCode) -> String {
    let mut out = String::new();
    line(
        &mut out,
        format_args!("[{}] {} {} - {}", timestamp(), method, path, status),
    );
    out
}

fn timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn line(out: &mut String, text: impl Display) {
    use std::fmt::Write as _;
    let _ = writeln!(out, "{}", text);
}
