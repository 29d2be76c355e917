//! Forwarding tests against a real downstream HTTP endpoint.

mod helpers;

use std::time::Duration;

use axum::body::Bytes;
use axum::http::StatusCode;

use helpers::{closed_port_url, spawn_downstream, spawn_downstream_with_delay, TestApp};
use webhook_relay::web::compute_signature;
use webhook_relay::{ForwardError, Forwarder, ServerConfig};

#[tokio::test]
async fn test_forwards_exact_body_and_signature() {
    let mut downstream = spawn_downstream(StatusCode::OK).await;
    let app = TestApp::new(
        ServerConfig::new(0)
            .with_secret("s3cr3t")
            .with_forward_url(downstream.url.clone()),
    );

    // Whitespace and key order must survive untouched
    let body = b"{ \"events\" : [ {\"type\":\"follow\",  \"mode\":\"active\"} ],\n \"destination\":\"U1\" }";
    let signature = compute_signature("s3cr3t", body).unwrap();

    let status = app.post_webhook(body, Some(&signature)).await;
    assert_eq!(status, StatusCode::OK);

    let received = downstream.received.try_recv().expect("downstream got nothing");
    assert_eq!(&received.body[..], &body[..]);
    assert_eq!(
        received.headers.get("x-line-signature").unwrap(),
        signature.as_str()
    );
    assert_eq!(
        received.headers.get("content-type").unwrap(),
        "application/json"
    );

    let out = app.stdout();
    assert!(out.contains("Event Type: follow"));
    assert!(out.contains(&format!("Forwarded to {}: 200 OK", downstream.url)));
}

#[tokio::test]
async fn test_forward_without_signature_header() {
    let mut downstream = spawn_downstream(StatusCode::OK).await;
    let app = TestApp::new(ServerConfig::new(0).with_forward_url(downstream.url.clone()));

    let status = app.post_webhook(b"{}", None).await;
    assert_eq!(status, StatusCode::OK);

    let received = downstream.received.try_recv().expect("downstream got nothing");
    assert_eq!(&received.body[..], b"{}");
    assert!(received.headers.get("x-line-signature").is_none());
}

#[tokio::test]
async fn test_empty_signature_header_is_not_copied() {
    let mut downstream = spawn_downstream(StatusCode::OK).await;
    let app = TestApp::new(ServerConfig::new(0).with_forward_url(downstream.url.clone()));

    let status = app.post_webhook(b"{}", Some("")).await;
    assert_eq!(status, StatusCode::OK);

    let received = downstream.received.try_recv().expect("downstream got nothing");
    assert!(received.headers.get("x-line-signature").is_none());
}

#[tokio::test]
async fn test_malformed_payload_is_still_forwarded() {
    let mut downstream = spawn_downstream(StatusCode::OK).await;
    let app = TestApp::new(ServerConfig::new(0).with_forward_url(downstream.url.clone()));

    let status = app.post_webhook(b"not valid json", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(app.stdout().contains("Raw body: not valid json"));

    let received = downstream.received.try_recv().expect("downstream got nothing");
    assert_eq!(&received.body[..], b"not valid json");
}

#[tokio::test]
async fn test_downstream_error_does_not_change_response() {
    let mut downstream = spawn_downstream(StatusCode::INTERNAL_SERVER_ERROR).await;
    let app = TestApp::new(ServerConfig::new(0).with_forward_url(downstream.url.clone()));

    let status = app.post_webhook(b"{}", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(downstream.received.try_recv().is_ok());

    let err = app.stderr();
    assert!(err.contains(&format!("Forward to {} failed", downstream.url)));
    assert!(err.contains("500 Internal Server Error"));
    assert!(!app.stdout().contains("Forwarded to"));
}

#[tokio::test]
async fn test_unreachable_forward_target() {
    let url = closed_port_url();
    let app = TestApp::new(ServerConfig::new(0).with_forward_url(url.clone()));

    let status = app.post_webhook(b"{}", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(app.stdout().contains("Events: (none)"));
    assert!(app.stderr().contains(&format!("Forward to {} failed", url)));
}

#[tokio::test]
async fn test_rejected_requests_are_not_forwarded() {
    let mut downstream = spawn_downstream(StatusCode::OK).await;
    let app = TestApp::new(
        ServerConfig::new(0)
            .with_secret("s3cr3t")
            .with_forward_url(downstream.url.clone()),
    );

    assert_eq!(app.post_webhook(b"{}", None).await, StatusCode::UNAUTHORIZED);
    assert_eq!(
        app.post_webhook(b"{}", Some("wrong")).await,
        StatusCode::FORBIDDEN
    );

    assert!(downstream.received.try_recv().is_err());
    assert!(!app.stdout().contains("Forwarded to"));
}

#[tokio::test]
async fn test_quiet_mode_hides_forward_outcome() {
    let mut downstream = spawn_downstream(StatusCode::OK).await;
    let app = TestApp::new(
        ServerConfig::new(0)
            .with_forward_url(downstream.url.clone())
            .with_quiet(true),
    );

    assert_eq!(app.post_webhook(b"{}", None).await, StatusCode::OK);
    assert!(downstream.received.try_recv().is_ok());
    assert!(app.stdout().is_empty());
    assert!(app.stderr().is_empty());
}

#[tokio::test]
async fn test_forward_times_out() {
    let downstream = spawn_downstream_with_delay(StatusCode::OK, Duration::from_secs(2)).await;
    let forwarder =
        Forwarder::with_timeout(downstream.url.clone(), Duration::from_millis(100)).unwrap();

    let result = forwarder.forward(Bytes::from_static(b"{}"), None).await;
    assert!(matches!(result, Err(ForwardError::Timeout(_))));
}

#[tokio::test]
async fn test_forward_timeout_does_not_change_response() {
    let downstream = spawn_downstream_with_delay(StatusCode::OK, Duration::from_secs(2)).await;
    let forwarder =
        Forwarder::with_timeout(downstream.url.clone(), Duration::from_millis(100)).unwrap();
    let app = TestApp::with_forwarder(ServerConfig::new(0), forwarder);

    let status = app.post_webhook(b"{}", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(app.stdout().contains("Events: (none)"));
    assert!(app.stderr().contains(&format!(
        "Forward to {} failed: request timed out",
        downstream.url
    )));
}
