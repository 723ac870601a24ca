#![allow(
    clippy::unwrap_used,
    clippy::panic,
    clippy::todo,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    missing_debug_implementations,
    unreachable_pub,
    clippy::print_stdout
)]
mod common;

use common::TestApp;
use serde_json::Value;

#[tokio::test]
async fn test_livez() {
    let app = TestApp::spawn().await;

    let resp = app.client.get(format!("{}/livez", app.mgmt_url)).send().await.unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_readyz_reports_disabled_pubsub() {
    let app = TestApp::spawn().await;

    let resp = app.client.get(format!("{}/readyz", app.mgmt_url)).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "ok");
    assert_eq!(body["pubsub"], "disabled");
}

#[tokio::test]
async fn test_management_routes_are_not_public() {
    let app = TestApp::spawn().await;

    let resp = app.client.get(format!("{}/livez", app.server_url)).send().await.unwrap();
    assert_eq!(resp.status(), 404);

    let resp = app.client.post(format!("{}/internal/events", app.server_url)).send().await.unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_request_id_is_propagated() {
    let app = TestApp::spawn().await;
    let (client, _) = app.create_pair().await;

    let resp = app
        .client
        .get(format!("{}/v1/chat/conversations", app.server_url))
        .bearer_auth(&client.token)
        .header("x-request-id", "trace-me-123")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers().get("x-request-id").unwrap(), "trace-me-123");

    let resp = app
        .client
        .get(format!("{}/v1/chat/conversations", app.server_url))
        .bearer_auth(&client.token)
        .send()
        .await
        .unwrap();
    assert!(resp.headers().get("x-request-id").is_some());
}
