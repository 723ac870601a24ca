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
use futures::StreamExt;
use std::time::Duration;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

#[tokio::test]
async fn test_shutdown_closes_sockets_with_going_away() {
    let app = TestApp::spawn().await;
    let (client, _) = app.create_pair().await;
    let mut ws = app.connect_identified(&client).await;

    app.shutdown();

    let start = std::time::Instant::now();
    let mut close_code = None;
    while start.elapsed() < Duration::from_secs(5) {
        match tokio::time::timeout(Duration::from_millis(500), ws.stream.next()).await {
            Ok(Some(Ok(Message::Close(frame)))) => {
                close_code = frame.map(|f| f.code);
                break;
            }
            Ok(Some(Ok(_))) | Err(_) => {}
            Ok(Some(Err(_)) | None) => break,
        }
    }

    assert_eq!(close_code, Some(CloseCode::Away));
}
