#![allow(
    clippy::unwrap_used,
    clippy::panic,
    clippy::todo,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    missing_debug_implementations,
    clippy::cast_precision_loss,
    clippy::clone_on_ref_ptr,
    clippy::match_same_arms,
    clippy::items_after_statements,
    unreachable_pub,
    clippy::print_stdout,
    clippy::similar_names
)]
mod common;

use common::TestApp;
use serde_json::json;
use std::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Error as WsError;
use uuid::Uuid;

const QUIET: Duration = Duration::from_millis(300);

#[tokio::test]
async fn test_upgrade_requires_valid_token() {
    let app = TestApp::spawn().await;

    for url in [app.ws_url.clone(), format!("{}?token=garbage", app.ws_url)] {
        match connect_async(url).await {
            Err(WsError::Http(resp)) => assert_eq!(resp.status(), 401),
            other => panic!("expected 401 handshake failure, got {:?}", other.map(|_| ())),
        }
    }
}

#[tokio::test]
async fn test_identify_confirms_only_the_token_subject() {
    let app = TestApp::spawn().await;
    let (client, _) = app.create_pair().await;

    let mut ws = app.connect_ws(&client.token).await;
    ws.emit("user_connected", json!(Uuid::new_v4())).await;
    let rejected = ws.expect_event("identify_error").await;
    assert!(rejected["error"].as_str().unwrap().contains("does not match"));

    ws.emit("identify", json!({"userId": client.id})).await;
    let confirmed = ws.expect_event("connection_confirmed").await;
    assert_eq!(confirmed["userId"], json!(client.id));
    assert!(confirmed["timestamp"].is_string());
}

#[tokio::test]
async fn test_malformed_frames_keep_connection_open() {
    let app = TestApp::spawn().await;
    let (client, _) = app.create_pair().await;
    let mut ws = app.connect_identified(&client).await;

    ws.send_raw("this is not json").await;
    let error = ws.expect_event("error").await;
    assert!(error["error"].as_str().unwrap().starts_with("Malformed frame"));

    ws.emit("teleport", json!({})).await;
    let error = ws.expect_event("error").await;
    assert_eq!(error["error"], "Unknown event: teleport");

    ws.emit("send_message", json!({"content": "missing ids"})).await;
    ws.expect_event("message_error").await;

    ws.sync().await;
}

#[tokio::test]
async fn test_socket_send_reaches_receiver_but_not_origin() {
    let app = TestApp::spawn().await;
    let (client, photographer) = app.create_pair().await;
    let conversation_id = app.open_conversation(&client, &photographer).await;

    let mut sender_ws = app.connect_identified(&client).await;
    sender_ws.join(conversation_id).await;
    let mut receiver_ws = app.connect_identified(&photographer).await;

    sender_ws
        .emit(
            "send_message",
            json!({
                "conversationId": conversation_id,
                "senderId": client.id,
                "receiverId": photographer.id,
                "content": "Booked for Saturday?"
            }),
        )
        .await;

    let ack = sender_ws.expect_event("message_sent_success").await;
    assert_eq!(ack["content"], "Booked for Saturday?");

    let delivered = receiver_ws.expect_event("new_message").await;
    assert_eq!(delivered["id"], ack["id"]);
    assert_eq!(delivered["sender"]["name"], "Alice Client");

    sender_ws.expect_no_event("new_message", QUIET).await;

    let pushes = app.pushes.wait_for(photographer.id, 1).await;
    assert_eq!(pushes.len(), 1);
}

#[tokio::test]
async fn test_rest_send_is_delivered_to_both_sockets() {
    let app = TestApp::spawn().await;
    let (client, photographer) = app.create_pair().await;
    let conversation_id = app.open_conversation(&client, &photographer).await;

    let mut sender_ws = app.connect_identified(&client).await;
    sender_ws.join(conversation_id).await;
    let mut receiver_ws = app.connect_identified(&photographer).await;

    let sent = app.send_message(&client, &photographer, conversation_id, "via rest").await;

    assert_eq!(receiver_ws.expect_event("new_message").await["id"], sent["id"]);
    assert_eq!(sender_ws.expect_event("new_message").await["id"], sent["id"]);
}

#[tokio::test]
async fn test_spoofed_sender_is_rejected() {
    let app = TestApp::spawn().await;
    let (client, photographer) = app.create_pair().await;
    let conversation_id = app.open_conversation(&client, &photographer).await;

    let mut ws = app.connect_ws(&client.token).await;
    let payload = json!({
        "conversationId": conversation_id,
        "senderId": client.id,
        "receiverId": photographer.id,
        "content": "before identify"
    });
    ws.emit("send_message", payload).await;
    ws.expect_event("message_error").await;

    ws.emit("user_connected", json!(client.id)).await;
    ws.expect_event("connection_confirmed").await;

    ws.emit(
        "send_message",
        json!({
            "conversationId": conversation_id,
            "senderId": photographer.id,
            "receiverId": client.id,
            "content": "pretending"
        }),
    )
    .await;
    let error = ws.expect_event("message_error").await;
    assert_eq!(error["error"], "Sender does not match the authenticated user");

    let (_, history) = app.get(&client.token, &format!("/chat/conversations/{conversation_id}/messages")).await;
    assert!(history["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_join_requires_participation() {
    let app = TestApp::spawn().await;
    let (client, photographer) = app.create_pair().await;
    let outsider = app.create_user("Olga Outsider", "client").await;
    let conversation_id = app.open_conversation(&client, &photographer).await;

    let mut ws = app.connect_identified(&outsider).await;
    ws.emit("join_conversation", json!(conversation_id)).await;
    let error = ws.expect_event("error").await;
    assert!(error["error"].is_string());

    // Not in the room, so traffic in the conversation never reaches this socket.
    app.send_message(&client, &photographer, conversation_id, "private").await;
    ws.expect_no_event("new_message", QUIET).await;
}

#[tokio::test]
async fn test_typing_is_relayed_to_joined_peers_only() {
    let app = TestApp::spawn().await;
    let (client, photographer) = app.create_pair().await;
    let conversation_id = app.open_conversation(&client, &photographer).await;

    let mut client_ws = app.connect_identified(&client).await;
    let mut photographer_ws = app.connect_identified(&photographer).await;

    // Typing before joining is dropped.
    client_ws.emit("typing_start", json!({"conversationId": conversation_id})).await;
    client_ws.sync().await;
    photographer_ws.join(conversation_id).await;
    photographer_ws.expect_no_event("user_typing", QUIET).await;

    client_ws.join(conversation_id).await;
    client_ws.emit("typing_start", json!({"conversationId": conversation_id})).await;
    let typing = photographer_ws.expect_event("user_typing").await;
    assert_eq!(typing["userId"], json!(client.id));
    assert_eq!(typing["userName"], "Alice Client");
    assert_eq!(typing["conversationId"], json!(conversation_id));

    client_ws.emit("typing_stop", json!({"conversationId": conversation_id, "userName": "Alice"})).await;
    let stopped = photographer_ws.expect_event("user_stop_typing").await;
    assert_eq!(stopped["userName"], "Alice");

    client_ws.expect_no_event("user_typing", QUIET).await;
}

#[tokio::test]
async fn test_mark_as_read_over_socket() {
    let app = TestApp::spawn().await;
    let (client, photographer) = app.create_pair().await;
    let conversation_id = app.open_conversation(&client, &photographer).await;
    app.send_message(&client, &photographer, conversation_id, "read me").await;

    let mut client_ws = app.connect_identified(&client).await;
    client_ws.join(conversation_id).await;
    let mut photographer_ws = app.connect_identified(&photographer).await;

    photographer_ws
        .emit("mark_as_read", json!({"conversationId": conversation_id, "userId": client.id}))
        .await;
    photographer_ws.expect_event("mark_as_read_error").await;

    photographer_ws
        .emit("mark_as_read", json!({"conversationId": conversation_id, "userId": photographer.id}))
        .await;
    let ok = photographer_ws.expect_event("mark_as_read_success").await;
    assert_eq!(ok["conversationId"], json!(conversation_id));

    let read = client_ws.expect_event("messages_read").await;
    assert_eq!(read["conversationId"], json!(conversation_id));
    assert_eq!(read["readBy"], json!(photographer.id));

    let (_, conversation) = app.get(&photographer.token, &format!("/chat/conversations/{conversation_id}")).await;
    assert_eq!(conversation["data"]["unreadCount"], 0);
}

#[tokio::test]
async fn test_delete_over_socket_notifies_room() {
    let app = TestApp::spawn().await;
    let (client, photographer) = app.create_pair().await;
    let conversation_id = app.open_conversation(&client, &photographer).await;
    let sent = app.send_message(&client, &photographer, conversation_id, "take it back").await;

    let mut client_ws = app.connect_identified(&client).await;
    let mut photographer_ws = app.connect_identified(&photographer).await;
    photographer_ws.join(conversation_id).await;

    photographer_ws.emit("delete_message", json!({"messageId": sent["id"], "userId": photographer.id})).await;
    photographer_ws.expect_event("delete_message_error").await;

    client_ws.emit("delete_message", json!({"messageId": sent["id"], "userId": client.id})).await;
    let ok = client_ws.expect_event("delete_message_success").await;
    assert_eq!(ok["messageId"], sent["id"]);

    let deleted = photographer_ws.expect_event("message_deleted").await;
    assert_eq!(deleted["messageId"], sent["id"]);
    assert_eq!(deleted["conversationId"], json!(conversation_id));
}

#[tokio::test]
async fn test_presence_follows_connections() {
    let app = TestApp::spawn().await;
    let (client, photographer) = app.create_pair().await;
    let conversation_id = app.open_conversation(&client, &photographer).await;

    let mut photographer_ws = app.connect_identified(&photographer).await;

    photographer_ws.emit("check_online_status", json!(client.id)).await;
    let status = photographer_ws.expect_event("online_status_response").await;
    assert_eq!(status["isOnline"], false);

    let client_ws = app.connect_identified(&client).await;
    let online = photographer_ws.expect_event("user_online").await;
    assert_eq!(online["userId"], json!(client.id));
    assert_eq!(online["conversationId"], json!(conversation_id));

    // A second tab does not announce again.
    let second_tab = app.connect_identified(&client).await;
    photographer_ws.expect_no_event("user_online", QUIET).await;

    photographer_ws.emit("check_online_status", json!({"userId": client.id})).await;
    let status = photographer_ws.expect_event("online_status_response").await;
    assert_eq!(status["isOnline"], true);

    client_ws.close().await;
    photographer_ws.expect_no_event("user_offline", QUIET).await;

    second_tab.close().await;
    let offline = photographer_ws.expect_event("user_offline").await;
    assert_eq!(offline["userId"], json!(client.id));
}
