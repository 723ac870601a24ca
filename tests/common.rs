#![allow(dead_code)]

use async_trait::async_trait;
use clap::Parser;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use snapbook_chat::adapters::database::DbPool;
use snapbook_chat::adapters::memory::MemoryStore;
use snapbook_chat::adapters::redis::RedisClient;
use snapbook_chat::config::Config;
use snapbook_chat::domain::auth::Claims;
use snapbook_chat::domain::push::PushNotification;
use snapbook_chat::services::push::{PushError, PushProvider};
use snapbook_chat::{AppBuilder, api};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use uuid::Uuid;

static INIT: Once = Once::new();

pub const TEST_SECRET: &str = "test_secret";

pub fn setup_tracing() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "warn".into())
            .add_directive("snapbook_chat=debug".parse().unwrap())
            .add_directive("tower=warn".parse().unwrap())
            .add_directive("hyper=warn".parse().unwrap())
            .add_directive("reqwest=warn".parse().unwrap())
            .add_directive("tungstenite=warn".parse().unwrap());

        tracing_subscriber::fmt().with_env_filter(filter).init();
    });
}

pub fn get_test_config() -> Config {
    let mut config = Config::try_parse_from(["snapbook-chat", "--jwt-secret", TEST_SECRET]).unwrap();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config.server.mgmt_port = 0;
    config.database.database_url = None;
    config.pubsub.redis_url = None;
    config.rate_limit.rate_limit_per_second = 10000;
    config.rate_limit.rate_limit_burst = 10000;
    config.push.onesignal_app_id = None;
    config.push.onesignal_api_key = None;
    config
}

pub fn token_for(user_id: Uuid) -> String {
    Claims::new(user_id, 3600).encode(TEST_SECRET).unwrap()
}

/// Push provider that keeps every delivery for later inspection.
#[derive(Debug, Default)]
pub struct RecordingPush {
    sent: Mutex<Vec<(String, PushNotification)>>,
}

impl RecordingPush {
    pub fn sent_to(&self, user_id: Uuid) -> Vec<PushNotification> {
        let target = user_id.to_string();
        self.sent.lock().unwrap().iter().filter(|(to, _)| *to == target).map(|(_, n)| n.clone()).collect()
    }

    pub async fn wait_for(&self, user_id: Uuid, count: usize) -> Vec<PushNotification> {
        let start = std::time::Instant::now();
        loop {
            let sent = self.sent_to(user_id);
            if sent.len() >= count || start.elapsed() > Duration::from_secs(5) {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

#[async_trait]
impl PushProvider for RecordingPush {
    async fn send(&self, external_user_id: &str, notification: &PushNotification) -> Result<(), PushError> {
        self.sent.lock().unwrap().push((external_user_id.to_string(), notification.clone()));
        Ok(())
    }
}

/// Storage and fan-out an instance runs on. Instances given clones of the same backends
/// behave like replicas of one deployment.
#[derive(Clone, Default)]
pub struct Backends {
    pub store: MemoryStore,
    pub pool: Option<DbPool>,
    pub pubsub: Option<Arc<RedisClient>>,
}

pub struct TestUser {
    pub id: Uuid,
    pub name: String,
    pub token: String,
}

pub struct TestApp {
    pub server_url: String,
    pub ws_url: String,
    pub mgmt_url: String,
    pub client: reqwest::Client,
    pub store: MemoryStore,
    pub pushes: Arc<RecordingPush>,
    pub config: Config,
    shutdown_tx: watch::Sender<bool>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_config(get_test_config()).await
    }

    pub async fn spawn_with_config(config: Config) -> Self {
        Self::spawn_with_backends(config, Backends::default()).await
    }

    pub async fn spawn_with_backends(config: Config, backends: Backends) -> Self {
        setup_tracing();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mgmt_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mgmt_addr = mgmt_listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let Backends { store, pool, pubsub } = backends;
        let pushes = Arc::new(RecordingPush::default());

        let mut builder = AppBuilder::new(config.clone())
            .with_memory_store(store.clone())
            .with_push_provider(Arc::clone(&pushes) as Arc<dyn PushProvider>)
            .with_shutdown_rx(shutdown_rx.clone());
        if let Some(pool) = pool {
            builder = builder.with_database(pool);
        }
        if let Some(pubsub) = pubsub {
            builder = builder.with_pubsub(pubsub);
        }
        let app = builder.build().await.unwrap();

        let router = api::app_router(config.clone(), app.services, shutdown_rx.clone()).unwrap();
        let mgmt = api::mgmt_router(app.mgmt_state);

        let mut rx = shutdown_rx.clone();
        tokio::spawn(async move {
            axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
                .with_graceful_shutdown(async move {
                    let _ = rx.wait_for(|&stop| stop).await;
                })
                .await
                .unwrap();
        });

        let mut rx = shutdown_rx.clone();
        tokio::spawn(async move {
            axum::serve(mgmt_listener, mgmt)
                .with_graceful_shutdown(async move {
                    let _ = rx.wait_for(|&stop| stop).await;
                })
                .await
                .unwrap();
        });

        let _ = app.workers.spawn_all(shutdown_rx);

        Self {
            server_url: format!("http://{addr}"),
            ws_url: format!("ws://{addr}/v1/gateway"),
            mgmt_url: format!("http://{mgmt_addr}"),
            client: reqwest::Client::new(),
            store,
            pushes,
            config,
            shutdown_tx,
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn create_user(&self, name: &str, role: &str) -> TestUser {
        let id = Uuid::new_v4();
        let resp = self
            .client
            .put(format!("{}/internal/users/{id}", self.mgmt_url))
            .json(&json!({ "name": name, "role": role }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 204);

        TestUser { id, name: name.to_string(), token: token_for(id) }
    }

    /// Returns a client and a photographer.
    pub async fn create_pair(&self) -> (TestUser, TestUser) {
        let client = self.create_user("Alice Client", "client").await;
        let photographer = self.create_user("Paul Photographer", "photographer").await;
        (client, photographer)
    }

    pub async fn get(&self, token: &str, path: &str) -> (u16, Value) {
        let resp = self.client.get(format!("{}/v1{path}", self.server_url)).bearer_auth(token).send().await.unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    pub async fn send_json(&self, method: reqwest::Method, token: &str, path: &str, body: Value) -> (u16, Value) {
        let resp = self
            .client
            .request(method, format!("{}/v1{path}", self.server_url))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    pub async fn request(&self, method: reqwest::Method, token: &str, path: &str) -> (u16, Value) {
        let resp =
            self.client.request(method, format!("{}/v1{path}", self.server_url)).bearer_auth(token).send().await.unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    pub async fn open_conversation(&self, user: &TestUser, other: &TestUser) -> Uuid {
        let (status, body) = self
            .send_json(reqwest::Method::POST, &user.token, "/chat/conversations", json!({ "participantId": other.id }))
            .await;
        assert_eq!(status, 200, "{body}");
        body["data"]["id"].as_str().unwrap().parse().unwrap()
    }

    pub async fn send_message(&self, sender: &TestUser, receiver: &TestUser, conversation_id: Uuid, text: &str) -> Value {
        let (status, body) = self
            .send_json(
                reqwest::Method::POST,
                &sender.token,
                "/chat/messages",
                json!({ "conversationId": conversation_id, "receiverId": receiver.id, "content": text }),
            )
            .await;
        assert_eq!(status, 201, "{body}");
        body["data"].clone()
    }

    pub async fn connect_ws(&self, token: &str) -> TestClient {
        let (stream, _) = connect_async(format!("{}?token={token}", self.ws_url)).await.unwrap();
        TestClient { stream }
    }

    /// Connects and identifies, consuming the confirmation.
    pub async fn connect_identified(&self, user: &TestUser) -> TestClient {
        let mut client = self.connect_ws(&user.token).await;
        client.emit("user_connected", json!(user.id)).await;
        let confirmed = client.expect_event("connection_confirmed").await;
        assert_eq!(confirmed["userId"], json!(user.id));
        client
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

pub struct TestClient {
    pub stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestClient {
    pub async fn emit(&mut self, event: &str, data: Value) {
        let frame = json!({ "event": event, "data": data }).to_string();
        self.stream.send(Message::Text(frame.into())).await.unwrap();
    }

    pub async fn send_raw(&mut self, text: &str) {
        self.stream.send(Message::Text(text.to_string().into())).await.unwrap();
    }

    /// Next event frame as `(name, data)`, or `None` on timeout or close.
    pub async fn receive_timeout(&mut self, timeout: Duration) -> Option<(String, Value)> {
        let start = std::time::Instant::now();
        loop {
            let remaining = timeout.checked_sub(start.elapsed())?;
            match tokio::time::timeout(remaining, self.stream.next()).await {
                Ok(Some(Ok(Message::Text(text)))) => {
                    let frame: Value = serde_json::from_str(text.as_str()).unwrap();
                    let name = frame["event"].as_str().unwrap().to_string();
                    return Some((name, frame["data"].clone()));
                }
                Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => {}
                Ok(Some(Ok(_)) | Some(Err(_)) | None) | Err(_) => return None,
            }
        }
    }

    /// Skips frames until `name` arrives and returns its data.
    pub async fn expect_event(&mut self, name: &str) -> Value {
        let start = std::time::Instant::now();
        while start.elapsed() < Duration::from_secs(5) {
            if let Some((event, data)) = self.receive_timeout(Duration::from_millis(500)).await
                && event == name
            {
                return data;
            }
        }
        panic!("Timed out waiting for {name}");
    }

    /// Asserts that `name` does not arrive within `window`.
    pub async fn expect_no_event(&mut self, name: &str, window: Duration) {
        let start = std::time::Instant::now();
        while let Some(remaining) = window.checked_sub(start.elapsed()) {
            match self.receive_timeout(remaining).await {
                Some((event, data)) => assert_ne!(event, name, "unexpected {name}: {data}"),
                None => return,
            }
        }
    }

    /// Round-trips an online status query so every earlier frame on this socket has been handled.
    pub async fn sync(&mut self) {
        let marker = Uuid::new_v4();
        self.emit("check_online_status", json!(marker)).await;
        loop {
            let data = self.expect_event("online_status_response").await;
            if data["userId"] == json!(marker) {
                return;
            }
        }
    }

    pub async fn join(&mut self, conversation_id: Uuid) {
        self.emit("join_conversation", json!({ "conversationId": conversation_id })).await;
        self.sync().await;
    }

    pub async fn close(mut self) {
        let _ = self.stream.close(None).await;
    }
}
