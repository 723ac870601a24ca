pub mod hub;
pub mod presence;
pub mod protocol;
pub(crate) mod session;
pub mod sink;

use crate::config::WsConfig;
use crate::services::chat_service::ChatService;
use crate::services::gateway::hub::RoomHub;
use crate::services::gateway::presence::PresenceRegistry;
use crate::services::gateway::session::Session;
use crate::services::gateway::sink::EventEmitter;
use crate::services::store::UserDirectory;
use axum::extract::ws::WebSocket;
use opentelemetry::{
    global,
    metrics::{Counter, UpDownCounter},
};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub(crate) struct Metrics {
    pub(crate) active_connections: UpDownCounter<i64>,
    pub(crate) inbound_events_total: Counter<u64>,
    pub(crate) rejected_frames_total: Counter<u64>,
}

impl Metrics {
    #[must_use]
    pub(crate) fn new() -> Self {
        let meter = global::meter("snapbook-chat");
        Self {
            active_connections: meter
                .i64_up_down_counter("websocket_active_connections")
                .with_description("Number of active WebSocket connections")
                .build(),
            inbound_events_total: meter
                .u64_counter("websocket_inbound_events_total")
                .with_description("Client events handled by gateway sessions")
                .build(),
            rejected_frames_total: meter
                .u64_counter("websocket_rejected_frames_total")
                .with_description("Inbound frames that could not be parsed")
                .build(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug)]
pub struct GatewayService {
    chat: ChatService,
    users: Arc<dyn UserDirectory>,
    hub: Arc<RoomHub>,
    emitter: EventEmitter,
    presence: Arc<dyn PresenceRegistry>,
    config: WsConfig,
    metrics: Metrics,
}

impl GatewayService {
    #[must_use]
    pub fn new(
        chat: ChatService,
        users: Arc<dyn UserDirectory>,
        hub: Arc<RoomHub>,
        emitter: EventEmitter,
        presence: Arc<dyn PresenceRegistry>,
        config: WsConfig,
    ) -> Self {
        Self { chat, users, hub, emitter, presence, config, metrics: Metrics::new() }
    }

    /// Runs an authenticated connection until the client leaves or the server shuts down.
    pub async fn handle_socket(
        &self,
        socket: WebSocket,
        user_id: Uuid,
        request_id: String,
        shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) {
        let session = Session {
            user_id,
            connection_id: Uuid::new_v4(),
            request_id,
            socket,
            chat: self.chat.clone(),
            users: Arc::clone(&self.users),
            hub: Arc::clone(&self.hub),
            emitter: self.emitter.clone(),
            presence: Arc::clone(&self.presence),
            metrics: self.metrics.clone(),
            config: self.config.clone(),
            shutdown_rx,
        };

        session.run().await;
    }

    /// Connections currently attached to this instance.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.hub.connection_count()
    }
}
