use crate::config::WsConfig;
use crate::domain::realtime::{ConnectionId, Origin, Room, ServerEvent};
use crate::services::chat_service::ChatService;
use crate::services::gateway::Metrics;
use crate::services::gateway::hub::RoomHub;
use crate::services::gateway::presence::PresenceRegistry;
use crate::services::gateway::protocol::{ClientEvent, DeleteMessagePayload, MarkAsReadPayload, SendMessagePayload, TypingPayload};
use crate::services::gateway::sink::EventEmitter;
use crate::services::store::UserDirectory;
use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket, close_code};
use futures::{Sink, SinkExt, StreamExt};
use opentelemetry::KeyValue;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::Instrument;
use uuid::Uuid;

pub(crate) struct Session {
    pub(crate) user_id: Uuid,
    pub(crate) connection_id: ConnectionId,
    pub(crate) request_id: String,
    pub(crate) socket: WebSocket,
    pub(crate) chat: ChatService,
    pub(crate) users: Arc<dyn UserDirectory>,
    pub(crate) hub: Arc<RoomHub>,
    pub(crate) emitter: EventEmitter,
    pub(crate) presence: Arc<dyn PresenceRegistry>,
    pub(crate) metrics: Metrics,
    pub(crate) config: WsConfig,
    pub(crate) shutdown_rx: tokio::sync::watch::Receiver<bool>,
}

impl Session {
    #[tracing::instrument(
        name = "websocket_session",
        skip(self),
        fields(
            user_id = %self.user_id,
            request_id = %self.request_id,
            otel.kind = "server",
            ws.session_id = %self.connection_id
        )
    )]
    pub(crate) async fn run(self) {
        let Self { user_id, connection_id, socket, chat, users, hub, emitter, presence, metrics, config, mut shutdown_rx, .. } =
            self;

        metrics.active_connections.add(1, &[]);
        tracing::info!("WebSocket connected");

        let (mut ws_sink, mut ws_stream) = socket.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel(config.ws_outbound_buffer_size.max(1));
        hub.register(connection_id, outbound_tx);

        let mut refresh = tokio::time::interval(Duration::from_secs(config.ws_presence_refresh_secs.max(1)));
        refresh.tick().await;

        let mut handler = Handler { user_id, connection_id, display_name: None, chat, users, hub, emitter, presence };

        loop {
            if *shutdown_rx.borrow() {
                tracing::info!("Shutdown signal received, closing WebSocket");
                let _ = ws_sink
                    .send(WsMessage::Close(Some(CloseFrame {
                        code: close_code::AWAY,
                        reason: "Server shutting down".into(),
                    })))
                    .await;
                break;
            }

            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {}

                msg = ws_stream.next() => {
                    let reply = match msg {
                        Some(Ok(WsMessage::Text(text))) => match ClientEvent::parse(text.as_str()) {
                            Ok(event) => {
                                metrics.inbound_events_total.add(1, &[KeyValue::new("event", event.name())]);
                                handler.handle(event).await
                            }
                            Err(rejected) => {
                                tracing::debug!(reply = rejected.reply.name(), "Rejected inbound frame");
                                metrics.rejected_frames_total.add(1, &[]);
                                Some(rejected.reply)
                            }
                        },
                        Some(Ok(WsMessage::Binary(_))) => {
                            tracing::warn!("Received unexpected binary message");
                            Some(ServerEvent::Error { error: "Binary frames are not supported".to_string() })
                        }
                        Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => {
                            tracing::debug!("Received heartbeat from client");
                            None
                        }
                        Some(Ok(WsMessage::Close(_)) | Err(_)) | None => break,
                    };

                    if let Some(reply) = reply
                        && !send_event(&mut ws_sink, &reply).await
                    {
                        break;
                    }
                }

                msg = outbound_rx.recv() => {
                    match msg {
                        Some(msg) => {
                            if ws_sink.send(msg).await.is_err() { break; }
                        }
                        None => break,
                    }
                }

                _ = refresh.tick() => {
                    if handler.display_name.is_some()
                        && let Err(e) = handler.presence.refresh(user_id).await
                    {
                        tracing::warn!(error = %e, "Failed to refresh presence");
                    }
                }
            }
        }

        let _ = ws_sink.close().await;
        handler.disconnect().await;

        metrics.active_connections.add(-1, &[]);
        tracing::info!("WebSocket disconnected");
    }
}

async fn send_event<S>(sink: &mut S, event: &ServerEvent) -> bool
where
    S: Sink<WsMessage> + Unpin,
{
    match serde_json::to_string(event) {
        Ok(frame) => sink.send(WsMessage::Text(frame.into())).await.is_ok(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize reply");
            true
        }
    }
}

/// Per-connection state and the handling of each inbound event.
struct Handler {
    user_id: Uuid,
    connection_id: ConnectionId,
    /// Set once the client has identified.
    display_name: Option<String>,
    chat: ChatService,
    users: Arc<dyn UserDirectory>,
    hub: Arc<RoomHub>,
    emitter: EventEmitter,
    presence: Arc<dyn PresenceRegistry>,
}

impl Handler {
    const fn origin(&self) -> Origin {
        Origin::Connection(self.connection_id)
    }

    async fn handle(&mut self, event: ClientEvent) -> Option<ServerEvent> {
        match event {
            ClientEvent::Identify(claimed) => Some(self.identify(claimed).await),
            ClientEvent::JoinConversation(conversation_id) => self.join(conversation_id).await,
            ClientEvent::LeaveConversation(conversation_id) => {
                self.hub.leave(self.connection_id, Room::Conversation(conversation_id));
                None
            }
            ClientEvent::SendMessage(payload) => Some(self.send(payload).await),
            ClientEvent::TypingStart(payload) => {
                self.typing(payload, true).await;
                None
            }
            ClientEvent::TypingStop(payload) => {
                self.typing(payload, false).await;
                None
            }
            ClientEvent::MarkAsRead(payload) => Some(self.mark_read(payload).await),
            ClientEvent::DeleteMessage(payload) => Some(self.delete(payload).await),
            ClientEvent::CheckOnlineStatus(target) => Some(self.online_status(target).await),
        }
    }

    async fn identify(&mut self, claimed: Uuid) -> ServerEvent {
        if claimed != self.user_id {
            return ServerEvent::IdentifyError { error: "User id does not match the authenticated user".to_string() };
        }

        if self.display_name.is_none() {
            let name = match self.users.find_user(self.user_id).await {
                Ok(profile) => profile.map(|p| p.name).unwrap_or_default(),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to load profile for identified user");
                    String::new()
                }
            };

            self.hub.join(self.connection_id, Room::User(self.user_id));
            match self.presence.connect(self.user_id).await {
                Ok(true) => self.announce(true),
                Ok(false) => {}
                Err(e) => tracing::warn!(error = %e, "Failed to record presence"),
            }
            self.display_name = Some(name);
        }

        ServerEvent::connection_confirmed(self.user_id)
    }

    async fn join(&self, conversation_id: Uuid) -> Option<ServerEvent> {
        match self.chat.participant_conversation(conversation_id, self.user_id).await {
            Ok(_) => {
                self.hub.join(self.connection_id, Room::Conversation(conversation_id));
                None
            }
            Err(e) => Some(ServerEvent::Error { error: e.client_message() }),
        }
    }

    async fn send(&self, payload: SendMessagePayload) -> ServerEvent {
        if self.display_name.is_none() {
            return ServerEvent::MessageError { error: "Identify before sending messages".to_string() };
        }
        if payload.sender_id != self.user_id {
            return ServerEvent::MessageError { error: "Sender does not match the authenticated user".to_string() };
        }

        match self.chat.send_message(payload.into_outgoing(), self.origin()).await {
            Ok(view) => ServerEvent::MessageSentSuccess(view),
            Err(e) => ServerEvent::MessageError { error: e.client_message() },
        }
    }

    async fn typing(&self, payload: TypingPayload, started: bool) {
        let room = Room::Conversation(payload.conversation_id);
        if self.display_name.is_none() || !self.hub.is_member(self.connection_id, room) {
            tracing::debug!(conversation_id = %payload.conversation_id, "Ignoring typing outside a joined conversation");
            return;
        }

        let user_name = payload.user_name.or_else(|| self.display_name.clone()).unwrap_or_default();
        let event = if started {
            ServerEvent::UserTyping { user_id: self.user_id, user_name, conversation_id: payload.conversation_id }
        } else {
            ServerEvent::UserStopTyping { user_id: self.user_id, user_name, conversation_id: payload.conversation_id }
        };
        self.emitter.emit(&[room], &event, self.origin()).await;
    }

    async fn mark_read(&self, payload: MarkAsReadPayload) -> ServerEvent {
        if self.display_name.is_none() || payload.user_id != self.user_id {
            return ServerEvent::MarkAsReadError { error: "Not authorized to mark this conversation".to_string() };
        }

        match self.chat.mark_conversation_read(payload.conversation_id, self.user_id, self.origin()).await {
            Ok(_) => ServerEvent::MarkAsReadSuccess { conversation_id: payload.conversation_id },
            Err(e) => ServerEvent::MarkAsReadError { error: e.client_message() },
        }
    }

    async fn delete(&self, payload: DeleteMessagePayload) -> ServerEvent {
        if self.display_name.is_none() || payload.user_id != self.user_id {
            return ServerEvent::DeleteMessageError { error: "Not authorized to delete this message".to_string() };
        }

        match self.chat.delete_message(payload.message_id, self.user_id, self.origin()).await {
            Ok(message) => ServerEvent::DeleteMessageSuccess { message_id: message.id },
            Err(e) => ServerEvent::DeleteMessageError { error: e.client_message() },
        }
    }

    async fn online_status(&self, target: Uuid) -> ServerEvent {
        let is_online = match self.presence.is_online(target).await {
            Ok(online) => online,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read presence");
                false
            }
        };
        ServerEvent::OnlineStatusResponse { user_id: target, is_online }
    }

    async fn disconnect(&self) {
        self.hub.unregister(self.connection_id);
        if self.display_name.is_none() {
            return;
        }

        match self.presence.disconnect(self.user_id).await {
            Ok(true) => self.announce(false),
            Ok(false) => {}
            Err(e) => tracing::warn!(error = %e, "Failed to release presence"),
        }
    }

    /// Tells every conversation partner that the user came online or went offline.
    fn announce(&self, online: bool) {
        let chat = self.chat.clone();
        let emitter = self.emitter.clone();
        let user_id = self.user_id;

        tokio::spawn(
            async move {
                let partners = match chat.conversation_partners(user_id).await {
                    Ok(partners) => partners,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to load conversation partners");
                        return;
                    }
                };

                for (conversation_id, partner) in partners {
                    let event = if online {
                        ServerEvent::UserOnline { user_id, conversation_id }
                    } else {
                        ServerEvent::UserOffline { user_id, conversation_id }
                    };
                    emitter.emit_to_user(partner, &event).await;
                }
            }
            .instrument(tracing::info_span!("presence_announce", user.id = %user_id, online)),
        );
    }
}
