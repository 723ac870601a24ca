use crate::domain::realtime::{ConnectionId, Origin, Room, ServerEvent};
use crate::services::gateway::hub::RoomHub;
use async_trait::async_trait;
use opentelemetry::{KeyValue, global, metrics::Counter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// A serialized event addressed to one or more rooms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub rooms: Vec<Room>,
    pub exclude: Option<ConnectionId>,
    pub frame: String,
}

/// Fan-out seam between services and whatever delivers frames to connections.
#[async_trait]
pub trait EventSink: Send + Sync + std::fmt::Debug {
    /// Best-effort publish. Failures are logged by the implementation.
    async fn publish(&self, envelope: Envelope);
}

/// Delivers straight into this instance's hub.
#[derive(Debug, Clone)]
pub struct LocalEventSink {
    hub: Arc<RoomHub>,
}

impl LocalEventSink {
    #[must_use]
    pub const fn new(hub: Arc<RoomHub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl EventSink for LocalEventSink {
    async fn publish(&self, envelope: Envelope) {
        self.hub.deliver(&envelope.rooms, &envelope.frame, envelope.exclude);
    }
}

#[derive(Clone, Debug)]
struct Metrics {
    emitted_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("snapbook-chat");
        Self {
            emitted_total: meter
                .u64_counter("realtime_events_emitted_total")
                .with_description("Realtime events handed to the event sink")
                .build(),
        }
    }
}

/// Serializes server events and hands them to the configured sink.
#[derive(Clone, Debug)]
pub struct EventEmitter {
    sink: Arc<dyn EventSink>,
    metrics: Metrics,
}

impl EventEmitter {
    #[must_use]
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink, metrics: Metrics::new() }
    }

    #[tracing::instrument(level = "debug", skip(self, event), fields(event = event.name()))]
    pub async fn emit(&self, rooms: &[Room], event: &ServerEvent, origin: Origin) {
        let frame = match serde_json::to_string(event) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize realtime event");
                return;
            }
        };

        self.metrics.emitted_total.add(1, &[KeyValue::new("event", event.name())]);
        self.sink.publish(Envelope { rooms: rooms.to_vec(), exclude: origin.connection(), frame }).await;
    }

    pub async fn emit_to_user(&self, user_id: Uuid, event: &ServerEvent) {
        self.emit(&[Room::User(user_id)], event, Origin::Rest).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::ws::Message as WsMessage;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_emitter_skips_origin_connection() {
        let hub = Arc::new(RoomHub::new());
        let emitter = EventEmitter::new(Arc::new(LocalEventSink::new(Arc::clone(&hub))));

        let (origin_tx, mut origin_rx) = mpsc::channel(4);
        let (peer_tx, mut peer_rx) = mpsc::channel(4);
        let origin = Uuid::new_v4();
        let peer = Uuid::new_v4();
        hub.register(origin, origin_tx);
        hub.register(peer, peer_tx);

        let room = Room::Conversation(Uuid::new_v4());
        hub.join(origin, room);
        hub.join(peer, room);

        let event = ServerEvent::MessageDeleted { message_id: Uuid::new_v4(), conversation_id: Uuid::new_v4() };
        emitter.emit(&[room], &event, Origin::Connection(origin)).await;

        assert!(origin_rx.try_recv().is_err());
        let Ok(WsMessage::Text(frame)) = peer_rx.try_recv() else {
            panic!("peer should receive the frame");
        };
        let json: serde_json::Value = serde_json::from_str(frame.as_str()).unwrap();
        assert_eq!(json["event"], "message_deleted");
    }
}
