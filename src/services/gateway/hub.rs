use crate::domain::realtime::{ConnectionId, Room};
use axum::extract::ws::{Message as WsMessage, Utf8Bytes};
use dashmap::DashMap;
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::collections::HashSet;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

#[derive(Clone, Debug)]
struct Metrics {
    delivered_total: Counter<u64>,
    outbound_dropped_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("snapbook-chat");
        Self {
            delivered_total: meter
                .u64_counter("websocket_frames_delivered_total")
                .with_description("Frames queued to local websocket connections")
                .build(),
            outbound_dropped_total: meter
                .u64_counter("websocket_outbound_dropped_total")
                .with_description("Total frames dropped due to full outbound buffer")
                .build(),
        }
    }
}

#[derive(Debug)]
struct Connection {
    outbound: mpsc::Sender<WsMessage>,
    rooms: HashSet<Room>,
}

/// Room membership of the connections attached to this instance.
///
/// The two maps are never locked at the same time, so membership changes and
/// deliveries cannot deadlock on each other.
#[derive(Debug)]
pub struct RoomHub {
    connections: DashMap<ConnectionId, Connection>,
    rooms: DashMap<Room, HashSet<ConnectionId>>,
    metrics: Metrics,
}

impl Default for RoomHub {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomHub {
    #[must_use]
    pub fn new() -> Self {
        Self { connections: DashMap::new(), rooms: DashMap::new(), metrics: Metrics::new() }
    }

    pub fn register(&self, connection_id: ConnectionId, outbound: mpsc::Sender<WsMessage>) {
        self.connections.insert(connection_id, Connection { outbound, rooms: HashSet::new() });
    }

    /// Detaches a connection and returns the rooms it was in.
    pub fn unregister(&self, connection_id: ConnectionId) -> Vec<Room> {
        let Some((_, connection)) = self.connections.remove(&connection_id) else {
            return Vec::new();
        };

        for room in &connection.rooms {
            self.remove_member(*room, connection_id);
        }
        connection.rooms.into_iter().collect()
    }

    pub fn join(&self, connection_id: ConnectionId, room: Room) {
        let joined = match self.connections.get_mut(&connection_id) {
            Some(mut connection) => connection.rooms.insert(room),
            None => return,
        };

        if joined {
            self.rooms.entry(room).or_default().insert(connection_id);
        }
    }

    pub fn leave(&self, connection_id: ConnectionId, room: Room) {
        let left = match self.connections.get_mut(&connection_id) {
            Some(mut connection) => connection.rooms.remove(&room),
            None => return,
        };

        if left {
            self.remove_member(room, connection_id);
        }
    }

    #[must_use]
    pub fn is_member(&self, connection_id: ConnectionId, room: Room) -> bool {
        self.connections.get(&connection_id).is_some_and(|connection| connection.rooms.contains(&room))
    }

    /// Queues `frame` once for every connection in any of `rooms`, skipping `exclude`.
    /// Returns how many connections accepted it.
    pub fn deliver(&self, rooms: &[Room], frame: &str, exclude: Option<ConnectionId>) -> usize {
        let mut targets: HashSet<ConnectionId> = HashSet::new();
        for room in rooms {
            if let Some(members) = self.rooms.get(room) {
                targets.extend(members.iter().copied());
            }
        }
        if let Some(excluded) = exclude {
            targets.remove(&excluded);
        }
        if targets.is_empty() {
            return 0;
        }

        let frame = Utf8Bytes::from(frame);
        let mut delivered = 0;

        for connection_id in targets {
            let Some(outbound) = self.connections.get(&connection_id).map(|c| c.outbound.clone()) else {
                continue;
            };

            match outbound.try_send(WsMessage::Text(frame.clone())) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(%connection_id, "Outbound buffer full, dropping frame");
                    self.metrics.outbound_dropped_total.add(1, &[KeyValue::new("reason", "full")]);
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(%connection_id, "Outbound channel closed, skipping frame");
                }
            }
        }

        self.metrics.delivered_total.add(delivered as u64, &[]);
        delivered
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn remove_member(&self, room: Room, connection_id: ConnectionId) {
        if let Some(mut members) = self.rooms.get_mut(&room) {
            members.remove(&connection_id);
        }
        self.rooms.remove_if(&room, |_, members| members.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn connect(hub: &RoomHub, capacity: usize) -> (ConnectionId, mpsc::Receiver<WsMessage>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(capacity);
        hub.register(id, tx);
        (id, rx)
    }

    fn text(msg: WsMessage) -> String {
        match msg {
            WsMessage::Text(t) => t.to_string(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[test]
    fn test_deliver_dedupes_across_rooms() {
        let hub = RoomHub::new();
        let (a, mut rx) = connect(&hub, 4);
        let user = Room::User(Uuid::new_v4());
        let conversation = Room::Conversation(Uuid::new_v4());
        hub.join(a, user);
        hub.join(a, conversation);

        assert_eq!(hub.deliver(&[user, conversation], "{}", None), 1);
        assert_eq!(text(rx.try_recv().unwrap()), "{}");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_deliver_skips_excluded_connection() {
        let hub = RoomHub::new();
        let (a, mut rx_a) = connect(&hub, 4);
        let (b, mut rx_b) = connect(&hub, 4);
        let room = Room::Conversation(Uuid::new_v4());
        hub.join(a, room);
        hub.join(b, room);

        assert_eq!(hub.deliver(&[room], "x", Some(a)), 1);
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
    }

    #[test]
    fn test_full_buffer_drops_without_blocking() {
        let hub = RoomHub::new();
        let (a, _rx) = connect(&hub, 1);
        let room = Room::User(Uuid::new_v4());
        hub.join(a, room);

        assert_eq!(hub.deliver(&[room], "1", None), 1);
        assert_eq!(hub.deliver(&[room], "2", None), 0);
    }

    #[test]
    fn test_leave_and_unregister() {
        let hub = RoomHub::new();
        let (a, _rx) = connect(&hub, 4);
        let user = Room::User(Uuid::new_v4());
        let conversation = Room::Conversation(Uuid::new_v4());
        hub.join(a, user);
        hub.join(a, conversation);

        hub.leave(a, conversation);
        assert!(!hub.is_member(a, conversation));
        assert_eq!(hub.deliver(&[conversation], "x", None), 0);

        assert_eq!(hub.unregister(a), vec![user]);
        assert_eq!(hub.connection_count(), 0);
        assert_eq!(hub.deliver(&[user], "x", None), 0);
    }

    #[test]
    fn test_join_unknown_connection_is_ignored() {
        let hub = RoomHub::new();
        let room = Room::User(Uuid::new_v4());
        hub.join(Uuid::new_v4(), room);
        assert_eq!(hub.deliver(&[room], "x", None), 0);
    }
}
