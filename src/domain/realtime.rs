use crate::domain::message::MessageView;
use crate::domain::notification::{Notification, NotificationView};
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Identifies one live gateway connection, unique across instances.
pub type ConnectionId = Uuid;

/// A fan-out target on the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Room {
    User(Uuid),
    Conversation(Uuid),
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user_{id}"),
            Self::Conversation(id) => write!(f, "conversation_{id}"),
        }
    }
}

/// Where an operation came from. Gateway-originated events skip the originating connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Rest,
    Connection(ConnectionId),
}

impl Origin {
    #[must_use]
    pub const fn connection(self) -> Option<ConnectionId> {
        match self {
            Self::Rest => None,
            Self::Connection(id) => Some(id),
        }
    }
}

/// Every event the gateway sends to clients, as `{"event": ..., "data": ...}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    ConnectionConfirmed {
        message: String,
        user_id: Uuid,
        #[serde(with = "time::serde::rfc3339")]
        timestamp: OffsetDateTime,
    },
    NewMessage(MessageView),
    MessageSentSuccess(MessageView),
    MessageError {
        error: String,
    },
    UserTyping {
        user_id: Uuid,
        user_name: String,
        conversation_id: Uuid,
    },
    UserStopTyping {
        user_id: Uuid,
        user_name: String,
        conversation_id: Uuid,
    },
    MessagesRead {
        conversation_id: Uuid,
        read_by: Uuid,
    },
    MarkAsReadSuccess {
        conversation_id: Uuid,
    },
    MarkAsReadError {
        error: String,
    },
    MessageDeleted {
        message_id: Uuid,
        conversation_id: Uuid,
    },
    DeleteMessageSuccess {
        message_id: Uuid,
    },
    DeleteMessageError {
        error: String,
    },
    UserOnline {
        user_id: Uuid,
        conversation_id: Uuid,
    },
    UserOffline {
        user_id: Uuid,
        conversation_id: Uuid,
    },
    OnlineStatusResponse {
        user_id: Uuid,
        is_online: bool,
    },
    IdentifyError {
        error: String,
    },
    NewNotification(NotificationView),
    NotificationUpdated(Notification),
    NotificationDeleted {
        id: Uuid,
    },
    NotificationsMarkedAllRead,
    NotificationCountUpdate {
        increment: bool,
        count: u64,
    },
    Error {
        error: String,
    },
}

impl ServerEvent {
    #[must_use]
    pub fn connection_confirmed(user_id: Uuid) -> Self {
        Self::ConnectionConfirmed {
            message: "You are now connected to real-time updates".to_string(),
            user_id,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    /// Absolute unread notification count for the recipient.
    #[must_use]
    pub const fn notification_count(count: u64) -> Self {
        Self::NotificationCountUpdate { increment: false, count }
    }

    /// Wire name of the event, used as a metric and log label.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ConnectionConfirmed { .. } => "connection_confirmed",
            Self::NewMessage(_) => "new_message",
            Self::MessageSentSuccess(_) => "message_sent_success",
            Self::MessageError { .. } => "message_error",
            Self::UserTyping { .. } => "user_typing",
            Self::UserStopTyping { .. } => "user_stop_typing",
            Self::MessagesRead { .. } => "messages_read",
            Self::MarkAsReadSuccess { .. } => "mark_as_read_success",
            Self::MarkAsReadError { .. } => "mark_as_read_error",
            Self::MessageDeleted { .. } => "message_deleted",
            Self::DeleteMessageSuccess { .. } => "delete_message_success",
            Self::DeleteMessageError { .. } => "delete_message_error",
            Self::UserOnline { .. } => "user_online",
            Self::UserOffline { .. } => "user_offline",
            Self::OnlineStatusResponse { .. } => "online_status_response",
            Self::IdentifyError { .. } => "identify_error",
            Self::NewNotification(_) => "new_notification",
            Self::NotificationUpdated(_) => "notification_updated",
            Self::NotificationDeleted { .. } => "notification_deleted",
            Self::NotificationsMarkedAllRead => "notifications_marked_all_read",
            Self::NotificationCountUpdate { .. } => "notification_count_update",
            Self::Error { .. } => "error",
        }
    }
}
