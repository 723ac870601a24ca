use crate::domain::notification::{Notification, NotificationKind};
use sqlx::types::Json;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct NotificationRecord {
    pub(crate) id: Uuid,
    pub(crate) recipient_id: Uuid,
    pub(crate) sender_id: Option<Uuid>,
    pub(crate) kind: String,
    pub(crate) title: String,
    pub(crate) message: String,
    pub(crate) data: Json<serde_json::Value>,
    pub(crate) is_read: bool,
    pub(crate) read_at: Option<OffsetDateTime>,
    pub(crate) created_at: OffsetDateTime,
}

impl From<NotificationRecord> for Notification {
    fn from(record: NotificationRecord) -> Self {
        Self {
            id: record.id,
            recipient_id: record.recipient_id,
            sender_id: record.sender_id,
            kind: record.kind.parse().unwrap_or(NotificationKind::System),
            title: record.title,
            message: record.message,
            data: record.data.0,
            read: record.is_read,
            read_at: record.read_at,
            created_at: record.created_at,
        }
    }
}
