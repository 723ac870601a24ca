use crate::domain::message::{Attachment, Message, ReplySnapshot};
use sqlx::types::Json;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct MessageRecord {
    pub(crate) id: Uuid,
    pub(crate) conversation_id: Uuid,
    pub(crate) sender_id: Uuid,
    pub(crate) receiver_id: Uuid,
    pub(crate) content: String,
    pub(crate) message_type: String,
    pub(crate) attachment: Option<Json<Attachment>>,
    pub(crate) booking_reference: Option<Uuid>,
    pub(crate) reply_to_message_id: Option<Uuid>,
    pub(crate) reply_to_text: Option<String>,
    pub(crate) reply_to_sender_name: Option<String>,
    pub(crate) is_read: bool,
    pub(crate) read_at: Option<OffsetDateTime>,
    pub(crate) is_deleted: bool,
    pub(crate) deleted_at: Option<OffsetDateTime>,
    pub(crate) created_at: OffsetDateTime,
}

impl From<MessageRecord> for Message {
    fn from(record: MessageRecord) -> Self {
        let reply_to = record.reply_to_message_id.map(|message_id| ReplySnapshot {
            message_id,
            text: record.reply_to_text,
            sender_name: record.reply_to_sender_name,
        });

        Self {
            id: record.id,
            conversation_id: record.conversation_id,
            sender_id: record.sender_id,
            receiver_id: record.receiver_id,
            content: record.content,
            kind: record.message_type.parse().unwrap_or_default(),
            attachment: record.attachment.map(|Json(attachment)| attachment),
            booking_reference: record.booking_reference,
            reply_to,
            is_read: record.is_read,
            read_at: record.read_at,
            is_deleted: record.is_deleted,
            deleted_at: record.deleted_at,
            created_at: record.created_at,
        }
    }
}
