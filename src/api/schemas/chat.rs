use crate::domain::message::{Attachment, MessageType, ReplySnapshot};
use crate::services::chat_service::OutgoingMessage;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationRequest {
    pub participant_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    #[serde(default)]
    pub query: String,
    pub conversation_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub conversation_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    #[serde(default, rename = "type")]
    pub kind: Option<MessageType>,
    #[serde(default)]
    pub attachment: Option<Attachment>,
    #[serde(default)]
    pub booking_reference: Option<Uuid>,
    #[serde(default)]
    pub reply_to_message_id: Option<Uuid>,
    #[serde(default)]
    pub reply_to_message_text: Option<String>,
    #[serde(default)]
    pub reply_to_sender_name: Option<String>,
}

impl SendMessageRequest {
    #[must_use]
    pub fn into_outgoing(self, sender_id: Uuid) -> OutgoingMessage {
        let reply_to = self.reply_to_message_id.map(|message_id| ReplySnapshot {
            message_id,
            text: self.reply_to_message_text,
            sender_name: self.reply_to_sender_name,
        });

        OutgoingMessage {
            conversation_id: self.conversation_id,
            sender_id,
            receiver_id: self.receiver_id,
            content: self.content,
            kind: self.kind.unwrap_or_default(),
            attachment: self.attachment,
            booking_reference: self.booking_reference,
            reply_to,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadResponse {
    pub conversation_id: Uuid,
    pub marked_read: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedMessageResponse {
    pub message_id: Uuid,
    pub conversation_id: Uuid,
}
