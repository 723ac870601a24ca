use crate::domain::user::UserProfile;
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

pub const MAX_CONTENT_CHARS: usize = 2000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    File,
    Booking,
}

impl MessageType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::File => "file",
            Self::Booking => "booking",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "file" => Ok(Self::File),
            "booking" => Ok(Self::Booking),
            other => Err(format!("unknown message type: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Copy of the replied-to message taken at send time. Not kept in sync with the original.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplySnapshot {
    #[serde(rename = "replyToMessageId")]
    pub message_id: Uuid,
    #[serde(rename = "replyToMessageText", default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(rename = "replyToSenderName", default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking_reference: Option<Uuid>,
    #[serde(flatten)]
    pub reply_to: Option<ReplySnapshot>,
    pub is_read: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub read_at: Option<OffsetDateTime>,
    pub is_deleted: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub deleted_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Message {
    #[must_use]
    pub fn is_unread_for(&self, user_id: Uuid) -> bool {
        self.receiver_id == user_id && !self.is_read && !self.is_deleted
    }
}

/// A validated message about to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    pub kind: MessageType,
    pub attachment: Option<Attachment>,
    pub booking_reference: Option<Uuid>,
    pub reply_to: Option<ReplySnapshot>,
}

impl NewMessage {
    /// Materializes the row the store will insert.
    #[must_use]
    pub fn into_message(self, id: Uuid, created_at: OffsetDateTime) -> Message {
        Message {
            id,
            conversation_id: self.conversation_id,
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            content: self.content,
            kind: self.kind,
            attachment: self.attachment,
            booking_reference: self.booking_reference,
            reply_to: self.reply_to,
            is_read: false,
            read_at: None,
            is_deleted: false,
            deleted_at: None,
            created_at,
        }
    }
}

/// Trims and bounds message content.
///
/// # Errors
/// Returns `AppError::BadRequest` if the content is empty after trimming or too long.
pub fn normalize_content(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::bad_request("Message content is required"));
    }
    if trimmed.chars().count() > MAX_CONTENT_CHARS {
        return Err(AppError::bad_request(format!("Message cannot be more than {MAX_CONTENT_CHARS} characters")));
    }
    Ok(trimmed.to_string())
}

/// A message with the display fields of both parties, as delivered to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    #[serde(flatten)]
    pub message: Message,
    pub sender: Option<UserProfile>,
    pub receiver: Option<UserProfile>,
}

/// One page of history, newest first as read from the store.
#[derive(Debug, Clone, Default)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Message {
        NewMessage {
            conversation_id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            receiver_id: Uuid::new_v4(),
            content: "hello".to_string(),
            kind: MessageType::Text,
            attachment: None,
            booking_reference: None,
            reply_to: Some(ReplySnapshot {
                message_id: Uuid::nil(),
                text: Some("earlier".to_string()),
                sender_name: Some("Omar".to_string()),
            }),
        }
        .into_message(Uuid::now_v7(), OffsetDateTime::UNIX_EPOCH)
    }

    #[test]
    fn test_normalize_content_trims() {
        assert_eq!(normalize_content("  hello \n").unwrap(), "hello");
    }

    #[test]
    fn test_normalize_content_rejects_blank() {
        assert!(matches!(normalize_content("   "), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_normalize_content_counts_chars_not_bytes() {
        let arabic = "ص".repeat(MAX_CONTENT_CHARS);
        assert!(normalize_content(&arabic).is_ok());

        let too_long = "a".repeat(MAX_CONTENT_CHARS + 1);
        assert!(matches!(normalize_content(&too_long), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_message_wire_shape() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["isRead"], false);
        assert_eq!(json["replyToMessageText"], "earlier");
        assert_eq!(json["replyToSenderName"], "Omar");
        assert_eq!(json["createdAt"], "1970-01-01T00:00:00Z");
        assert!(json.get("attachment").is_none());
    }

    #[test]
    fn test_unread_for_only_receiver() {
        let msg = sample();
        assert!(msg.is_unread_for(msg.receiver_id));
        assert!(!msg.is_unread_for(msg.sender_id));
    }
}
