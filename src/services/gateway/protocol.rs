use crate::domain::message::{Attachment, MessageType, ReplySnapshot};
use crate::domain::realtime::ServerEvent;
use crate::services::chat_service::OutgoingMessage;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

/// `"<uuid>"` or `{"userId": "<uuid>"}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum UserRef {
    Bare(Uuid),
    Wrapped {
        #[serde(rename = "userId")]
        user_id: Uuid,
    },
}

impl From<UserRef> for Uuid {
    fn from(value: UserRef) -> Self {
        match value {
            UserRef::Bare(id) | UserRef::Wrapped { user_id: id } => id,
        }
    }
}

/// `"<uuid>"` or `{"conversationId": "<uuid>"}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ConversationRef {
    Bare(Uuid),
    Wrapped {
        #[serde(rename = "conversationId")]
        conversation_id: Uuid,
    },
}

impl From<ConversationRef> for Uuid {
    fn from(value: ConversationRef) -> Self {
        match value {
            ConversationRef::Bare(id) | ConversationRef::Wrapped { conversation_id: id } => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    pub conversation_id: Uuid,
    pub receiver_id: Uuid,
    pub sender_id: Uuid,
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

impl SendMessagePayload {
    #[must_use]
    pub fn into_outgoing(self) -> OutgoingMessage {
        let reply_to = self.reply_to_message_id.map(|message_id| ReplySnapshot {
            message_id,
            text: self.reply_to_message_text,
            sender_name: self.reply_to_sender_name,
        });

        OutgoingMessage {
            conversation_id: self.conversation_id,
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            content: self.content,
            kind: self.kind.unwrap_or_default(),
            attachment: self.attachment,
            booking_reference: self.booking_reference,
            reply_to,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub conversation_id: Uuid,
    #[serde(default)]
    pub user_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkAsReadPayload {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteMessagePayload {
    pub message_id: Uuid,
    pub user_id: Uuid,
}

/// A parsed inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Identify(Uuid),
    JoinConversation(Uuid),
    LeaveConversation(Uuid),
    SendMessage(SendMessagePayload),
    TypingStart(TypingPayload),
    TypingStop(TypingPayload),
    MarkAsRead(MarkAsReadPayload),
    DeleteMessage(DeleteMessagePayload),
    CheckOnlineStatus(Uuid),
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    event: String,
    #[serde(default)]
    data: Value,
}

/// A frame that could not be turned into a [`ClientEvent`], answered with `reply`.
#[derive(Debug, Clone)]
pub struct FrameError {
    pub reply: ServerEvent,
}

/// Error event that answers a failure of the named inbound event.
#[must_use]
pub fn error_reply(inbound: &str, error: String) -> ServerEvent {
    match inbound {
        "send_message" => ServerEvent::MessageError { error },
        "mark_as_read" => ServerEvent::MarkAsReadError { error },
        "delete_message" => ServerEvent::DeleteMessageError { error },
        "user_connected" | "identify" => ServerEvent::IdentifyError { error },
        _ => ServerEvent::Error { error },
    }
}

fn payload<T: DeserializeOwned>(event: &str, data: Value) -> Result<T, FrameError> {
    serde_json::from_value(data)
        .map_err(|e| FrameError { reply: error_reply(event, format!("Invalid {event} payload: {e}")) })
}

impl ClientEvent {
    /// Parses a text frame of the form `{"event": "<name>", "data": <payload>}`.
    ///
    /// # Errors
    /// Returns a [`FrameError`] carrying the event-specific error reply.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let frame: RawFrame = serde_json::from_str(text)
            .map_err(|e| FrameError { reply: ServerEvent::Error { error: format!("Malformed frame: {e}") } })?;

        let name = frame.event.as_str();
        let data = frame.data;

        let event = match name {
            "user_connected" | "identify" => Self::Identify(payload::<UserRef>(name, data)?.into()),
            "join_conversation" => Self::JoinConversation(payload::<ConversationRef>(name, data)?.into()),
            "leave_conversation" => Self::LeaveConversation(payload::<ConversationRef>(name, data)?.into()),
            "send_message" => Self::SendMessage(payload(name, data)?),
            "typing_start" => Self::TypingStart(payload(name, data)?),
            "typing_stop" => Self::TypingStop(payload(name, data)?),
            "mark_as_read" => Self::MarkAsRead(payload(name, data)?),
            "delete_message" => Self::DeleteMessage(payload(name, data)?),
            "check_online_status" => Self::CheckOnlineStatus(payload::<UserRef>(name, data)?.into()),
            other => {
                return Err(FrameError { reply: ServerEvent::Error { error: format!("Unknown event: {other}") } });
            }
        };

        Ok(event)
    }

    /// Wire name of the inbound event.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Identify(_) => "user_connected",
            Self::JoinConversation(_) => "join_conversation",
            Self::LeaveConversation(_) => "leave_conversation",
            Self::SendMessage(_) => "send_message",
            Self::TypingStart(_) => "typing_start",
            Self::TypingStop(_) => "typing_stop",
            Self::MarkAsRead(_) => "mark_as_read",
            Self::DeleteMessage(_) => "delete_message",
            Self::CheckOnlineStatus(_) => "check_online_status",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reply_name(text: &str) -> &'static str {
        ClientEvent::parse(text).unwrap_err().reply.name()
    }

    #[test]
    fn test_identify_accepts_both_shapes() {
        let id = Uuid::new_v4();
        let bare = json!({"event": "user_connected", "data": id}).to_string();
        let wrapped = json!({"event": "identify", "data": {"userId": id}}).to_string();

        assert_eq!(ClientEvent::parse(&bare).unwrap(), ClientEvent::Identify(id));
        assert_eq!(ClientEvent::parse(&wrapped).unwrap(), ClientEvent::Identify(id));
    }

    #[test]
    fn test_send_message_payload() {
        let conversation_id = Uuid::new_v4();
        let text = json!({
            "event": "send_message",
            "data": {
                "conversationId": conversation_id,
                "receiverId": Uuid::new_v4(),
                "senderId": Uuid::new_v4(),
                "content": "hi",
                "type": "image",
                "replyToMessageId": Uuid::nil(),
                "replyToMessageText": "earlier"
            }
        })
        .to_string();

        let ClientEvent::SendMessage(payload) = ClientEvent::parse(&text).unwrap() else {
            panic!("expected send_message");
        };
        let outgoing = payload.into_outgoing();
        assert_eq!(outgoing.conversation_id, conversation_id);
        assert_eq!(outgoing.kind, MessageType::Image);
        assert_eq!(outgoing.reply_to.unwrap().text.as_deref(), Some("earlier"));
    }

    #[test]
    fn test_missing_fields_map_to_event_specific_errors() {
        assert_eq!(reply_name(r#"{"event":"send_message","data":{"content":"x"}}"#), "message_error");
        assert_eq!(reply_name(r#"{"event":"mark_as_read","data":{}}"#), "mark_as_read_error");
        assert_eq!(reply_name(r#"{"event":"delete_message","data":null}"#), "delete_message_error");
        assert_eq!(reply_name(r#"{"event":"user_connected","data":"not-a-uuid"}"#), "identify_error");
        assert_eq!(reply_name(r#"{"event":"join_conversation"}"#), "error");
    }

    #[test]
    fn test_garbage_and_unknown_events() {
        assert_eq!(reply_name("not json"), "error");
        assert_eq!(reply_name(r#"{"data":1}"#), "error");
        assert_eq!(reply_name(r#"{"event":"dance","data":{}}"#), "error");
    }
}
