use crate::domain::message::{Message, MessageType};
use crate::domain::user::UserProfile;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

/// Longest push body sent for a chat message.
pub const MAX_PREVIEW_CHARS: usize = 100;
const TRUNCATED_PREVIEW_CHARS: usize = 97;

pub const DEFAULT_ACCENT_COLOR: &str = "FF9C27B0";
pub const HIGH_PRIORITY: u8 = 10;
pub const LOW_PRIORITY: u8 = 5;

/// A provider-agnostic push payload addressed by external user id.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushNotification {
    pub title: String,
    pub body: String,
    pub data: serde_json::Value,
    pub large_icon: Option<String>,
    pub accent_color: Option<String>,
    pub priority: u8,
}

impl PushNotification {
    #[must_use]
    pub fn new(title: impl Into<String>, body: impl Into<String>, data: serde_json::Value) -> Self {
        Self { title: title.into(), body: body.into(), data, large_icon: None, accent_color: None, priority: HIGH_PRIORITY }
    }

    #[must_use]
    pub fn with_large_icon(mut self, icon: Option<String>) -> Self {
        self.large_icon = icon.filter(|s| !s.is_empty());
        self
    }

    #[must_use]
    pub fn with_accent_color(mut self, color: &str) -> Self {
        self.accent_color = Some(color.to_string());
        self
    }

    #[must_use]
    pub const fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }
}

/// Placeholder shown instead of the raw content for non-text messages.
#[must_use]
pub const fn placeholder(kind: MessageType) -> Option<&'static str> {
    match kind {
        MessageType::Text => None,
        MessageType::Image => Some("📷 صورة"),
        MessageType::File => Some("📎 ملف"),
        MessageType::Booking => Some("📅 حجز"),
    }
}

/// Renders the push body for a chat message.
#[must_use]
pub fn message_preview(kind: MessageType, content: &str) -> String {
    let preview = placeholder(kind).unwrap_or(content);
    if preview.chars().count() > MAX_PREVIEW_CHARS {
        let mut truncated: String = preview.chars().take(TRUNCATED_PREVIEW_CHARS).collect();
        truncated.push_str("...");
        truncated
    } else {
        preview.to_string()
    }
}

/// Push sent to the receiver of a chat message.
#[must_use]
pub fn chat_message(sender: &UserProfile, message: &Message) -> PushNotification {
    let data = json!({
        "type": "chat_message",
        "conversationId": message.conversation_id,
        "senderId": sender.id,
        "senderName": sender.name,
        "senderAvatar": sender.avatar.clone().unwrap_or_default(),
        "messageType": message.kind,
        "screen": "chat",
    });

    PushNotification::new(sender.name.clone(), message_preview(message.kind, &message.content), data)
        .with_large_icon(sender.avatar.clone())
        .with_accent_color(DEFAULT_ACCENT_COLOR)
}

/// External user id the push provider knows a user by.
#[must_use]
pub fn external_id(user_id: Uuid) -> String {
    user_id.to_string()
}
