use crate::domain::message::Message;
use crate::domain::truncate_chars;
use crate::domain::user::{Role, UserProfile};
use serde::Serialize;
use std::collections::HashMap;
use time::OffsetDateTime;
use uuid::Uuid;

/// Characters of the latest message cached on the conversation.
pub const LAST_MESSAGE_PREVIEW_CHARS: usize = 100;

/// Orders a participant pair so that `(a, b)` and `(b, a)` map to the same key.
#[must_use]
pub fn canonical_pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Which participant acts as client and which as photographer.
/// Fixed at creation from the roles the two accounts had at that moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantRoles {
    pub client: Uuid,
    pub photographer: Uuid,
}

impl ParticipantRoles {
    #[must_use]
    pub fn assign(initiator: &UserProfile, other: &UserProfile) -> Self {
        if initiator.role == Role::Photographer {
            Self { client: other.id, photographer: initiator.id }
        } else {
            Self { client: initiator.id, photographer: other.id }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewConversation {
    pub participants: (Uuid, Uuid),
    pub roles: ParticipantRoles,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub id: Uuid,
    /// Canonical order, see [`canonical_pair`].
    pub participants: [Uuid; 2],
    pub participant_roles: ParticipantRoles,
    pub last_message_id: Option<Uuid>,
    pub last_message_text: Option<String>,
    pub last_message_time: Option<OffsetDateTime>,
    pub unread_count: HashMap<Uuid, u32>,
    pub is_active: bool,
    pub is_blocked: bool,
    pub blocked_by: Option<Uuid>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Conversation {
    #[must_use]
    pub fn new(id: Uuid, draft: &NewConversation, now: OffsetDateTime) -> Self {
        let (low, high) = canonical_pair(draft.participants.0, draft.participants.1);
        let unread_count = HashMap::from([(low, 0), (high, 0)]);

        Self {
            id,
            participants: [low, high],
            participant_roles: draft.roles,
            last_message_id: None,
            last_message_text: None,
            last_message_time: None,
            unread_count,
            is_active: true,
            is_blocked: false,
            blocked_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.participants.contains(&user_id)
    }

    #[must_use]
    pub fn other_participant(&self, user_id: Uuid) -> Option<Uuid> {
        match self.participants {
            [a, b] if a == user_id => Some(b),
            [a, b] if b == user_id => Some(a),
            _ => None,
        }
    }

    #[must_use]
    pub fn unread_count_for(&self, user_id: Uuid) -> u32 {
        self.unread_count.get(&user_id).copied().unwrap_or(0)
    }

    pub fn increment_unread(&mut self, user_id: Uuid) {
        let count = self.unread_count.entry(user_id).or_insert(0);
        *count = count.saturating_add(1);
    }

    pub fn decrement_unread(&mut self, user_id: Uuid) {
        if let Some(count) = self.unread_count.get_mut(&user_id) {
            *count = count.saturating_sub(1);
        }
    }

    pub fn reset_unread(&mut self, user_id: Uuid) {
        self.unread_count.insert(user_id, 0);
    }

    /// Points the last-message cache at `message`.
    pub fn apply_last_message(&mut self, message: &Message) {
        self.last_message_id = Some(message.id);
        self.last_message_text = Some(truncate_chars(&message.content, LAST_MESSAGE_PREVIEW_CHARS));
        self.last_message_time = Some(message.created_at);
    }

    pub fn clear_last_message(&mut self) {
        self.last_message_id = None;
        self.last_message_text = None;
        self.last_message_time = None;
    }

    /// Timestamp used to order a user's conversation list.
    #[must_use]
    pub fn last_activity(&self) -> OffsetDateTime {
        self.updated_at
    }
}

/// A conversation as seen by one of its participants.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView {
    pub id: Uuid,
    pub participants: [Uuid; 2],
    pub participant_roles: ParticipantRoles,
    pub last_message_id: Option<Uuid>,
    pub last_message_text: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_message_time: Option<OffsetDateTime>,
    pub is_active: bool,
    pub is_blocked: bool,
    pub blocked_by: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub other_participant: Option<UserProfile>,
    pub unread_count: u32,
}

impl ConversationView {
    #[must_use]
    pub fn for_user(conversation: Conversation, viewer: Uuid, other_participant: Option<UserProfile>) -> Self {
        let unread_count = conversation.unread_count_for(viewer);
        Self {
            id: conversation.id,
            participants: conversation.participants,
            participant_roles: conversation.participant_roles,
            last_message_id: conversation.last_message_id,
            last_message_text: conversation.last_message_text,
            last_message_time: conversation.last_message_time,
            is_active: conversation.is_active,
            is_blocked: conversation.is_blocked,
            blocked_by: conversation.blocked_by,
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
            other_participant,
            unread_count,
        }
    }
}
