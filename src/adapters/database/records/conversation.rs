use crate::domain::conversation::{Conversation, ParticipantRoles};
use std::collections::HashMap;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ConversationRecord {
    pub(crate) id: Uuid,
    pub(crate) participant_low: Uuid,
    pub(crate) participant_high: Uuid,
    pub(crate) client_id: Uuid,
    pub(crate) photographer_id: Uuid,
    pub(crate) last_message_id: Option<Uuid>,
    pub(crate) last_message_text: Option<String>,
    pub(crate) last_message_time: Option<OffsetDateTime>,
    pub(crate) is_active: bool,
    pub(crate) is_blocked: bool,
    pub(crate) blocked_by: Option<Uuid>,
    pub(crate) created_at: OffsetDateTime,
    pub(crate) updated_at: OffsetDateTime,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct UnreadRecord {
    pub(crate) conversation_id: Uuid,
    pub(crate) user_id: Uuid,
    pub(crate) unread_count: i32,
}

impl ConversationRecord {
    pub(crate) fn into_domain(self, unread: &[UnreadRecord]) -> Conversation {
        let mut unread_count = HashMap::from([(self.participant_low, 0), (self.participant_high, 0)]);
        for row in unread.iter().filter(|row| row.conversation_id == self.id) {
            unread_count.insert(row.user_id, u32::try_from(row.unread_count).unwrap_or(0));
        }

        Conversation {
            id: self.id,
            participants: [self.participant_low, self.participant_high],
            participant_roles: ParticipantRoles { client: self.client_id, photographer: self.photographer_id },
            last_message_id: self.last_message_id,
            last_message_text: self.last_message_text,
            last_message_time: self.last_message_time,
            unread_count,
            is_active: self.is_active,
            is_blocked: self.is_blocked,
            blocked_by: self.blocked_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
