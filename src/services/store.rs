use crate::domain::conversation::{Conversation, NewConversation};
use crate::domain::message::{Message, MessagePage, NewMessage};
use crate::domain::notification::{NewNotification, Notification, NotificationFilter, NotificationPage};
use crate::domain::user::UserProfile;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use time::OffsetDateTime;
use uuid::Uuid;

/// Read model of the user-account service.
#[async_trait]
pub trait UserDirectory: Send + Sync + std::fmt::Debug {
    async fn find_user(&self, user_id: Uuid) -> Result<Option<UserProfile>>;

    async fn find_users(&self, user_ids: &[Uuid]) -> Result<HashMap<Uuid, UserProfile>>;

    /// Inserts or replaces a profile pushed by the account service.
    async fn upsert_user(&self, profile: UserProfile) -> Result<()>;
}

/// Durable conversations and messages.
///
/// Every operation that changes a message also rewrites the owning conversation's
/// last-message cache and unread ledger before it returns, as one atomic step.
#[async_trait]
pub trait ChatStore: Send + Sync + std::fmt::Debug {
    /// Returns the conversation for the unordered pair, creating it if absent.
    /// Concurrent calls for the same pair resolve to the same row.
    async fn find_or_create_conversation(&self, draft: NewConversation) -> Result<Conversation>;

    async fn find_conversation(&self, conversation_id: Uuid) -> Result<Option<Conversation>>;

    /// Active conversations of `user_id`, most recent activity first.
    async fn list_conversations(&self, user_id: Uuid) -> Result<Vec<Conversation>>;

    /// Persists the message, points the cache at it and increments the receiver's counter.
    async fn insert_message(&self, message: NewMessage) -> Result<(Message, Conversation)>;

    async fn find_message(&self, message_id: Uuid) -> Result<Option<Message>>;

    /// Non-deleted messages of a conversation, newest first.
    async fn list_messages(&self, conversation_id: Uuid, offset: u64, limit: u32) -> Result<MessagePage>;

    /// Marks every unread message addressed to `reader` as read and zeroes their counter.
    /// Returns how many messages changed state.
    async fn mark_read(&self, conversation_id: Uuid, reader: Uuid) -> Result<u64>;

    /// Soft-deletes a message, decrementing the receiver's counter if it was unread and
    /// recomputing the cache from the latest remaining message.
    async fn soft_delete_message(&self, message_id: Uuid) -> Result<Option<(Message, Conversation)>>;

    /// Case-insensitive substring search over messages the user sent or received.
    async fn search_messages(
        &self,
        user_id: Uuid,
        query: &str,
        conversation_id: Option<Uuid>,
        limit: u32,
    ) -> Result<Vec<Message>>;

    /// Hard-deletes messages soft-deleted before `cutoff`.
    async fn purge_deleted(&self, cutoff: OffsetDateTime) -> Result<u64>;

    async fn ping(&self) -> Result<()>;
}

/// Durable in-app notification feed.
#[async_trait]
pub trait NotificationStore: Send + Sync + std::fmt::Debug {
    async fn insert_notification(&self, notification: NewNotification) -> Result<Notification>;

    /// Notifications of `recipient_id`, newest first.
    async fn list_notifications(
        &self,
        recipient_id: Uuid,
        filter: NotificationFilter,
        offset: u64,
        limit: u32,
    ) -> Result<NotificationPage>;

    async fn find_notification(&self, recipient_id: Uuid, notification_id: Uuid) -> Result<Option<Notification>>;

    async fn mark_notification_read(&self, recipient_id: Uuid, notification_id: Uuid) -> Result<Option<Notification>>;

    async fn mark_all_notifications_read(&self, recipient_id: Uuid) -> Result<u64>;

    async fn delete_notification(&self, recipient_id: Uuid, notification_id: Uuid) -> Result<bool>;

    async fn delete_all_notifications(&self, recipient_id: Uuid) -> Result<u64>;

    async fn unread_notification_count(&self, recipient_id: Uuid) -> Result<u64>;
}

/// Directory whose every lookup fails, for exercising error paths.
#[cfg(test)]
#[derive(Debug)]
pub(crate) struct UnavailableDirectory;

#[cfg(test)]
#[async_trait]
impl UserDirectory for UnavailableDirectory {
    async fn find_user(&self, _user_id: Uuid) -> Result<Option<UserProfile>> {
        Err(crate::error::AppError::Internal("user directory unavailable".to_string()))
    }

    async fn find_users(&self, _user_ids: &[Uuid]) -> Result<HashMap<Uuid, UserProfile>> {
        Err(crate::error::AppError::Internal("user directory unavailable".to_string()))
    }

    async fn upsert_user(&self, _profile: UserProfile) -> Result<()> {
        Err(crate::error::AppError::Internal("user directory unavailable".to_string()))
    }
}
