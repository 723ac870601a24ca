use crate::adapters::database::DbPool;
use crate::adapters::database::conversation_repo::ConversationRepository;
use crate::adapters::database::message_repo::MessageRepository;
use crate::adapters::database::notification_repo::NotificationRepository;
use crate::adapters::database::user_repo::UserRepository;
use crate::domain::conversation::{Conversation, LAST_MESSAGE_PREVIEW_CHARS, NewConversation};
use crate::domain::message::{Message, MessagePage, NewMessage};
use crate::domain::notification::{NewNotification, Notification, NotificationFilter, NotificationPage};
use crate::domain::truncate_chars;
use crate::domain::user::UserProfile;
use crate::error::{AppError, Result};
use crate::services::store::{ChatStore, NotificationStore, UserDirectory};
use async_trait::async_trait;
use sqlx::PgConnection;
use std::collections::HashMap;
use time::OffsetDateTime;
use uuid::Uuid;

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Postgres-backed conversations and messages. Each mutation runs in one transaction
/// holding the conversation row lock.
#[derive(Clone, Debug)]
pub struct PgChatStore {
    pool: DbPool,
    conversations: ConversationRepository,
    messages: MessageRepository,
}

impl PgChatStore {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool, conversations: ConversationRepository::new(), messages: MessageRepository::new() }
    }

    async fn locked_conversation(&self, conn: &mut PgConnection, conversation_id: Uuid) -> Result<Conversation> {
        self.conversations
            .find_by_id(conn, conversation_id, true)
            .await?
            .ok_or_else(|| AppError::not_found("Conversation not found"))
    }

    async fn reload(&self, conn: &mut PgConnection, conversation_id: Uuid) -> Result<Conversation> {
        self.conversations
            .find_by_id(conn, conversation_id, false)
            .await?
            .ok_or_else(|| AppError::Internal(format!("conversation {conversation_id} vanished mid-transaction")))
    }
}

#[async_trait]
impl ChatStore for PgChatStore {
    async fn find_or_create_conversation(&self, draft: NewConversation) -> Result<Conversation> {
        let (a, b) = draft.participants;
        let mut tx = self.pool.begin().await?;

        self.conversations.insert_if_absent(&mut tx, &draft).await?;
        let conversation = self
            .conversations
            .find_by_pair(&mut tx, a, b)
            .await?
            .ok_or_else(|| AppError::Internal("conversation missing after insert".to_string()))?;

        tx.commit().await?;
        Ok(conversation)
    }

    async fn find_conversation(&self, conversation_id: Uuid) -> Result<Option<Conversation>> {
        let mut conn = self.pool.acquire().await?;
        self.conversations.find_by_id(&mut conn, conversation_id, false).await
    }

    async fn list_conversations(&self, user_id: Uuid) -> Result<Vec<Conversation>> {
        let mut conn = self.pool.acquire().await?;
        self.conversations.list_for_user(&mut conn, user_id).await
    }

    async fn insert_message(&self, message: NewMessage) -> Result<(Message, Conversation)> {
        let mut tx = self.pool.begin().await?;

        let conversation = self.locked_conversation(&mut tx, message.conversation_id).await?;
        let stored = self.messages.create(&mut tx, &message).await?;

        let preview = truncate_chars(&stored.content, LAST_MESSAGE_PREVIEW_CHARS);
        self.conversations
            .set_last_message(&mut tx, conversation.id, Some(stored.id), Some(&preview), Some(stored.created_at), true)
            .await?;
        self.conversations.increment_unread(&mut tx, conversation.id, stored.receiver_id).await?;

        let conversation = self.reload(&mut tx, conversation.id).await?;
        tx.commit().await?;

        Ok((stored, conversation))
    }

    async fn find_message(&self, message_id: Uuid) -> Result<Option<Message>> {
        let mut conn = self.pool.acquire().await?;
        self.messages.find_by_id(&mut conn, message_id).await
    }

    async fn list_messages(&self, conversation_id: Uuid, offset: u64, limit: u32) -> Result<MessagePage> {
        let mut conn = self.pool.acquire().await?;
        let messages = self.messages.fetch_page(&mut conn, conversation_id, to_i64(offset), i64::from(limit)).await?;
        let total = self.messages.count_live(&mut conn, conversation_id).await?;

        Ok(MessagePage { messages, total })
    }

    async fn mark_read(&self, conversation_id: Uuid, reader: Uuid) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        self.locked_conversation(&mut tx, conversation_id).await?;
        let changed = self.messages.mark_read(&mut tx, conversation_id, reader).await?;
        self.conversations.reset_unread(&mut tx, conversation_id, reader).await?;

        tx.commit().await?;
        Ok(changed)
    }

    async fn soft_delete_message(&self, message_id: Uuid) -> Result<Option<(Message, Conversation)>> {
        let mut tx = self.pool.begin().await?;

        let Some(existing) = self.messages.find_by_id(&mut tx, message_id).await? else {
            return Ok(None);
        };
        self.locked_conversation(&mut tx, existing.conversation_id).await?;

        let Some(deleted) = self.messages.soft_delete(&mut tx, message_id).await? else {
            return Ok(None);
        };

        if !deleted.is_read {
            self.conversations.decrement_unread(&mut tx, deleted.conversation_id, deleted.receiver_id).await?;
        }

        match self.messages.latest_live(&mut tx, deleted.conversation_id).await? {
            Some(latest) => {
                let preview = truncate_chars(&latest.content, LAST_MESSAGE_PREVIEW_CHARS);
                self.conversations
                    .set_last_message(
                        &mut tx,
                        deleted.conversation_id,
                        Some(latest.id),
                        Some(&preview),
                        Some(latest.created_at),
                        false,
                    )
                    .await?;
            }
            None => {
                self.conversations.set_last_message(&mut tx, deleted.conversation_id, None, None, None, false).await?;
            }
        }

        let conversation = self.reload(&mut tx, deleted.conversation_id).await?;
        tx.commit().await?;

        Ok(Some((deleted, conversation)))
    }

    async fn search_messages(
        &self,
        user_id: Uuid,
        query: &str,
        conversation_id: Option<Uuid>,
        limit: u32,
    ) -> Result<Vec<Message>> {
        let mut conn = self.pool.acquire().await?;
        self.messages.search(&mut conn, user_id, query, conversation_id, i64::from(limit)).await
    }

    async fn purge_deleted(&self, cutoff: OffsetDateTime) -> Result<u64> {
        let mut conn = self.pool.acquire().await?;
        self.messages.purge_deleted(&mut conn, cutoff).await
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct PgNotificationStore {
    pool: DbPool,
    repo: NotificationRepository,
}

impl PgNotificationStore {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool, repo: NotificationRepository::new() }
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn insert_notification(&self, notification: NewNotification) -> Result<Notification> {
        let mut conn = self.pool.acquire().await?;
        self.repo.create(&mut conn, &notification).await
    }

    async fn list_notifications(
        &self,
        recipient_id: Uuid,
        filter: NotificationFilter,
        offset: u64,
        limit: u32,
    ) -> Result<NotificationPage> {
        let mut conn = self.pool.acquire().await?;
        let notifications = self
            .repo
            .fetch_page(&mut conn, recipient_id, filter.unread_only, to_i64(offset), i64::from(limit))
            .await?;
        let total = self.repo.count(&mut conn, recipient_id, filter.unread_only).await?;

        Ok(NotificationPage { notifications, total })
    }

    async fn find_notification(&self, recipient_id: Uuid, notification_id: Uuid) -> Result<Option<Notification>> {
        let mut conn = self.pool.acquire().await?;
        self.repo.find(&mut conn, recipient_id, notification_id).await
    }

    async fn mark_notification_read(&self, recipient_id: Uuid, notification_id: Uuid) -> Result<Option<Notification>> {
        let mut conn = self.pool.acquire().await?;
        self.repo.mark_read(&mut conn, recipient_id, notification_id).await
    }

    async fn mark_all_notifications_read(&self, recipient_id: Uuid) -> Result<u64> {
        let mut conn = self.pool.acquire().await?;
        self.repo.mark_all_read(&mut conn, recipient_id).await
    }

    async fn delete_notification(&self, recipient_id: Uuid, notification_id: Uuid) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        self.repo.delete(&mut conn, recipient_id, notification_id).await
    }

    async fn delete_all_notifications(&self, recipient_id: Uuid) -> Result<u64> {
        let mut conn = self.pool.acquire().await?;
        self.repo.delete_all(&mut conn, recipient_id).await
    }

    async fn unread_notification_count(&self, recipient_id: Uuid) -> Result<u64> {
        let mut conn = self.pool.acquire().await?;
        self.repo.count(&mut conn, recipient_id, true).await
    }
}

#[derive(Clone, Debug)]
pub struct PgUserDirectory {
    pool: DbPool,
    repo: UserRepository,
}

impl PgUserDirectory {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool, repo: UserRepository::new() }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_user(&self, user_id: Uuid) -> Result<Option<UserProfile>> {
        let mut conn = self.pool.acquire().await?;
        let mut users = self.repo.find_many(&mut conn, &[user_id]).await?;
        Ok(users.pop())
    }

    async fn find_users(&self, user_ids: &[Uuid]) -> Result<HashMap<Uuid, UserProfile>> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let mut conn = self.pool.acquire().await?;
        let users = self.repo.find_many(&mut conn, user_ids).await?;
        Ok(users.into_iter().map(|user| (user.id, user)).collect())
    }

    async fn upsert_user(&self, profile: UserProfile) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        self.repo.upsert(&mut conn, &profile).await
    }
}
