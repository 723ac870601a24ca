use crate::domain::conversation::{Conversation, NewConversation, canonical_pair};
use crate::domain::message::{Message, MessagePage, NewMessage};
use crate::domain::notification::{NewNotification, Notification, NotificationFilter, NotificationPage};
use crate::domain::user::UserProfile;
use crate::error::{AppError, Result};
use crate::services::store::{ChatStore, NotificationStore, UserDirectory};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Default)]
struct ChatTables {
    conversations: HashMap<Uuid, Conversation>,
    pairs: HashMap<(Uuid, Uuid), Uuid>,
    messages: HashMap<Uuid, Message>,
    // Message ids per conversation in insertion order.
    timelines: HashMap<Uuid, Vec<Uuid>>,
}

impl ChatTables {
    fn latest_visible(&self, conversation_id: Uuid) -> Option<&Message> {
        self.timelines
            .get(&conversation_id)?
            .iter()
            .rev()
            .filter_map(|id| self.messages.get(id))
            .find(|m| !m.is_deleted)
    }

    fn refresh_last_message(&mut self, conversation_id: Uuid) {
        let latest = self.latest_visible(conversation_id).cloned();
        if let Some(conversation) = self.conversations.get_mut(&conversation_id) {
            match latest {
                Some(message) => conversation.apply_last_message(&message),
                None => conversation.clear_last_message(),
            }
        }
    }
}

/// Process-local store used when no database is configured, and by the test suite.
///
/// All chat tables sit behind one lock so that a message change and the matching
/// conversation rewrite are observed together.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    chat: Arc<Mutex<ChatTables>>,
    notifications: Arc<Mutex<HashMap<Uuid, Notification>>>,
    users: Arc<DashMap<Uuid, UserProfile>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn find_user(&self, user_id: Uuid) -> Result<Option<UserProfile>> {
        Ok(self.users.get(&user_id).map(|entry| entry.value().clone()))
    }

    async fn find_users(&self, user_ids: &[Uuid]) -> Result<HashMap<Uuid, UserProfile>> {
        Ok(user_ids.iter().filter_map(|id| self.users.get(id).map(|entry| (*id, entry.value().clone()))).collect())
    }

    async fn upsert_user(&self, profile: UserProfile) -> Result<()> {
        self.users.insert(profile.id, profile);
        Ok(())
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn find_or_create_conversation(&self, draft: NewConversation) -> Result<Conversation> {
        let key = canonical_pair(draft.participants.0, draft.participants.1);
        let mut tables = self.chat.lock().await;

        if let Some(existing) = tables.pairs.get(&key).and_then(|id| tables.conversations.get(id)) {
            return Ok(existing.clone());
        }

        let conversation = Conversation::new(Uuid::now_v7(), &draft, OffsetDateTime::now_utc());
        tables.pairs.insert(key, conversation.id);
        tables.conversations.insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn find_conversation(&self, conversation_id: Uuid) -> Result<Option<Conversation>> {
        Ok(self.chat.lock().await.conversations.get(&conversation_id).cloned())
    }

    async fn list_conversations(&self, user_id: Uuid) -> Result<Vec<Conversation>> {
        let tables = self.chat.lock().await;
        let mut conversations: Vec<Conversation> = tables
            .conversations
            .values()
            .filter(|c| c.is_active && c.is_participant(user_id))
            .cloned()
            .collect();
        conversations.sort_by(|a, b| b.last_activity().cmp(&a.last_activity()).then_with(|| b.id.cmp(&a.id)));
        Ok(conversations)
    }

    async fn insert_message(&self, message: NewMessage) -> Result<(Message, Conversation)> {
        let mut tables = self.chat.lock().await;
        let conversation_id = message.conversation_id;

        // Creation time never goes backwards within a conversation.
        let mut created_at = OffsetDateTime::now_utc();
        if let Some(last) = tables
            .timelines
            .get(&conversation_id)
            .and_then(|ids| ids.last())
            .and_then(|id| tables.messages.get(id))
            && last.created_at > created_at
        {
            created_at = last.created_at;
        }

        let message = message.into_message(Uuid::now_v7(), created_at);

        let Some(conversation) = tables.conversations.get_mut(&conversation_id) else {
            return Err(AppError::not_found("Conversation not found"));
        };
        conversation.apply_last_message(&message);
        conversation.increment_unread(message.receiver_id);
        conversation.updated_at = created_at;
        let conversation = conversation.clone();

        tables.timelines.entry(conversation_id).or_default().push(message.id);
        tables.messages.insert(message.id, message.clone());

        Ok((message, conversation))
    }

    async fn find_message(&self, message_id: Uuid) -> Result<Option<Message>> {
        Ok(self.chat.lock().await.messages.get(&message_id).cloned())
    }

    async fn list_messages(&self, conversation_id: Uuid, offset: u64, limit: u32) -> Result<MessagePage> {
        let tables = self.chat.lock().await;
        let visible: Vec<&Message> = tables
            .timelines
            .get(&conversation_id)
            .map(|ids| ids.iter().rev().filter_map(|id| tables.messages.get(id)).filter(|m| !m.is_deleted).collect())
            .unwrap_or_default();

        let total = visible.len() as u64;
        let skip = usize::try_from(offset).unwrap_or(usize::MAX);
        let messages = visible.into_iter().skip(skip).take(limit as usize).cloned().collect();

        Ok(MessagePage { messages, total })
    }

    async fn mark_read(&self, conversation_id: Uuid, reader: Uuid) -> Result<u64> {
        let mut tables = self.chat.lock().await;
        let now = OffsetDateTime::now_utc();
        let ids = tables.timelines.get(&conversation_id).cloned().unwrap_or_default();

        let mut changed = 0;
        for id in ids {
            if let Some(message) = tables.messages.get_mut(&id)
                && message.receiver_id == reader
                && !message.is_read
            {
                message.is_read = true;
                message.read_at = Some(now);
                changed += 1;
            }
        }

        if let Some(conversation) = tables.conversations.get_mut(&conversation_id) {
            conversation.reset_unread(reader);
        }

        Ok(changed)
    }

    async fn soft_delete_message(&self, message_id: Uuid) -> Result<Option<(Message, Conversation)>> {
        let mut tables = self.chat.lock().await;

        let Some(message) = tables.messages.get_mut(&message_id).filter(|m| !m.is_deleted) else {
            return Ok(None);
        };
        let was_unread = message.is_unread_for(message.receiver_id);
        message.is_deleted = true;
        message.deleted_at = Some(OffsetDateTime::now_utc());
        let message = message.clone();

        if was_unread && let Some(conversation) = tables.conversations.get_mut(&message.conversation_id) {
            conversation.decrement_unread(message.receiver_id);
        }
        tables.refresh_last_message(message.conversation_id);

        Ok(tables.conversations.get(&message.conversation_id).cloned().map(|conversation| (message, conversation)))
    }

    async fn search_messages(
        &self,
        user_id: Uuid,
        query: &str,
        conversation_id: Option<Uuid>,
        limit: u32,
    ) -> Result<Vec<Message>> {
        let needle = query.to_lowercase();
        let tables = self.chat.lock().await;

        let mut hits: Vec<Message> = tables
            .messages
            .values()
            .filter(|m| !m.is_deleted)
            .filter(|m| m.sender_id == user_id || m.receiver_id == user_id)
            .filter(|m| conversation_id.is_none_or(|id| m.conversation_id == id))
            .filter(|m| m.content.to_lowercase().contains(&needle))
            .cloned()
            .collect();

        hits.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        hits.truncate(limit as usize);
        Ok(hits)
    }

    async fn purge_deleted(&self, cutoff: OffsetDateTime) -> Result<u64> {
        let mut tables = self.chat.lock().await;
        let expired: Vec<(Uuid, Uuid)> = tables
            .messages
            .values()
            .filter(|m| m.is_deleted && m.deleted_at.is_some_and(|at| at < cutoff))
            .map(|m| (m.id, m.conversation_id))
            .collect();

        for (message_id, conversation_id) in &expired {
            tables.messages.remove(message_id);
            if let Some(timeline) = tables.timelines.get_mut(conversation_id) {
                timeline.retain(|id| id != message_id);
            }
        }

        Ok(expired.len() as u64)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn insert_notification(&self, notification: NewNotification) -> Result<Notification> {
        let notification = notification.into_notification(Uuid::now_v7(), OffsetDateTime::now_utc());
        self.notifications.lock().await.insert(notification.id, notification.clone());
        Ok(notification)
    }

    async fn list_notifications(
        &self,
        recipient_id: Uuid,
        filter: NotificationFilter,
        offset: u64,
        limit: u32,
    ) -> Result<NotificationPage> {
        let table = self.notifications.lock().await;
        let mut matching: Vec<&Notification> = table
            .values()
            .filter(|n| n.recipient_id == recipient_id)
            .filter(|n| !filter.unread_only || !n.read)
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));

        let total = matching.len() as u64;
        let skip = usize::try_from(offset).unwrap_or(usize::MAX);
        let notifications = matching.into_iter().skip(skip).take(limit as usize).cloned().collect();

        Ok(NotificationPage { notifications, total })
    }

    async fn find_notification(&self, recipient_id: Uuid, notification_id: Uuid) -> Result<Option<Notification>> {
        Ok(self.notifications.lock().await.get(&notification_id).filter(|n| n.recipient_id == recipient_id).cloned())
    }

    async fn mark_notification_read(&self, recipient_id: Uuid, notification_id: Uuid) -> Result<Option<Notification>> {
        let mut table = self.notifications.lock().await;
        let Some(notification) = table.get_mut(&notification_id).filter(|n| n.recipient_id == recipient_id) else {
            return Ok(None);
        };
        if !notification.read {
            notification.read = true;
            notification.read_at = Some(OffsetDateTime::now_utc());
        }
        Ok(Some(notification.clone()))
    }

    async fn mark_all_notifications_read(&self, recipient_id: Uuid) -> Result<u64> {
        let now = OffsetDateTime::now_utc();
        let mut changed = 0;
        for notification in self.notifications.lock().await.values_mut() {
            if notification.recipient_id == recipient_id && !notification.read {
                notification.read = true;
                notification.read_at = Some(now);
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn delete_notification(&self, recipient_id: Uuid, notification_id: Uuid) -> Result<bool> {
        let mut table = self.notifications.lock().await;
        if table.get(&notification_id).is_some_and(|n| n.recipient_id == recipient_id) {
            table.remove(&notification_id);
            return Ok(true);
        }
        Ok(false)
    }

    async fn delete_all_notifications(&self, recipient_id: Uuid) -> Result<u64> {
        let mut table = self.notifications.lock().await;
        let before = table.len();
        table.retain(|_, n| n.recipient_id != recipient_id);
        Ok((before - table.len()) as u64)
    }

    async fn unread_notification_count(&self, recipient_id: Uuid) -> Result<u64> {
        Ok(self.notifications.lock().await.values().filter(|n| n.recipient_id == recipient_id && !n.read).count()
            as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::conversation::ParticipantRoles;
    use crate::domain::message::MessageType;
    use crate::domain::notification::NotificationKind;

    async fn conversation(store: &MemoryStore) -> (Conversation, Uuid, Uuid) {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let draft = NewConversation { participants: (a, b), roles: ParticipantRoles { client: a, photographer: b } };
        (store.find_or_create_conversation(draft).await.unwrap(), a, b)
    }

    fn text(conversation_id: Uuid, sender: Uuid, receiver: Uuid, content: &str) -> NewMessage {
        NewMessage {
            conversation_id,
            sender_id: sender,
            receiver_id: receiver,
            content: content.to_string(),
            kind: MessageType::Text,
            attachment: None,
            booking_reference: None,
            reply_to: None,
        }
    }

    #[tokio::test]
    async fn test_find_or_create_is_symmetric() {
        let store = MemoryStore::new();
        let (conv, a, b) = conversation(&store).await;

        let swapped = NewConversation { participants: (b, a), roles: ParticipantRoles { client: b, photographer: a } };
        let again = store.find_or_create_conversation(swapped).await.unwrap();

        assert_eq!(conv.id, again.id);
        assert_eq!(again.participant_roles.client, a);
    }

    #[tokio::test]
    async fn test_insert_updates_cache_and_ledger() {
        let store = MemoryStore::new();
        let (conv, a, b) = conversation(&store).await;

        let (message, updated) = store.insert_message(text(conv.id, a, b, "hello")).await.unwrap();
        assert!(!message.is_read);
        assert_eq!(updated.last_message_text.as_deref(), Some("hello"));
        assert_eq!(updated.unread_count_for(b), 1);
        assert_eq!(updated.unread_count_for(a), 0);
    }

    #[tokio::test]
    async fn test_delete_unread_decrements_and_recomputes_cache() {
        let store = MemoryStore::new();
        let (conv, a, b) = conversation(&store).await;

        store.insert_message(text(conv.id, a, b, "first")).await.unwrap();
        let (second, _) = store.insert_message(text(conv.id, a, b, "second")).await.unwrap();

        let (deleted, updated) = store.soft_delete_message(second.id).await.unwrap().unwrap();
        assert!(deleted.is_deleted);
        assert_eq!(updated.unread_count_for(b), 1);
        assert_eq!(updated.last_message_text.as_deref(), Some("first"));

        assert!(store.soft_delete_message(second.id).await.unwrap().is_none());

        let page = store.list_messages(conv.id, 0, 50).await.unwrap();
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn test_mark_read_resets_counter() {
        let store = MemoryStore::new();
        let (conv, a, b) = conversation(&store).await;
        store.insert_message(text(conv.id, a, b, "one")).await.unwrap();
        store.insert_message(text(conv.id, a, b, "two")).await.unwrap();

        assert_eq!(store.mark_read(conv.id, b).await.unwrap(), 2);
        assert_eq!(store.mark_read(conv.id, b).await.unwrap(), 0);

        let conv = store.find_conversation(conv.id).await.unwrap().unwrap();
        assert_eq!(conv.unread_count_for(b), 0);
    }

    #[tokio::test]
    async fn test_list_messages_pages_newest_first() {
        let store = MemoryStore::new();
        let (conv, a, b) = conversation(&store).await;
        for i in 0..5 {
            store.insert_message(text(conv.id, a, b, &format!("m{i}"))).await.unwrap();
        }

        let page = store.list_messages(conv.id, 0, 2).await.unwrap();
        assert_eq!(page.total, 5);
        let contents: Vec<_> = page.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["m4", "m3"]);

        let page = store.list_messages(conv.id, 4, 2).await.unwrap();
        assert_eq!(page.messages.len(), 1);
        assert_eq!(page.messages[0].content, "m0");
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive_and_scoped() {
        let store = MemoryStore::new();
        let (conv, a, b) = conversation(&store).await;
        store.insert_message(text(conv.id, a, b, "Wedding photos ready")).await.unwrap();
        store.insert_message(text(conv.id, b, a, "thanks")).await.unwrap();

        let hits = store.search_messages(b, "WEDDING", None, 50).await.unwrap();
        assert_eq!(hits.len(), 1);

        let outsider = store.search_messages(Uuid::new_v4(), "wedding", None, 50).await.unwrap();
        assert!(outsider.is_empty());
    }

    #[tokio::test]
    async fn test_purge_only_removes_old_deletions() {
        let store = MemoryStore::new();
        let (conv, a, b) = conversation(&store).await;
        let (message, _) = store.insert_message(text(conv.id, a, b, "bye")).await.unwrap();
        store.soft_delete_message(message.id).await.unwrap();

        let past = OffsetDateTime::now_utc() - time::Duration::hours(1);
        assert_eq!(store.purge_deleted(past).await.unwrap(), 0);

        let future = OffsetDateTime::now_utc() + time::Duration::hours(1);
        assert_eq!(store.purge_deleted(future).await.unwrap(), 1);
        assert!(store.find_message(message.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_notifications_are_scoped_to_recipient() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();

        let created = store
            .insert_notification(NewNotification {
                recipient_id: owner,
                sender_id: None,
                kind: NotificationKind::System,
                title: "t".into(),
                message: "m".into(),
                data: serde_json::json!({}),
            })
            .await
            .unwrap();

        assert!(store.find_notification(stranger, created.id).await.unwrap().is_none());
        assert!(!store.delete_notification(stranger, created.id).await.unwrap());
        assert_eq!(store.unread_notification_count(owner).await.unwrap(), 1);

        let read = store.mark_notification_read(owner, created.id).await.unwrap().unwrap();
        assert!(read.read);
        assert_eq!(store.unread_notification_count(owner).await.unwrap(), 0);

        let unread_only = store
            .list_notifications(owner, NotificationFilter { unread_only: true }, 0, 20)
            .await
            .unwrap();
        assert_eq!(unread_only.total, 0);
    }
}
