use crate::config::ChatConfig;
use crate::domain::Pagination;
use crate::domain::conversation::{Conversation, ConversationView, NewConversation, ParticipantRoles};
use crate::domain::message::{Attachment, Message, MessageType, MessageView, NewMessage, ReplySnapshot, normalize_content};
use crate::domain::push;
use crate::domain::realtime::{Origin, Room, ServerEvent};
use crate::error::{AppError, Result};
use crate::services::gateway::sink::EventEmitter;
use crate::services::push::PushDispatcher;
use crate::services::store::{ChatStore, UserDirectory};
use opentelemetry::{KeyValue, global, metrics::Counter};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone, Debug)]
struct Metrics {
    sent_total: Counter<u64>,
    deleted_total: Counter<u64>,
    read_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("snapbook-chat");
        Self {
            sent_total: meter
                .u64_counter("chat_messages_sent_total")
                .with_description("Total messages successfully sent")
                .build(),
            deleted_total: meter
                .u64_counter("chat_messages_deleted_total")
                .with_description("Total messages soft-deleted by their sender")
                .build(),
            read_total: meter
                .u64_counter("chat_messages_read_total")
                .with_description("Total messages transitioned to read")
                .build(),
        }
    }
}

const fn origin_label(origin: Origin) -> &'static str {
    match origin {
        Origin::Rest => "rest",
        Origin::Connection(_) => "gateway",
    }
}

/// A message as submitted by a client, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    pub kind: MessageType,
    pub attachment: Option<Attachment>,
    pub booking_reference: Option<Uuid>,
    pub reply_to: Option<ReplySnapshot>,
}

/// One page of history in chronological order.
#[derive(Debug, Clone, Serialize)]
pub struct MessageListing {
    pub messages: Vec<MessageView>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationUnread {
    pub conversation_id: Uuid,
    pub unread_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadSummary {
    pub total_unread: u64,
    pub conversations: Vec<ConversationUnread>,
}

/// Sequences persistence, realtime emission and push dispatch for every chat operation.
/// REST handlers and gateway sessions both go through here.
#[derive(Clone, Debug)]
pub struct ChatService {
    store: Arc<dyn ChatStore>,
    users: Arc<dyn UserDirectory>,
    emitter: EventEmitter,
    push: PushDispatcher,
    config: ChatConfig,
    metrics: Metrics,
}

impl ChatService {
    #[must_use]
    pub fn new(
        store: Arc<dyn ChatStore>,
        users: Arc<dyn UserDirectory>,
        emitter: EventEmitter,
        push: PushDispatcher,
        config: ChatConfig,
    ) -> Self {
        Self { store, users, emitter, push, config, metrics: Metrics::new() }
    }

    /// Returns the conversation between the two users, creating it on first contact.
    ///
    /// # Errors
    /// Returns `AppError::BadRequest` if both ids are the same user.
    /// Returns `AppError::NotFound` if either user is unknown.
    #[tracing::instrument(skip(self), err(level = "debug"))]
    pub async fn find_or_create_conversation(&self, user_id: Uuid, other_id: Uuid) -> Result<ConversationView> {
        if user_id == other_id {
            return Err(AppError::bad_request("Cannot create a conversation with yourself"));
        }

        let mut profiles = self.users.find_users(&[user_id, other_id]).await?;
        let (Some(me), Some(other)) = (profiles.remove(&user_id), profiles.remove(&other_id)) else {
            return Err(AppError::not_found("User not found"));
        };

        let draft = NewConversation { participants: (user_id, other_id), roles: ParticipantRoles::assign(&me, &other) };
        let conversation = self.store.find_or_create_conversation(draft).await?;

        Ok(ConversationView::for_user(conversation, user_id, Some(other)))
    }

    /// # Errors
    /// Returns `AppError::Database` if the store fails.
    #[tracing::instrument(skip(self))]
    pub async fn list_conversations(&self, user_id: Uuid) -> Result<Vec<ConversationView>> {
        let conversations = self.store.list_conversations(user_id).await?;
        let partner_ids: Vec<Uuid> = conversations.iter().filter_map(|c| c.other_participant(user_id)).collect();
        let partners = self.users.find_users(&partner_ids).await?;

        Ok(conversations
            .into_iter()
            .map(|conversation| {
                let other = conversation.other_participant(user_id).and_then(|id| partners.get(&id).cloned());
                ConversationView::for_user(conversation, user_id, other)
            })
            .collect())
    }

    /// # Errors
    /// Returns `AppError::NotFound` if the conversation does not exist.
    /// Returns `AppError::Forbidden` if the user is not a participant.
    #[tracing::instrument(skip(self), err(level = "debug"))]
    pub async fn get_conversation(&self, conversation_id: Uuid, user_id: Uuid) -> Result<ConversationView> {
        let conversation = self.participant_conversation(conversation_id, user_id).await?;
        let other = match conversation.other_participant(user_id) {
            Some(id) => self.users.find_user(id).await?,
            None => None,
        };

        Ok(ConversationView::for_user(conversation, user_id, other))
    }

    /// Loads a conversation the user takes part in.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the conversation does not exist.
    /// Returns `AppError::Forbidden` if the user is not a participant.
    pub async fn participant_conversation(&self, conversation_id: Uuid, user_id: Uuid) -> Result<Conversation> {
        let conversation = self
            .store
            .find_conversation(conversation_id)
            .await?
            .ok_or_else(|| AppError::not_found("Conversation not found"))?;

        if !conversation.is_participant(user_id) {
            return Err(AppError::forbidden("Not authorized to access this conversation"));
        }
        Ok(conversation)
    }

    /// Returns a page of history and marks everything addressed to the reader as read.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the conversation does not exist.
    /// Returns `AppError::Forbidden` if the user is not a participant.
    #[tracing::instrument(skip(self), err(level = "debug"))]
    pub async fn list_messages(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> Result<MessageListing> {
        let conversation = self.participant_conversation(conversation_id, user_id).await?;

        let page = page.unwrap_or(1).max(1);
        let limit = limit.unwrap_or(self.config.default_page_size).clamp(1, self.config.max_page_size.max(1));
        let offset = Pagination::new(page, limit, 0).offset();

        let changed = self.store.mark_read(conversation_id, user_id).await?;
        if changed > 0 {
            self.metrics.read_total.add(changed, &[]);
            self.emit_messages_read(&conversation, user_id, Origin::Rest).await;
        }

        let mut history = self.store.list_messages(conversation_id, offset, limit).await?;
        history.messages.reverse();

        let total = history.total;
        let messages = self.hydrate(history.messages).await?;

        Ok(MessageListing {
            messages,
            pagination: Pagination::new(page, limit, total),
        })
    }

    /// Persists a message, notifies the conversation in realtime and queues a push for the receiver.
    ///
    /// # Errors
    /// Returns `AppError::BadRequest` if the content is empty or too long.
    /// Returns `AppError::NotFound` if the conversation does not exist.
    /// Returns `AppError::Forbidden` if the sender is not a participant or the receiver is not the other one.
    #[tracing::instrument(
        skip(self, outgoing),
        fields(conversation_id = %outgoing.conversation_id, sender_id = %outgoing.sender_id),
        err(level = "debug")
    )]
    pub async fn send_message(&self, outgoing: OutgoingMessage, origin: Origin) -> Result<MessageView> {
        let content = normalize_content(&outgoing.content)?;

        let conversation = self
            .store
            .find_conversation(outgoing.conversation_id)
            .await?
            .ok_or_else(|| AppError::not_found("Conversation not found"))?;

        if !conversation.is_participant(outgoing.sender_id) {
            return Err(AppError::forbidden("Not authorized to send messages in this conversation"));
        }
        if conversation.other_participant(outgoing.sender_id) != Some(outgoing.receiver_id) {
            return Err(AppError::forbidden("Receiver is not part of this conversation"));
        }

        // Profiles resolve before the insert. A failed lookup writes nothing.
        let mut profiles = self.users.find_users(&[outgoing.sender_id, outgoing.receiver_id]).await?;
        let sender = profiles.remove(&outgoing.sender_id);
        let receiver = profiles.remove(&outgoing.receiver_id);

        let draft = NewMessage {
            conversation_id: conversation.id,
            sender_id: outgoing.sender_id,
            receiver_id: outgoing.receiver_id,
            content,
            kind: outgoing.kind,
            attachment: outgoing.attachment,
            booking_reference: outgoing.booking_reference,
            reply_to: outgoing.reply_to,
        };
        let (message, _) = self.store.insert_message(draft).await?;
        self.metrics.sent_total.add(1, &[KeyValue::new("origin", origin_label(origin))]);

        if let Some(sender) = &sender {
            self.push.dispatch(message.receiver_id, push::chat_message(sender, &message));
        } else {
            tracing::warn!(sender_id = %message.sender_id, "Sender profile missing, skipping push");
        }

        let view = MessageView { message, sender, receiver };
        let rooms = [Room::User(view.message.receiver_id), Room::Conversation(view.message.conversation_id)];
        self.emitter.emit(&rooms, &ServerEvent::NewMessage(view.clone()), origin).await;

        Ok(view)
    }

    /// Soft-deletes one of the requester's own messages.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the message does not exist or is already deleted.
    /// Returns `AppError::Forbidden` if the requester did not send it.
    #[tracing::instrument(skip(self), err(level = "debug"))]
    pub async fn delete_message(&self, message_id: Uuid, requester_id: Uuid, origin: Origin) -> Result<Message> {
        let message = self
            .store
            .find_message(message_id)
            .await?
            .filter(|message| !message.is_deleted)
            .ok_or_else(|| AppError::not_found("Message not found"))?;

        if message.sender_id != requester_id {
            return Err(AppError::forbidden("Not authorized to delete this message"));
        }

        let (deleted, _) =
            self.store.soft_delete_message(message_id).await?.ok_or_else(|| AppError::not_found("Message not found"))?;
        self.metrics.deleted_total.add(1, &[KeyValue::new("origin", origin_label(origin))]);

        let event = ServerEvent::MessageDeleted { message_id: deleted.id, conversation_id: deleted.conversation_id };
        self.emitter.emit(&[Room::Conversation(deleted.conversation_id)], &event, origin).await;

        Ok(deleted)
    }

    /// Marks every message addressed to the user as read. Safe to repeat.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the conversation does not exist.
    /// Returns `AppError::Forbidden` if the user is not a participant.
    #[tracing::instrument(skip(self), err(level = "debug"))]
    pub async fn mark_conversation_read(&self, conversation_id: Uuid, user_id: Uuid, origin: Origin) -> Result<u64> {
        let conversation = self.participant_conversation(conversation_id, user_id).await?;

        let changed = self.store.mark_read(conversation_id, user_id).await?;
        self.metrics.read_total.add(changed, &[]);
        self.emit_messages_read(&conversation, user_id, origin).await;

        Ok(changed)
    }

    /// # Errors
    /// Returns `AppError::BadRequest` if the query is blank.
    /// Returns `AppError::NotFound` or `AppError::Forbidden` if a conversation filter is given
    /// that the user cannot see.
    #[tracing::instrument(skip(self, query), err(level = "debug"))]
    pub async fn search_messages(
        &self,
        user_id: Uuid,
        query: &str,
        conversation_id: Option<Uuid>,
    ) -> Result<Vec<MessageView>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::bad_request("Search query is required"));
        }
        if let Some(conversation_id) = conversation_id {
            self.participant_conversation(conversation_id, user_id).await?;
        }

        let hits = self.store.search_messages(user_id, query, conversation_id, self.config.search_limit).await?;
        self.hydrate(hits).await
    }

    /// Per-conversation unread counters of the user. The total is the sum of the ledger.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the store fails.
    #[tracing::instrument(skip(self))]
    pub async fn unread_summary(&self, user_id: Uuid) -> Result<UnreadSummary> {
        let conversations: Vec<ConversationUnread> = self
            .store
            .list_conversations(user_id)
            .await?
            .iter()
            .map(|c| ConversationUnread { conversation_id: c.id, unread_count: c.unread_count_for(user_id) })
            .filter(|entry| entry.unread_count > 0)
            .collect();
        let total_unread = conversations.iter().map(|entry| u64::from(entry.unread_count)).sum();

        Ok(UnreadSummary { total_unread, conversations })
    }

    /// `(conversation id, other participant)` for every active conversation of the user.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the store fails.
    pub async fn conversation_partners(&self, user_id: Uuid) -> Result<Vec<(Uuid, Uuid)>> {
        Ok(self
            .store
            .list_conversations(user_id)
            .await?
            .iter()
            .filter_map(|c| c.other_participant(user_id).map(|other| (c.id, other)))
            .collect())
    }

    async fn emit_messages_read(&self, conversation: &Conversation, reader: Uuid, origin: Origin) {
        let event = ServerEvent::MessagesRead { conversation_id: conversation.id, read_by: reader };
        let mut rooms = vec![Room::Conversation(conversation.id)];
        if let Some(other) = conversation.other_participant(reader) {
            rooms.push(Room::User(other));
        }
        self.emitter.emit(&rooms, &event, origin).await;
    }

    async fn hydrate(&self, messages: Vec<Message>) -> Result<Vec<MessageView>> {
        let mut ids: Vec<Uuid> = messages.iter().flat_map(|m| [m.sender_id, m.receiver_id]).collect();
        ids.sort_unstable();
        ids.dedup();
        let profiles: HashMap<Uuid, _> = self.users.find_users(&ids).await?;

        Ok(messages
            .into_iter()
            .map(|message| MessageView {
                sender: profiles.get(&message.sender_id).cloned(),
                receiver: profiles.get(&message.receiver_id).cloned(),
                message,
            })
            .collect())
    }
}
