use crate::domain::Pagination;
use crate::domain::notification::{NewNotification, Notification, NotificationFilter, NotificationView};
use crate::domain::platform::PlatformEvent;
use crate::domain::push::PushNotification;
use crate::domain::realtime::ServerEvent;
use crate::error::{AppError, Result};
use crate::services::gateway::sink::EventEmitter;
use crate::services::push::PushDispatcher;
use crate::services::store::{NotificationStore, UserDirectory};
use opentelemetry::{KeyValue, global, metrics::Counter};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

const DEFAULT_PAGE_SIZE: u32 = 20;

#[derive(Clone, Debug)]
struct Metrics {
    created_total: Counter<u64>,
    platform_events_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("snapbook-chat");
        Self {
            created_total: meter
                .u64_counter("notifications_created_total")
                .with_description("Notifications written to user feeds")
                .build(),
            platform_events_total: meter
                .u64_counter("platform_events_total")
                .with_description("Platform events turned into notifications")
                .build(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationListing {
    pub notifications: Vec<NotificationView>,
    pub pagination: Pagination,
}

/// The user's in-app notification feed, kept in sync with their open connections.
#[derive(Clone, Debug)]
pub struct NotificationService {
    store: Arc<dyn NotificationStore>,
    users: Arc<dyn UserDirectory>,
    emitter: EventEmitter,
    push: PushDispatcher,
    max_page_size: u32,
    metrics: Metrics,
}

impl NotificationService {
    #[must_use]
    pub fn new(
        store: Arc<dyn NotificationStore>,
        users: Arc<dyn UserDirectory>,
        emitter: EventEmitter,
        push: PushDispatcher,
        max_page_size: u32,
    ) -> Self {
        Self { store, users, emitter, push, max_page_size, metrics: Metrics::new() }
    }

    /// # Errors
    /// Returns `AppError::Database` if the store fails.
    #[tracing::instrument(skip(self))]
    pub async fn list(
        &self,
        recipient_id: Uuid,
        page: Option<u32>,
        limit: Option<u32>,
        unread_only: bool,
    ) -> Result<NotificationListing> {
        let page = page.unwrap_or(1).max(1);
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, self.max_page_size.max(1));
        let offset = Pagination::new(page, limit, 0).offset();

        let found =
            self.store.list_notifications(recipient_id, NotificationFilter { unread_only }, offset, limit).await?;
        let notifications = self.hydrate(found.notifications).await?;

        Ok(NotificationListing { notifications, pagination: Pagination::new(page, limit, found.total) })
    }

    /// # Errors
    /// Returns `AppError::Database` if the store fails.
    pub async fn unread_count(&self, recipient_id: Uuid) -> Result<u64> {
        self.store.unread_notification_count(recipient_id).await
    }

    /// # Errors
    /// Returns `AppError::NotFound` if the notification does not exist or belongs to someone else.
    pub async fn get(&self, recipient_id: Uuid, notification_id: Uuid) -> Result<NotificationView> {
        let notification = self
            .store
            .find_notification(recipient_id, notification_id)
            .await?
            .ok_or_else(|| AppError::not_found("Notification not found"))?;

        let mut views = self.hydrate(vec![notification]).await?;
        views.pop().ok_or_else(|| AppError::not_found("Notification not found"))
    }

    /// # Errors
    /// Returns `AppError::NotFound` if the notification does not exist or belongs to someone else.
    #[tracing::instrument(skip(self), err(level = "debug"))]
    pub async fn mark_read(&self, recipient_id: Uuid, notification_id: Uuid) -> Result<Notification> {
        let notification = self
            .store
            .mark_notification_read(recipient_id, notification_id)
            .await?
            .ok_or_else(|| AppError::not_found("Notification not found"))?;

        self.emitter.emit_to_user(recipient_id, &ServerEvent::NotificationUpdated(notification.clone())).await;
        self.emit_count(recipient_id).await;

        Ok(notification)
    }

    /// # Errors
    /// Returns `AppError::Database` if the store fails.
    #[tracing::instrument(skip(self))]
    pub async fn mark_all_read(&self, recipient_id: Uuid) -> Result<u64> {
        let changed = self.store.mark_all_notifications_read(recipient_id).await?;

        self.emitter.emit_to_user(recipient_id, &ServerEvent::NotificationsMarkedAllRead).await;
        self.emit_count(recipient_id).await;

        Ok(changed)
    }

    /// # Errors
    /// Returns `AppError::NotFound` if the notification does not exist or belongs to someone else.
    #[tracing::instrument(skip(self), err(level = "debug"))]
    pub async fn delete(&self, recipient_id: Uuid, notification_id: Uuid) -> Result<()> {
        if !self.store.delete_notification(recipient_id, notification_id).await? {
            return Err(AppError::not_found("Notification not found"));
        }

        self.emitter.emit_to_user(recipient_id, &ServerEvent::NotificationDeleted { id: notification_id }).await;
        self.emit_count(recipient_id).await;

        Ok(())
    }

    /// # Errors
    /// Returns `AppError::Database` if the store fails.
    #[tracing::instrument(skip(self))]
    pub async fn delete_all(&self, recipient_id: Uuid) -> Result<u64> {
        let removed = self.store.delete_all_notifications(recipient_id).await?;
        self.emitter.emit_to_user(recipient_id, &ServerEvent::notification_count(0)).await;
        Ok(removed)
    }

    /// Writes a feed entry, pushes it to the recipient's open connections and, when given,
    /// queues a device push.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the store fails.
    #[tracing::instrument(skip(self, notification, push), fields(recipient_id = %notification.recipient_id, kind = %notification.kind))]
    pub async fn notify(&self, notification: NewNotification, push: Option<PushNotification>) -> Result<NotificationView> {
        let recipient_id = notification.recipient_id;
        let kind = notification.kind;

        let sender = match notification.sender_id {
            Some(sender_id) => self.users.find_user(sender_id).await?,
            None => None,
        };

        let created = self.store.insert_notification(notification).await?;
        self.metrics.created_total.add(1, &[KeyValue::new("kind", kind.as_str())]);

        let view = NotificationView { notification: created, sender };

        self.emitter.emit_to_user(recipient_id, &ServerEvent::NewNotification(view.clone())).await;
        self.emit_count(recipient_id).await;

        if let Some(push) = push {
            self.push.dispatch(recipient_id, push);
        }

        Ok(view)
    }

    /// # Errors
    /// Returns `AppError::Database` if the store fails.
    #[tracing::instrument(skip(self, event))]
    pub async fn handle_platform_event(&self, event: &PlatformEvent) -> Result<NotificationView> {
        let rendered = event.render();
        self.metrics.platform_events_total.add(1, &[KeyValue::new("kind", rendered.notification.kind.as_str())]);
        self.notify(rendered.notification, Some(rendered.push)).await
    }

    async fn emit_count(&self, recipient_id: Uuid) {
        match self.store.unread_notification_count(recipient_id).await {
            Ok(count) => self.emitter.emit_to_user(recipient_id, &ServerEvent::notification_count(count)).await,
            Err(e) => tracing::warn!(error = %e, %recipient_id, "Failed to recount unread notifications"),
        }
    }

    async fn hydrate(&self, notifications: Vec<Notification>) -> Result<Vec<NotificationView>> {
        let mut ids: Vec<Uuid> = notifications.iter().filter_map(|n| n.sender_id).collect();
        ids.sort_unstable();
        ids.dedup();
        let profiles = self.users.find_users(&ids).await?;

        Ok(notifications
            .into_iter()
            .map(|notification| NotificationView {
                sender: notification.sender_id.and_then(|id| profiles.get(&id).cloned()),
                notification,
            })
            .collect())
    }
}
