use crate::config::ChatConfig;
use crate::error::AppError;
use crate::services::store::ChatStore;
use opentelemetry::{global, metrics::Counter};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::Instrument;

/// Upper bound on the retention window: one hundred years.
const MAX_RETENTION_HOURS: i64 = 24 * 365 * 100;

#[derive(Clone, Debug)]
struct Metrics {
    purged_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("snapbook-chat");
        Self {
            purged_total: meter
                .u64_counter("chat_messages_purged_total")
                .with_description("Soft-deleted messages removed by the retention sweep")
                .build(),
        }
    }
}

/// Hard-deletes messages that have been soft-deleted for longer than the retention window.
#[derive(Debug)]
pub struct MessageRetentionWorker {
    store: Arc<dyn ChatStore>,
    config: ChatConfig,
    metrics: Metrics,
}

impl MessageRetentionWorker {
    #[must_use]
    pub fn new(store: Arc<dyn ChatStore>, config: ChatConfig) -> Self {
        Self { store, config, metrics: Metrics::new() }
    }

    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.config.cleanup_interval_secs.max(1)));

        while !*shutdown.borrow() {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.perform_cleanup()
                        .instrument(tracing::info_span!("message_retention_iteration"))
                        .await
                    {
                        tracing::error!(error = ?e, "Message retention iteration failed");
                    }
                }
                _ = shutdown.changed() => {}
            }
        }
        tracing::info!("Message retention loop shutting down...");
    }

    /// Runs one sweep and returns how many messages were removed.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    #[tracing::instrument(skip(self), err, fields(purged = tracing::field::Empty))]
    pub async fn perform_cleanup(&self) -> Result<u64, AppError> {
        let retention_hours = self.config.deleted_retention_hours.clamp(0, MAX_RETENTION_HOURS);
        let Some(cutoff) = OffsetDateTime::now_utc().checked_sub(time::Duration::hours(retention_hours)) else {
            tracing::warn!(retention_hours, "Retention cutoff is out of range, skipping sweep");
            return Ok(0);
        };
        let purged = self.store.purge_deleted(cutoff).await?;

        if purged > 0 {
            tracing::info!(count = %purged, "Purged soft-deleted messages");
            self.metrics.purged_total.add(purged, &[]);
            tracing::Span::current().record("purged", purged);
        }

        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryStore;
    use crate::domain::conversation::{NewConversation, ParticipantRoles};
    use crate::domain::message::{MessageType, NewMessage};
    use uuid::Uuid;

    fn config(retention_hours: i64) -> ChatConfig {
        ChatConfig {
            default_page_size: 50,
            max_page_size: 100,
            search_limit: 50,
            deleted_retention_hours: retention_hours,
            cleanup_interval_secs: 3600,
        }
    }

    async fn seed_deleted(store: &MemoryStore) -> Uuid {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let conversation = store
            .find_or_create_conversation(NewConversation {
                participants: (a, b),
                roles: ParticipantRoles { client: a, photographer: b },
            })
            .await
            .unwrap();
        let (message, _) = store
            .insert_message(NewMessage {
                conversation_id: conversation.id,
                sender_id: a,
                receiver_id: b,
                content: "gone soon".to_string(),
                kind: MessageType::Text,
                attachment: None,
                booking_reference: None,
                reply_to: None,
            })
            .await
            .unwrap();
        store.soft_delete_message(message.id).await.unwrap();
        message.id
    }

    #[tokio::test]
    async fn test_sweep_respects_retention_window() {
        let store = Arc::new(MemoryStore::new());
        let id = seed_deleted(&store).await;

        let patient = MessageRetentionWorker::new(Arc::clone(&store) as Arc<dyn ChatStore>, config(24));
        assert_eq!(patient.perform_cleanup().await.unwrap(), 0);
        assert!(store.find_message(id).await.unwrap().is_some());

        let eager = MessageRetentionWorker::new(Arc::clone(&store) as Arc<dyn ChatStore>, config(0));
        assert_eq!(eager.perform_cleanup().await.unwrap(), 1);
        assert!(store.find_message(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_retention_window_is_clamped() {
        let store = Arc::new(MemoryStore::new());
        let id = seed_deleted(&store).await;

        let worker = MessageRetentionWorker::new(Arc::clone(&store) as Arc<dyn ChatStore>, config(i64::MAX));
        assert_eq!(worker.perform_cleanup().await.unwrap(), 0);
        assert_eq!(worker.perform_cleanup().await.unwrap(), 0);
        assert!(store.find_message(id).await.unwrap().is_some());
    }
}
