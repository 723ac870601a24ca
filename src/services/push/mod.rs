pub mod provider;
pub mod worker;

use crate::domain::push::{PushNotification, external_id};
use opentelemetry::{KeyValue, global, metrics::Counter};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

pub use provider::{PushError, PushProvider};
pub use worker::PushWorker;

#[derive(Clone, Debug)]
struct Metrics {
    enqueued_total: Counter<u64>,
    dropped_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("snapbook-chat");
        Self {
            enqueued_total: meter
                .u64_counter("push_enqueued_total")
                .with_description("Push notifications queued for delivery")
                .build(),
            dropped_total: meter
                .u64_counter("push_dropped_total")
                .with_description("Push notifications dropped before reaching the provider")
                .build(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PushJob {
    pub external_user_id: String,
    pub notification: PushNotification,
}

/// Fire-and-forget front of the push provider.
#[derive(Clone, Debug)]
pub struct PushDispatcher {
    tx: mpsc::Sender<PushJob>,
    metrics: Metrics,
}

impl PushDispatcher {
    /// Creates the dispatcher and the queue its worker drains.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<PushJob>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx, metrics: Metrics::new() }, rx)
    }

    /// Queues a push for the user. Never blocks and never fails; a full or closed queue drops it.
    pub fn dispatch(&self, user_id: Uuid, notification: PushNotification) {
        let job = PushJob { external_user_id: external_id(user_id), notification };

        match self.tx.try_send(job) {
            Ok(()) => self.metrics.enqueued_total.add(1, &[]),
            Err(TrySendError::Full(_)) => {
                tracing::warn!(%user_id, "Push queue full, dropping notification");
                self.metrics.dropped_total.add(1, &[KeyValue::new("reason", "full")]);
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!(%user_id, "Push worker stopped, dropping notification");
                self.metrics.dropped_total.add(1, &[KeyValue::new("reason", "closed")]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dispatch_drops_when_full() {
        let (dispatcher, mut rx) = PushDispatcher::new(1);
        let user = Uuid::new_v4();

        dispatcher.dispatch(user, PushNotification::new("a", "1", json!({})));
        dispatcher.dispatch(user, PushNotification::new("b", "2", json!({})));

        let job = rx.try_recv().unwrap();
        assert_eq!(job.external_user_id, user.to_string());
        assert_eq!(job.notification.title, "a");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dispatch_after_worker_gone_is_silent() {
        let (dispatcher, rx) = PushDispatcher::new(1);
        drop(rx);
        dispatcher.dispatch(Uuid::new_v4(), PushNotification::new("a", "1", json!({})));
    }
}
