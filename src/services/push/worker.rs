use crate::services::push::PushJob;
use crate::services::push::provider::{PushError, PushProvider};
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc, watch};
use tracing::Instrument;

#[derive(Clone, Debug)]
struct Metrics {
    sent: Counter<u64>,
    errors: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("snapbook-chat");
        Self {
            sent: meter
                .u64_counter("push_sent_total")
                .with_description("Total number of push notifications successfully sent")
                .build(),
            errors: meter
                .u64_counter("push_errors_total")
                .with_description("Total number of push notification delivery errors")
                .build(),
        }
    }
}

/// Drains the push queue with bounded concurrency. Delivery is at most once.
#[derive(Debug)]
pub struct PushWorker {
    rx: mpsc::Receiver<PushJob>,
    provider: Arc<dyn PushProvider>,
    semaphore: Arc<Semaphore>,
    metrics: Metrics,
}

impl PushWorker {
    #[must_use]
    pub fn new(rx: mpsc::Receiver<PushJob>, provider: Arc<dyn PushProvider>, concurrency: usize) -> Self {
        Self { rx, provider, semaphore: Arc::new(Semaphore::new(concurrency.max(1))), metrics: Metrics::new() }
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        while !*shutdown.borrow() {
            tokio::select! {
                job = self.rx.recv() => {
                    let Some(job) = job else { break };

                    let Ok(permit) = Arc::clone(&self.semaphore).acquire_owned().await else {
                        break;
                    };
                    let provider = Arc::clone(&self.provider);
                    let metrics = self.metrics.clone();

                    tokio::spawn(
                        async move {
                            let _permit = permit;
                            Self::deliver(provider.as_ref(), &metrics, &job).await;
                        }
                        .instrument(tracing::debug_span!("dispatch_push")),
                    );
                }
                _ = shutdown.changed() => break,
            }
        }

        tracing::info!("Push worker shutting down...");
    }

    async fn deliver(provider: &dyn PushProvider, metrics: &Metrics, job: &PushJob) {
        match provider.send(&job.external_user_id, &job.notification).await {
            Ok(()) => {
                tracing::debug!(user = %job.external_user_id, "Push notification sent successfully");
                metrics.sent.add(1, &[]);
            }
            Err(PushError::Rejected(reason)) => {
                tracing::warn!(user = %job.external_user_id, %reason, "Push notification rejected");
                metrics.errors.add(1, &[KeyValue::new("reason", "rejected")]);
            }
            Err(PushError::Transport(e)) => {
                tracing::error!(error = %e, user = %job.external_user_id, "Failed to send push notification");
                metrics.errors.add(1, &[KeyValue::new("reason", "transport")]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::push::PushNotification;
    use crate::services::push::PushDispatcher;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;
    use uuid::Uuid;

    #[derive(Debug, Default)]
    struct Recorder {
        sent: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl PushProvider for Recorder {
        async fn send(&self, external_user_id: &str, _notification: &PushNotification) -> Result<(), PushError> {
            self.sent.lock().unwrap().push(external_user_id.to_string());
            if self.fail { Err(PushError::Rejected("no subscribers".into())) } else { Ok(()) }
        }
    }

    async fn wait_for(recorder: &Recorder, count: usize) {
        for _ in 0..100 {
            if recorder.sent.lock().unwrap().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("provider never received {count} pushes");
    }

    #[tokio::test]
    async fn test_worker_delivers_queued_jobs() {
        let recorder = Arc::new(Recorder::default());
        let (dispatcher, rx) = PushDispatcher::new(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(PushWorker::new(rx, Arc::clone(&recorder) as Arc<dyn PushProvider>, 2).run(shutdown_rx));

        let user = Uuid::new_v4();
        dispatcher.dispatch(user, PushNotification::new("t", "b", json!({})));
        dispatcher.dispatch(user, PushNotification::new("t", "b", json!({})));

        wait_for(&recorder, 2).await;
        assert!(recorder.sent.lock().unwrap().iter().all(|id| *id == user.to_string()));
    }

    #[tokio::test]
    async fn test_provider_failure_is_not_retried() {
        let recorder = Arc::new(Recorder { fail: true, ..Recorder::default() });
        let (dispatcher, rx) = PushDispatcher::new(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(PushWorker::new(rx, Arc::clone(&recorder) as Arc<dyn PushProvider>, 1).run(shutdown_rx));

        dispatcher.dispatch(Uuid::new_v4(), PushNotification::new("t", "b", json!({})));
        wait_for(&recorder, 1).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(recorder.sent.lock().unwrap().len(), 1);
    }
}
