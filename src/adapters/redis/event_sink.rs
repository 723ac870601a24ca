use crate::adapters::redis::RedisClient;
use crate::services::gateway::hub::RoomHub;
use crate::services::gateway::sink::{Envelope, EventSink};
use async_trait::async_trait;
use futures::StreamExt;
use opentelemetry::{KeyValue, global, metrics::Counter};
use redis::aio::PubSub;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::Instrument;

#[derive(Clone, Debug)]
struct Metrics {
    published_total: Counter<u64>,
    received_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("snapbook-chat");
        Self {
            published_total: meter
                .u64_counter("realtime_pubsub_published_total")
                .with_description("Realtime envelopes published to Redis")
                .build(),
            received_total: meter
                .u64_counter("realtime_pubsub_received_total")
                .with_description("Realtime envelopes received from Redis")
                .build(),
        }
    }
}

/// Publishes every envelope on one Redis channel. Each instance subscribes to that channel
/// and delivers what it receives to its own hub, so rooms span the whole deployment.
#[derive(Debug)]
pub struct RedisEventSink {
    redis: Arc<RedisClient>,
    channel: String,
    metrics: Metrics,
}

impl RedisEventSink {
    /// Subscribes to the shared channel and starts forwarding into `hub`.
    ///
    /// # Errors
    /// Returns an error if the first subscription fails.
    pub async fn start(
        redis: Arc<RedisClient>,
        channel: String,
        hub: Arc<RoomHub>,
        shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<Self> {
        let metrics = Metrics::new();
        let pubsub = redis.subscribe(&channel).await?;

        tokio::spawn(
            Self::forward(Arc::clone(&redis), channel.clone(), pubsub, hub, metrics.clone(), shutdown)
                .instrument(tracing::info_span!("realtime_dispatcher", %channel)),
        );

        Ok(Self { redis, channel, metrics })
    }

    /// Delivers every envelope on the channel to the local hub, resubscribing when the
    /// connection drops, until shutdown.
    async fn forward(
        redis: Arc<RedisClient>,
        channel: String,
        mut pubsub: PubSub,
        hub: Arc<RoomHub>,
        metrics: Metrics,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            let mut messages = pubsub.into_on_message();
            loop {
                tokio::select! {
                    _ = shutdown.changed() => return,
                    msg = messages.next() => match msg {
                        Some(msg) => Self::deliver(&hub, &metrics, msg.get_payload_bytes()),
                        None => break,
                    }
                }
            }

            tracing::warn!("Realtime subscription lost, resubscribing");
            pubsub = loop {
                tokio::select! {
                    _ = shutdown.changed() => return,
                    result = redis.subscribe(&channel) => match result {
                        Ok(pubsub) => break pubsub,
                        Err(e) => tracing::error!(error = %e, "Resubscribe failed after retries"),
                    }
                }
            };
        }
    }

    fn deliver(hub: &RoomHub, metrics: &Metrics, payload: &[u8]) {
        match serde_json::from_slice::<Envelope>(payload) {
            Ok(envelope) => {
                metrics.received_total.add(1, &[KeyValue::new("status", "ok")]);
                hub.deliver(&envelope.rooms, &envelope.frame, envelope.exclude);
            }
            Err(e) => {
                metrics.received_total.add(1, &[KeyValue::new("status", "invalid")]);
                tracing::warn!(error = %e, "Discarding malformed realtime envelope");
            }
        }
    }
}

#[async_trait]
impl EventSink for RedisEventSink {
    async fn publish(&self, envelope: Envelope) {
        let payload = match serde_json::to_vec(&envelope) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode realtime envelope");
                return;
            }
        };

        if let Err(e) = self.redis.publish(&self.channel, &payload).await {
            tracing::error!(error = %e, "Failed to publish realtime envelope");
            self.metrics.published_total.add(1, &[KeyValue::new("status", "error")]);
        } else {
            self.metrics.published_total.add(1, &[KeyValue::new("status", "sent")]);
        }
    }
}
