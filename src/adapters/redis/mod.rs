use crate::config::PubSubConfig;
use backon::{ExponentialBuilder, Retryable};
use redis::AsyncCommands;
use redis::aio::{ConnectionManager, PubSub};
use std::sync::Arc;
use std::time::Duration;

pub mod event_sink;
pub mod presence;

pub use event_sink::RedisEventSink;
pub use presence::RedisPresence;

/// Shared Redis handle. Commands go over one managed connection; every subscription gets
/// a dedicated connection of its own.
#[derive(Debug)]
pub struct RedisClient {
    client: redis::Client,
    commands: ConnectionManager,
    backoff: ExponentialBuilder,
}

impl RedisClient {
    /// Connects the command connection.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the server cannot be reached.
    pub async fn new(url: &str, config: &PubSubConfig) -> anyhow::Result<Arc<Self>> {
        let client = redis::Client::open(url)?;
        let commands = client.get_connection_manager().await?;
        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_secs(config.pubsub_min_backoff_secs))
            .with_max_delay(Duration::from_secs(config.pubsub_max_backoff_secs));

        Ok(Arc::new(Self { client, commands, backoff }))
    }

    /// A handle on the command connection. Cloning is cheap.
    #[must_use]
    pub fn commands(&self) -> ConnectionManager {
        self.commands.clone()
    }

    /// Opens a connection subscribed to `channel`, retrying with backoff.
    ///
    /// # Errors
    /// Returns the last error once the retries are exhausted.
    pub async fn subscribe(&self, channel: &str) -> redis::RedisResult<PubSub> {
        let pubsub = (|| async {
            let mut pubsub = self.client.get_async_pubsub().await?;
            pubsub.subscribe(channel).await?;
            Ok::<PubSub, redis::RedisError>(pubsub)
        })
        .retry(&self.backoff)
        .notify(|e, delay| {
            tracing::warn!(error = %e, ?delay, %channel, "Subscribe failed, retrying");
        })
        .await?;

        tracing::info!(%channel, "Subscribed to realtime channel");
        Ok(pubsub)
    }

    /// # Errors
    /// Returns an error if the publish fails.
    pub async fn publish(&self, channel: &str, payload: &[u8]) -> anyhow::Result<()> {
        let mut conn = self.commands();
        conn.publish::<_, _, i64>(channel, payload).await?;
        Ok(())
    }

    /// # Errors
    /// Returns an error if the server does not answer.
    pub async fn ping(&self) -> anyhow::Result<()> {
        let mut conn = self.commands();
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}
