#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

pub mod adapters;
pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod telemetry;
pub mod workers;

use crate::adapters::database::{DbPool, PgChatStore, PgNotificationStore, PgUserDirectory};
use crate::adapters::memory::MemoryStore;
use crate::adapters::push::LogPushProvider;
use crate::adapters::redis::{RedisClient, RedisEventSink, RedisPresence};
use crate::api::{MgmtState, ServiceContainer};
use crate::config::Config;
use crate::services::chat_service::ChatService;
use crate::services::gateway::GatewayService;
use crate::services::gateway::hub::RoomHub;
use crate::services::gateway::presence::{LocalPresence, PresenceRegistry};
use crate::services::gateway::sink::{EventEmitter, EventSink, LocalEventSink};
use crate::services::health_service::HealthService;
use crate::services::notification_service::NotificationService;
use crate::services::push::{PushDispatcher, PushProvider, PushWorker};
use crate::services::rate_limit_service::RateLimitService;
use crate::services::store::{ChatStore, NotificationStore, UserDirectory};
use crate::workers::MessageRetentionWorker;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Applies the embedded migrations.
///
/// # Errors
/// Returns an error if a migration fails.
pub async fn run_migrations(pool: &DbPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Flips `shutdown_tx` on Ctrl-C or SIGTERM.
pub fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => tracing::error!(error = %e, "Failed to install SIGTERM handler"),
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => {},
            () = terminate => {},
        }

        tracing::info!("Shutdown signal received, draining connections...");
        let _ = shutdown_tx.send(true);
    });
}

/// Routes panics through tracing so they reach the structured log.
pub fn setup_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let location = info.location().map(|l| format!("{}:{}", l.file(), l.line())).unwrap_or_default();
        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_default();

        tracing::error!(panic.location = %location, panic.payload = %payload, "Panic occurred");
    }));
}

/// Background tasks owned by the process, started after the listeners are bound.
#[derive(Debug)]
pub struct Workers {
    push_worker: PushWorker,
    retention_worker: MessageRetentionWorker,
}

impl Workers {
    #[must_use]
    pub fn spawn_all(self, shutdown_rx: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(self.push_worker.run(shutdown_rx.clone())),
            tokio::spawn(self.retention_worker.run(shutdown_rx)),
        ]
    }
}

#[derive(Debug)]
pub struct App {
    pub services: ServiceContainer,
    pub mgmt_state: MgmtState,
    pub workers: Workers,
}

/// Wires adapters into services.
///
/// Without a database pool the in-process store is used, and without a pubsub client events
/// and presence stay local to this instance.
#[derive(Debug)]
pub struct AppBuilder {
    config: Config,
    pool: Option<DbPool>,
    memory: Option<MemoryStore>,
    pubsub: Option<Arc<RedisClient>>,
    push_provider: Option<Arc<dyn PushProvider>>,
    shutdown_rx: Option<watch::Receiver<bool>>,
}

impl AppBuilder {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config, pool: None, memory: None, pubsub: None, push_provider: None, shutdown_rx: None }
    }

    #[must_use]
    pub fn with_database(mut self, pool: DbPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Uses the given in-process store. Ignored when a database pool is set.
    #[must_use]
    pub fn with_memory_store(mut self, store: MemoryStore) -> Self {
        self.memory = Some(store);
        self
    }

    #[must_use]
    pub fn with_pubsub(mut self, pubsub: Arc<RedisClient>) -> Self {
        self.pubsub = Some(pubsub);
        self
    }

    #[must_use]
    pub fn with_push_provider(mut self, provider: Arc<dyn PushProvider>) -> Self {
        self.push_provider = Some(provider);
        self
    }

    #[must_use]
    pub fn with_shutdown_rx(mut self, shutdown_rx: watch::Receiver<bool>) -> Self {
        self.shutdown_rx = Some(shutdown_rx);
        self
    }

    /// # Errors
    /// Returns an error if the shutdown receiver is missing or the pubsub subscription fails.
    pub async fn build(self) -> anyhow::Result<App> {
        let Self { config, pool, memory, pubsub, push_provider, shutdown_rx } = self;
        let shutdown_rx = shutdown_rx.ok_or_else(|| anyhow::anyhow!("shutdown receiver is required"))?;

        let (chat_store, notification_store, users): (
            Arc<dyn ChatStore>,
            Arc<dyn NotificationStore>,
            Arc<dyn UserDirectory>,
        ) = if let Some(pool) = pool {
            (
                Arc::new(PgChatStore::new(pool.clone())),
                Arc::new(PgNotificationStore::new(pool.clone())),
                Arc::new(PgUserDirectory::new(pool)),
            )
        } else {
            tracing::warn!("No database configured, using the in-process store");
            let store = Arc::new(memory.unwrap_or_default());
            (
                Arc::clone(&store) as Arc<dyn ChatStore>,
                Arc::clone(&store) as Arc<dyn NotificationStore>,
                store as Arc<dyn UserDirectory>,
            )
        };

        let hub = Arc::new(RoomHub::new());
        let (sink, presence): (Arc<dyn EventSink>, Arc<dyn PresenceRegistry>) = match &pubsub {
            Some(redis) => {
                let sink = RedisEventSink::start(
                    Arc::clone(redis),
                    config.pubsub.pubsub_channel.clone(),
                    Arc::clone(&hub),
                    shutdown_rx.clone(),
                )
                .await?;
                (Arc::new(sink), Arc::new(RedisPresence::new(Arc::clone(redis), config.pubsub.presence_ttl_secs)))
            }
            None => (Arc::new(LocalEventSink::new(Arc::clone(&hub))), Arc::new(LocalPresence::new())),
        };
        let emitter = EventEmitter::new(sink);

        let (push, push_rx) = PushDispatcher::new(config.push.push_queue_capacity.max(1));
        let provider = push_provider.unwrap_or_else(|| Arc::new(LogPushProvider));

        let chat_service = ChatService::new(
            Arc::clone(&chat_store),
            Arc::clone(&users),
            emitter.clone(),
            push.clone(),
            config.chat.clone(),
        );
        let notification_service = NotificationService::new(
            notification_store,
            Arc::clone(&users),
            emitter.clone(),
            push,
            config.chat.max_page_size,
        );
        let gateway_service = GatewayService::new(
            chat_service.clone(),
            Arc::clone(&users),
            hub,
            emitter,
            presence,
            config.websocket.clone(),
        );
        let health_service = HealthService::new(Arc::clone(&chat_store), pubsub, config.health.clone());

        let workers = Workers {
            push_worker: PushWorker::new(push_rx, provider, config.push.push_concurrency),
            retention_worker: MessageRetentionWorker::new(chat_store, config.chat.clone()),
        };

        Ok(App {
            services: ServiceContainer {
                chat_service,
                notification_service: notification_service.clone(),
                gateway_service,
                rate_limit_service: RateLimitService::new(),
            },
            mgmt_state: MgmtState { health_service, notification_service, users },
            workers,
        })
    }
}
