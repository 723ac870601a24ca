use clap::{Args, Parser, ValueEnum};

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    #[command(flatten)]
    pub server: ServerConfig,

    #[command(flatten)]
    pub auth: AuthConfig,

    #[command(flatten)]
    pub database: DatabaseConfig,

    #[command(flatten)]
    pub pubsub: PubSubConfig,

    #[command(flatten)]
    pub rate_limit: RateLimitConfig,

    #[command(flatten)]
    pub chat: ChatConfig,

    #[command(flatten)]
    pub websocket: WsConfig,

    #[command(flatten)]
    pub push: PushConfig,

    #[command(flatten)]
    pub health: HealthConfig,

    #[command(flatten)]
    pub telemetry: TelemetryConfig,
}

#[derive(Clone, Debug, Args)]
pub struct ServerConfig {
    /// Host to listen on
    #[arg(long, env = "SNAPBOOK_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port for the public API and gateway
    #[arg(long, env = "SNAPBOOK_PORT", default_value_t = 5000)]
    pub port: u16,

    /// Port for health checks and internal event intake
    #[arg(long, env = "SNAPBOOK_MGMT_PORT", default_value_t = 9090)]
    pub mgmt_port: u16,

    /// Seconds to wait for background tasks after a shutdown signal
    #[arg(long, env = "SNAPBOOK_SHUTDOWN_TIMEOUT_SECS", default_value_t = 5)]
    pub shutdown_timeout_secs: u64,
}

#[derive(Clone, Debug, Args)]
pub struct AuthConfig {
    /// Secret used to verify access tokens issued by the account service
    #[arg(long, env = "SNAPBOOK_JWT_SECRET")]
    pub jwt_secret: String,
}

#[derive(Clone, Debug, Args)]
pub struct DatabaseConfig {
    /// Postgres connection URL. Without it the service runs on the in-process store.
    #[arg(long, env = "SNAPBOOK_DATABASE_URL")]
    pub database_url: Option<String>,

    #[arg(long, env = "SNAPBOOK_DB_MAX_CONNECTIONS", default_value_t = 20)]
    pub db_max_connections: u32,

    #[arg(long, env = "SNAPBOOK_DB_MIN_CONNECTIONS", default_value_t = 2)]
    pub db_min_connections: u32,

    #[arg(long, env = "SNAPBOOK_DB_ACQUIRE_TIMEOUT_SECS", default_value_t = 5)]
    pub db_acquire_timeout_secs: u64,
}

#[derive(Clone, Debug, Args)]
pub struct PubSubConfig {
    /// Redis URL. Enables cross-instance event fan-out and shared presence.
    #[arg(long, env = "SNAPBOOK_REDIS_URL")]
    pub redis_url: Option<String>,

    /// Channel every gateway instance publishes room events on
    #[arg(long, env = "SNAPBOOK_PUBSUB_CHANNEL", default_value = "snapbook:gateway")]
    pub pubsub_channel: String,

    #[arg(long, env = "SNAPBOOK_PUBSUB_MIN_BACKOFF_SECS", default_value_t = 1)]
    pub pubsub_min_backoff_secs: u64,

    #[arg(long, env = "SNAPBOOK_PUBSUB_MAX_BACKOFF_SECS", default_value_t = 30)]
    pub pubsub_max_backoff_secs: u64,

    /// Lifetime of a presence record that is not refreshed by a live session
    #[arg(long, env = "SNAPBOOK_PRESENCE_TTL_SECS", default_value_t = 90)]
    pub presence_ttl_secs: u64,
}

#[derive(Clone, Debug, Args)]
pub struct RateLimitConfig {
    /// Requests per second allowed per client IP
    #[arg(long, env = "SNAPBOOK_RATE_LIMIT_PER_SECOND", default_value_t = 20)]
    pub rate_limit_per_second: u32,

    /// Burst allowance per client IP
    #[arg(long, env = "SNAPBOOK_RATE_LIMIT_BURST", default_value_t = 50)]
    pub rate_limit_burst: u32,
}

#[derive(Clone, Debug, Args)]
pub struct ChatConfig {
    /// Page size for message history when the client sends none
    #[arg(long, env = "SNAPBOOK_DEFAULT_PAGE_SIZE", default_value_t = 50)]
    pub default_page_size: u32,

    /// Upper bound on a client-requested page size
    #[arg(long, env = "SNAPBOOK_MAX_PAGE_SIZE", default_value_t = 100)]
    pub max_page_size: u32,

    /// Maximum number of search hits returned
    #[arg(long, env = "SNAPBOOK_SEARCH_LIMIT", default_value_t = 50)]
    pub search_limit: u32,

    /// Hours a soft-deleted message is kept before the retention sweep removes it
    #[arg(long, env = "SNAPBOOK_DELETED_RETENTION_HOURS", default_value_t = 720)]
    pub deleted_retention_hours: i64,

    /// How often the retention sweep runs
    #[arg(long, env = "SNAPBOOK_CLEANUP_INTERVAL_SECS", default_value_t = 3600)]
    pub cleanup_interval_secs: u64,
}

#[derive(Clone, Debug, Args)]
pub struct WsConfig {
    /// Size of the per-connection outbound event buffer
    #[arg(long, env = "SNAPBOOK_WS_OUTBOUND_BUFFER_SIZE", default_value_t = 64)]
    pub ws_outbound_buffer_size: usize,

    /// How often a live session refreshes its presence record
    #[arg(long, env = "SNAPBOOK_WS_PRESENCE_REFRESH_SECS", default_value_t = 30)]
    pub ws_presence_refresh_secs: u64,
}

#[derive(Clone, Debug, Args)]
pub struct PushConfig {
    /// OneSignal application id. Push is logged only when unset.
    #[arg(long, env = "SNAPBOOK_ONESIGNAL_APP_ID")]
    pub onesignal_app_id: Option<String>,

    /// OneSignal REST API key
    #[arg(long, env = "SNAPBOOK_ONESIGNAL_API_KEY")]
    pub onesignal_api_key: Option<String>,

    #[arg(long, env = "SNAPBOOK_ONESIGNAL_API_URL", default_value = "https://onesignal.com/api/v1/notifications")]
    pub onesignal_api_url: String,

    /// Timeout for a single provider call
    #[arg(long, env = "SNAPBOOK_PUSH_TIMEOUT_SECS", default_value_t = 10)]
    pub push_timeout_secs: u64,

    /// Pending pushes held in memory before new ones are dropped
    #[arg(long, env = "SNAPBOOK_PUSH_QUEUE_CAPACITY", default_value_t = 1024)]
    pub push_queue_capacity: usize,

    /// Concurrent provider calls
    #[arg(long, env = "SNAPBOOK_PUSH_CONCURRENCY", default_value_t = 8)]
    pub push_concurrency: usize,
}

#[derive(Clone, Debug, Args)]
pub struct HealthConfig {
    /// Timeout for the database readiness check
    #[arg(long, env = "SNAPBOOK_HEALTH_DB_TIMEOUT_MS", default_value_t = 2000)]
    pub db_timeout_ms: u64,

    /// Timeout for the pubsub readiness check
    #[arg(long, env = "SNAPBOOK_HEALTH_PUBSUB_TIMEOUT_MS", default_value_t = 2000)]
    pub pubsub_timeout_ms: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug, Args)]
pub struct TelemetryConfig {
    /// OTLP gRPC endpoint for traces and metrics
    #[arg(long, env = "SNAPBOOK_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,

    #[arg(long, env = "SNAPBOOK_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Config {
    #[must_use]
    pub fn load() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_minimal_args() {
        let config = Config::try_parse_from(["snapbook-chat", "--jwt-secret", "s3cret"]).expect("config parses");
        assert_eq!(config.auth.jwt_secret, "s3cret");
        assert_eq!(config.chat.default_page_size, 50);
        assert_eq!(config.chat.search_limit, 50);
        assert_eq!(config.telemetry.log_format, LogFormat::Text);
    }

    #[test]
    fn test_log_format_json() {
        let config =
            Config::try_parse_from(["snapbook-chat", "--jwt-secret", "x", "--log-format", "json"]).expect("config parses");
        assert_eq!(config.telemetry.log_format, LogFormat::Json);
    }
}
