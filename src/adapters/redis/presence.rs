use crate::adapters::redis::RedisClient;
use crate::error::{AppError, Result};
use crate::services::gateway::presence::PresenceRegistry;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

const KEY_PREFIX: &str = "snapbook:presence:";

fn key(user_id: Uuid) -> String {
    format!("{KEY_PREFIX}{user_id}")
}

/// A counter at or below zero after DECR means no session holds the key any more. Below
/// zero happens when the key expired while a session was still open.
const fn released_last(remaining: i64) -> bool {
    remaining <= 0
}

fn redis_error(e: &redis::RedisError) -> AppError {
    AppError::Internal(format!("presence store unavailable: {e}"))
}

/// Deployment-wide presence kept as one counter key per user.
///
/// The key expires after `ttl_secs` unless a live session refreshes it, so a crashed
/// instance cannot leave its users online forever.
#[derive(Debug, Clone)]
pub struct RedisPresence {
    redis: Arc<RedisClient>,
    ttl_secs: u64,
}

impl RedisPresence {
    #[must_use]
    pub const fn new(redis: Arc<RedisClient>, ttl_secs: u64) -> Self {
        Self { redis, ttl_secs }
    }
}

#[async_trait]
impl PresenceRegistry for RedisPresence {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn connect(&self, user_id: Uuid) -> Result<bool> {
        let mut conn = self.redis.commands();
        let (count,): (i64,) = redis::pipe()
            .atomic()
            .cmd("INCR")
            .arg(key(user_id))
            .cmd("EXPIRE")
            .arg(key(user_id))
            .arg(self.ttl_secs)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_error(&e))?;

        Ok(count == 1)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn disconnect(&self, user_id: Uuid) -> Result<bool> {
        let mut conn = self.redis.commands();
        let remaining: i64 =
            redis::cmd("DECR").arg(key(user_id)).query_async(&mut conn).await.map_err(|e| redis_error(&e))?;

        if !released_last(remaining) {
            return Ok(false);
        }
        let _: i64 = redis::cmd("DEL").arg(key(user_id)).query_async(&mut conn).await.map_err(|e| redis_error(&e))?;
        Ok(true)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn is_online(&self, user_id: Uuid) -> Result<bool> {
        let mut conn = self.redis.commands();
        let count: Option<i64> =
            redis::cmd("GET").arg(key(user_id)).query_async(&mut conn).await.map_err(|e| redis_error(&e))?;

        Ok(count.unwrap_or(0) > 0)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn refresh(&self, user_id: Uuid) -> Result<()> {
        let mut conn = self.redis.commands();
        let _: i64 = redis::cmd("EXPIRE")
            .arg(key(user_id))
            .arg(self.ttl_secs)
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_error(&e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_released_last() {
        assert!(released_last(0));
        assert!(released_last(-1), "an expired key still counts as the last session leaving");
        assert!(!released_last(1));
        assert!(!released_last(3));
    }

    #[test]
    fn test_key_is_namespaced() {
        let id = Uuid::nil();
        assert_eq!(key(id), "snapbook:presence:00000000-0000-0000-0000-000000000000");
    }
}
