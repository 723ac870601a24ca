use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

/// Per-user online tracking, counted across every connection the user has open.
#[async_trait]
pub trait PresenceRegistry: Send + Sync + std::fmt::Debug {
    /// Records one more connection for the user. Returns `true` if it is their first.
    async fn connect(&self, user_id: Uuid) -> Result<bool>;

    /// Drops one connection for the user. Returns `true` if it was their last.
    async fn disconnect(&self, user_id: Uuid) -> Result<bool>;

    async fn is_online(&self, user_id: Uuid) -> Result<bool>;

    /// Keeps the record of a live user from expiring.
    async fn refresh(&self, user_id: Uuid) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct LocalPresence {
    counts: DashMap<Uuid, usize>,
}

impl LocalPresence {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PresenceRegistry for LocalPresence {
    async fn connect(&self, user_id: Uuid) -> Result<bool> {
        let mut count = self.counts.entry(user_id).or_insert(0);
        *count += 1;
        Ok(*count == 1)
    }

    async fn disconnect(&self, user_id: Uuid) -> Result<bool> {
        match self.counts.entry(user_id) {
            Entry::Occupied(mut entry) => {
                if *entry.get() <= 1 {
                    entry.remove();
                    Ok(true)
                } else {
                    *entry.get_mut() -= 1;
                    Ok(false)
                }
            }
            Entry::Vacant(_) => Ok(false),
        }
    }

    async fn is_online(&self, user_id: Uuid) -> Result<bool> {
        Ok(self.counts.get(&user_id).is_some_and(|count| *count > 0))
    }

    async fn refresh(&self, _user_id: Uuid) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_and_last_connection() {
        let presence = LocalPresence::new();
        let user = Uuid::new_v4();

        assert!(presence.connect(user).await.unwrap());
        assert!(!presence.connect(user).await.unwrap());
        assert!(presence.is_online(user).await.unwrap());

        assert!(!presence.disconnect(user).await.unwrap());
        assert!(presence.is_online(user).await.unwrap());
        assert!(presence.disconnect(user).await.unwrap());
        assert!(!presence.is_online(user).await.unwrap());
    }

    #[tokio::test]
    async fn test_disconnect_without_connect() {
        let presence = LocalPresence::new();
        assert!(!presence.disconnect(Uuid::new_v4()).await.unwrap());
    }
}
