use crate::domain::push::PushNotification;
use crate::services::push::{PushError, PushProvider};
use async_trait::async_trait;

/// Used when no push provider is configured. Records the push in the log only.
#[derive(Debug, Default)]
pub struct LogPushProvider;

#[async_trait]
impl PushProvider for LogPushProvider {
    async fn send(&self, external_user_id: &str, notification: &PushNotification) -> Result<(), PushError> {
        tracing::info!(user = %external_user_id, title = %notification.title, "Push provider not configured, skipping push");
        Ok(())
    }
}
