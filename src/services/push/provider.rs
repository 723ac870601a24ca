use crate::domain::push::PushNotification;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PushError {
    #[error("Provider rejected the notification: {0}")]
    Rejected(String),
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

#[async_trait]
pub trait PushProvider: Send + Sync + std::fmt::Debug {
    /// Sends a notification to every device registered under the external user id.
    ///
    /// # Errors
    /// Returns `PushError::Rejected` if the provider refused the request.
    /// Returns `PushError::Transport` if the provider could not be reached.
    async fn send(&self, external_user_id: &str, notification: &PushNotification) -> Result<(), PushError>;
}
