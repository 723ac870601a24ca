use crate::config::PushConfig;
use crate::domain::push::PushNotification;
use crate::services::push::{PushError, PushProvider};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct Localized<'a> {
    en: &'a str,
    ar: &'a str,
}

impl<'a> Localized<'a> {
    const fn same(text: &'a str) -> Self {
        Self { en: text, ar: text }
    }
}

#[derive(Debug, Serialize)]
struct CreateNotification<'a> {
    app_id: &'a str,
    include_external_user_ids: [&'a str; 1],
    headings: Localized<'a>,
    contents: Localized<'a>,
    data: &'a serde_json::Value,
    small_icon: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    large_icon: Option<&'a str>,
    #[serde(rename = "ios_badgeType")]
    ios_badge_type: &'static str,
    #[serde(rename = "ios_badgeCount")]
    ios_badge_count: u32,
    priority: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    android_accent_color: Option<&'a str>,
}

/// Delivers pushes through the OneSignal REST API, targeting external user ids.
#[derive(Debug, Clone)]
pub struct OneSignalProvider {
    client: reqwest::Client,
    api_url: String,
    app_id: String,
    api_key: String,
}

impl OneSignalProvider {
    /// Builds the provider when both the app id and the REST key are configured.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &PushConfig) -> anyhow::Result<Option<Self>> {
        let (Some(app_id), Some(api_key)) = (&config.onesignal_app_id, &config.onesignal_api_key) else {
            return Ok(None);
        };

        let client = reqwest::Client::builder().timeout(Duration::from_secs(config.push_timeout_secs)).build()?;

        Ok(Some(Self {
            client,
            api_url: config.onesignal_api_url.clone(),
            app_id: app_id.clone(),
            api_key: api_key.clone(),
        }))
    }

    fn body<'a>(&'a self, external_user_id: &'a str, notification: &'a PushNotification) -> CreateNotification<'a> {
        CreateNotification {
            app_id: &self.app_id,
            include_external_user_ids: [external_user_id],
            headings: Localized::same(&notification.title),
            contents: Localized::same(&notification.body),
            data: &notification.data,
            small_icon: "ic_stat_onesignal_default",
            large_icon: notification.large_icon.as_deref(),
            ios_badge_type: "Increase",
            ios_badge_count: 1,
            priority: notification.priority,
            android_accent_color: notification.accent_color.as_deref(),
        }
    }
}

#[async_trait]
impl PushProvider for OneSignalProvider {
    #[tracing::instrument(level = "debug", skip(self, notification), fields(user = %external_user_id))]
    async fn send(&self, external_user_id: &str, notification: &PushNotification) -> Result<(), PushError> {
        let response = self
            .client
            .post(&self.api_url)
            .header(reqwest::header::AUTHORIZATION, format!("Basic {}", self.api_key))
            .json(&self.body(external_user_id, notification))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let detail = response.text().await.unwrap_or_default();
        Err(PushError::Rejected(format!("{status}: {detail}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider() -> OneSignalProvider {
        OneSignalProvider {
            client: reqwest::Client::new(),
            api_url: "http://localhost/notifications".into(),
            app_id: "app".into(),
            api_key: "key".into(),
        }
    }

    #[test]
    fn test_request_body_shape() {
        let provider = provider();
        let push = PushNotification::new("Lina", "📷 صورة", json!({"screen": "chat"}))
            .with_large_icon(Some("https://cdn/a.png".into()))
            .with_accent_color("FF9C27B0");

        let body = serde_json::to_value(provider.body("user-1", &push)).unwrap();
        assert_eq!(body["app_id"], "app");
        assert_eq!(body["include_external_user_ids"], json!(["user-1"]));
        assert_eq!(body["headings"], json!({"en": "Lina", "ar": "Lina"}));
        assert_eq!(body["contents"]["ar"], "📷 صورة");
        assert_eq!(body["data"]["screen"], "chat");
        assert_eq!(body["ios_badgeType"], "Increase");
        assert_eq!(body["priority"], 10);
        assert_eq!(body["large_icon"], "https://cdn/a.png");
        assert_eq!(body["android_accent_color"], "FF9C27B0");
    }

    #[test]
    fn test_unconfigured_provider_is_none() {
        let config = PushConfig {
            onesignal_app_id: Some("app".into()),
            onesignal_api_key: None,
            onesignal_api_url: "http://localhost".into(),
            push_timeout_secs: 5,
            push_queue_capacity: 16,
            push_concurrency: 2,
        };
        assert!(OneSignalProvider::from_config(&config).unwrap().is_none());
    }
}
