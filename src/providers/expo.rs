use anyhow::{Error, Result};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde_json::{Value as JsonValue, json};

use crate::{
    config::Config,
    models::{message::ChannelMessage, provider::ChannelType},
    providers::{NotificationProvider, push_title},
};

/// Expo push provider. The access token is optional; unauthenticated sends
/// work for projects without enforced push security.
pub struct ExpoProvider {
    access_token: Option<String>,
}

impl ExpoProvider {
    pub fn new(config: &Config) -> Self {
        Self {
            access_token: config.expo_access_token.clone(),
        }
    }
}

#[async_trait]
impl NotificationProvider for ExpoProvider {
    fn name(&self) -> &str {
        "expo"
    }

    fn channel(&self) -> ChannelType {
        ChannelType::Push
    }

    fn endpoint_url(&self, _message: &ChannelMessage) -> String {
        "https://exp.host/--/api/v2/push/send".to_string()
    }

    fn build_request(&self, message: &ChannelMessage) -> Result<JsonValue, Error> {
        Ok(json!({
            "to": message.recipient,
            "title": push_title(message),
            "body": message.content,
            "data": {
                "notification_id": message.notification_id,
            },
        }))
    }

    async fn build_headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();

        if let Some(token) = &self.access_token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token))?,
            );
        }

        Ok(headers)
    }

    fn extract_message_id(&self, response_body: &JsonValue) -> Option<String> {
        response_body
            .pointer("/data/id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }
}
