use anyhow::{Error, Result};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde_json::{Value as JsonValue, json};

use crate::{
    config::Config,
    models::{message::ChannelMessage, provider::ChannelType},
    providers::{NotificationProvider, push_title},
};

/// Firebase Cloud Messaging (HTTP v1) push provider.
pub struct FcmProvider {
    fcm_project_id: String,
}

impl FcmProvider {
    pub fn new(config: &Config) -> Self {
        Self {
            fcm_project_id: config.fcm_project_id.clone(),
        }
    }
}

#[async_trait]
impl NotificationProvider for FcmProvider {
    fn name(&self) -> &str {
        "fcm"
    }

    fn channel(&self) -> ChannelType {
        ChannelType::Push
    }

    fn endpoint_url(&self, _message: &ChannelMessage) -> String {
        format!(
            "https://fcm.googleapis.com/v1/projects/{}/messages:send",
            self.fcm_project_id
        )
    }

    fn build_request(&self, message: &ChannelMessage) -> Result<JsonValue, Error> {
        Ok(json!({
            "message": {
                "token": message.recipient,
                "notification": {
                    "title": push_title(message),
                    "body": message.content,
                },
                "data": {
                    "notification_id": message.notification_id,
                },
            }
        }))
    }

    async fn build_headers(&self) -> Result<HeaderMap, Error> {
        let provider = gcp_auth::provider().await?;
        let scopes = &["https://www.googleapis.com/auth/firebase.messaging"];

        let token = provider.token(scopes).await?;

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token.as_str()))?,
        );

        Ok(headers)
    }

    fn extract_message_id(&self, response_body: &JsonValue) -> Option<String> {
        // v1 responses carry "projects/<id>/messages/<message-id>".
        response_body
            .get("name")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }
}
