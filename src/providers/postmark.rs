use anyhow::{Error, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{Value as JsonValue, json};

use crate::{
    config::Config,
    models::{message::ChannelMessage, provider::ChannelType},
    providers::{NotificationProvider, require_subject},
};

/// Postmark email provider.
pub struct PostmarkProvider {
    server_token: String,
    from_address: String,
}

impl PostmarkProvider {
    pub fn new(config: &Config) -> Self {
        Self {
            server_token: config.postmark_server_token.clone(),
            from_address: config.email_from_address.clone(),
        }
    }
}

#[async_trait]
impl NotificationProvider for PostmarkProvider {
    fn name(&self) -> &str {
        "postmark"
    }

    fn channel(&self) -> ChannelType {
        ChannelType::Email
    }

    fn endpoint_url(&self, _message: &ChannelMessage) -> String {
        "https://api.postmarkapp.com/email".to_string()
    }

    fn build_request(&self, message: &ChannelMessage) -> Result<JsonValue, Error> {
        let subject = require_subject(message)?;

        Ok(json!({
            "From": self.from_address,
            "To": message.recipient,
            "Subject": subject,
            "HtmlBody": message.content,
            "Metadata": {
                "notification_id": message.notification_id,
            },
        }))
    }

    async fn build_headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("x-postmark-server-token"),
            HeaderValue::from_str(&self.server_token)?,
        );

        Ok(headers)
    }

    fn extract_message_id(&self, response_body: &JsonValue) -> Option<String> {
        response_body
            .get("MessageID")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }
}
