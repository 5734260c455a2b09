use anyhow::{Error, Result};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde_json::{Value as JsonValue, json};

use crate::{
    config::Config,
    models::{message::ChannelMessage, provider::ChannelType},
    providers::{NotificationProvider, require_subject},
};

/// SendGrid v3 email provider.
pub struct SendGridProvider {
    api_key: String,
    from_address: String,
}

impl SendGridProvider {
    pub fn new(config: &Config) -> Self {
        Self {
            api_key: config.sendgrid_api_key.clone(),
            from_address: config.email_from_address.clone(),
        }
    }
}

#[async_trait]
impl NotificationProvider for SendGridProvider {
    fn name(&self) -> &str {
        "sendgrid"
    }

    fn channel(&self) -> ChannelType {
        ChannelType::Email
    }

    fn endpoint_url(&self, _message: &ChannelMessage) -> String {
        "https://api.sendgrid.com/v3/mail/send".to_string()
    }

    fn build_request(&self, message: &ChannelMessage) -> Result<JsonValue, Error> {
        let subject = require_subject(message)?;

        Ok(json!({
            "personalizations": [{
                "to": [{ "email": message.recipient }],
            }],
            "from": { "email": self.from_address },
            "subject": subject,
            "content": [{
                "type": "text/html",
                "value": message.content,
            }],
            "custom_args": {
                "notification_id": message.notification_id,
            },
        }))
    }

    async fn build_headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))?,
        );

        Ok(headers)
    }
}
