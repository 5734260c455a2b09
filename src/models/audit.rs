use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::models::message::ChannelMessage;

/// Request/response audit record emitted for every admitted provider call.
/// `request` and `response` are string-encoded JSON so the record survives
/// providers with non-JSON response bodies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequestResponse {
    pub provider_request_id: String,
    pub notification_id: String,
    pub event_id: String,
    pub event_name: String,
    pub channel_id: String,
    pub channel_name: String,
    pub provider_name: String,
    pub request: String,
    pub request_header: JsonValue,
    pub response: String,
    pub timestamp: String,
    pub request_timestamp: String,
    pub response_timestamp: String,
}

impl ProviderRequestResponse {
    /// The provider request id doubles as the idempotency/join key across
    /// audit records, so it is always the notification id.
    pub fn new(message: &ChannelMessage, provider_name: String) -> Self {
        let now = crate::utils::now_rfc3339();

        Self {
            provider_request_id: message.notification_id.clone(),
            notification_id: message.notification_id.clone(),
            event_id: message.event_id.clone(),
            event_name: message.event_name.clone(),
            channel_id: message.channel_id.clone(),
            channel_name: message.channel_name.clone(),
            provider_name,
            request: String::new(),
            request_header: serde_json::json!({}),
            response: String::new(),
            timestamp: now.clone(),
            request_timestamp: now.clone(),
            response_timestamp: now,
        }
    }

    pub fn with_request(mut self, request: String, request_header: JsonValue) -> Self {
        self.request = request;
        self.request_header = request_header;
        self.request_timestamp = crate::utils::now_rfc3339();
        self
    }

    pub fn with_response(mut self, response: String) -> Self {
        self.response = response;
        self.response_timestamp = crate::utils::now_rfc3339();
        self
    }
}
