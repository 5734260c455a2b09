use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A fully rendered notification as produced by the ingress side. Consumed
/// exactly once by the splitter worker, which fans it out per channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub notification_id: String,
    pub event_id: String,
    pub event_name: String,
    pub rendered_templates: Vec<RenderedTemplate>,

    #[serde(default)]
    pub data: HashMap<String, JsonValue>,

    #[serde(default)]
    pub metadata: HashMap<String, JsonValue>,
}

/// One rendered template per targeted channel. Content and recipient are
/// already resolved upstream; the pipeline never re-renders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderedTemplate {
    pub channel_id: String,
    pub channel_name: String,
    pub template_id: String,
    pub template_name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    pub content: String,
    pub recipient: String,
}

/// Per-channel delivery unit, one per rendered template. Created by the
/// splitter worker and consumed by the matching channel worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub notification_id: String,
    pub event_id: String,
    pub event_name: String,
    pub channel_id: String,
    pub channel_name: String,
    pub template_id: String,
    pub template_name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    pub content: String,
    pub recipient: String,

    #[serde(default)]
    pub variables: HashMap<String, JsonValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, JsonValue>>,
}

impl ChannelMessage {
    pub fn from_template(notification: &NotificationMessage, template: &RenderedTemplate) -> Self {
        Self {
            notification_id: notification.notification_id.clone(),
            event_id: notification.event_id.clone(),
            event_name: notification.event_name.clone(),
            channel_id: template.channel_id.clone(),
            channel_name: template.channel_name.clone(),
            template_id: template.template_id.clone(),
            template_name: template.template_name.clone(),
            subject: template.subject.clone(),
            content: template.content.clone(),
            recipient: template.recipient.clone(),
            variables: notification.data.clone(),
            metadata: if notification.metadata.is_empty() {
                None
            } else {
                Some(notification.metadata.clone())
            },
        }
    }
}

/// Dead-letter envelope. The original payload is kept as raw JSON so replay
/// republishes it verbatim, whatever its shape was.
///
/// Field names are camelCase on the wire; DLQ tooling downstream consumes
/// this envelope as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DlqMessage {
    pub original_message: JsonValue,
    pub original_topic: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_key: Option<String>,

    pub error: DlqError,
    pub retry_count: u32,
    pub max_retries: u32,
    pub timestamp: String,

    #[serde(default)]
    pub metadata: HashMap<String, JsonValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqError {
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,

    #[serde(rename = "type")]
    pub error_type: String,
}

impl DlqError {
    pub fn new(message: impl Into<String>, error_type: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
            error_type: error_type.into(),
        }
    }
}
