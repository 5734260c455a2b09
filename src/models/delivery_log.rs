use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result};

use crate::models::message::ChannelMessage;

/// Pipeline stage a delivery log entry was emitted from. The wire strings are
/// consumed by downstream reporting and must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStage {
    Routed,
    ProviderCalled,
    ProviderSuccess,
    ProviderFailed,
    ProcessingFailed,
    CircuitBreakerOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Success,
    Failed,
}

impl Display for DeliveryStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            DeliveryStage::Routed => write!(f, "routed"),
            DeliveryStage::ProviderCalled => write!(f, "provider_called"),
            DeliveryStage::ProviderSuccess => write!(f, "provider_success"),
            DeliveryStage::ProviderFailed => write!(f, "provider_failed"),
            DeliveryStage::ProcessingFailed => write!(f, "processing_failed"),
            DeliveryStage::CircuitBreakerOpen => write!(f, "circuit_breaker_open"),
        }
    }
}

impl Display for DeliveryStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            DeliveryStatus::Pending => write!(f, "pending"),
            DeliveryStatus::Success => write!(f, "success"),
            DeliveryStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Append-only audit trail entry, one per pipeline transition. Never mutated
/// after publish.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryLog {
    pub notification_id: String,
    pub event_id: String,
    pub event_name: String,
    pub channel_id: String,
    pub channel_name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_name: Option<String>,

    pub stage: DeliveryStage,
    pub status: DeliveryStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,

    pub timestamp: String,
}

impl DeliveryLog {
    pub fn new(
        notification_id: String,
        event_id: String,
        event_name: String,
        channel_id: String,
        channel_name: String,
        stage: DeliveryStage,
        status: DeliveryStatus,
    ) -> Self {
        Self {
            notification_id,
            event_id,
            event_name,
            channel_id,
            channel_name,
            provider_name: None,
            stage,
            status,
            error_message: None,
            message_id: None,
            timestamp: crate::utils::now_rfc3339(),
        }
    }

    pub fn for_channel_message(
        message: &ChannelMessage,
        stage: DeliveryStage,
        status: DeliveryStatus,
    ) -> Self {
        Self::new(
            message.notification_id.clone(),
            message.event_id.clone(),
            message.event_name.clone(),
            message.channel_id.clone(),
            message.channel_name.clone(),
            stage,
            status,
        )
    }

    pub fn with_provider(mut self, provider_name: String) -> Self {
        self.provider_name = Some(provider_name);
        self
    }

    pub fn with_error(mut self, error: String) -> Self {
        self.error_message = Some(error);
        self
    }

    pub fn with_message_id(mut self, message_id: String) -> Self {
        self.message_id = Some(message_id);
        self
    }
}
