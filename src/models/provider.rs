use serde::{Deserialize, Serialize};

/// Delivery medium a provider serves. Fixed per provider implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Push,
    Email,
}

impl ChannelType {
    pub fn as_str(&self) -> &str {
        match self {
            ChannelType::Push => "push",
            ChannelType::Email => "email",
        }
    }

    pub fn from_channel_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "push" => Some(ChannelType::Push),
            "email" => Some(ChannelType::Email),
            _ => None,
        }
    }
}

/// Provider entry as served by the provider-configuration service. Ascending
/// priority defines failover order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub provider_id: String,
    pub name: String,
    pub channel_id: String,
    pub priority: i32,
}

/// Outcome of a successful provider call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,

    pub provider_name: String,
    pub provider_request_id: String,
}
