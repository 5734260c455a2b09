use std::collections::HashMap;

use anyhow::{Error, Result, anyhow};
use dotenvy::dotenv;
use serde::Deserialize;
use tracing::warn;

use crate::models::{
    circuit_breaker::CircuitBreakerConfig, provider::ChannelType, retry::RetryConfig,
};

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    pub rabbitmq_url: String,
    pub notification_queue_name: String,
    pub push_queue_name: String,
    pub email_queue_name: String,
    pub delivery_log_queue_name: String,
    pub provider_audit_queue_name: String,
    pub prefetch_count: u16,

    pub redis_url: String,
    pub dedup_ttl_seconds: u64,

    pub provider_config_url: String,

    pub fcm_project_id: String,

    #[serde(default)]
    pub expo_access_token: Option<String>,

    pub sendgrid_api_key: String,
    pub postmark_server_token: String,
    pub email_from_address: String,

    pub circuit_breaker_failure_threshold: u32,
    pub circuit_breaker_success_threshold: u32,
    pub circuit_breaker_timeout_ms: u64,
    pub circuit_breaker_half_open_max_calls: u32,

    /// Optional JSON map of provider name to breaker config, overriding the
    /// defaults above for that provider only.
    #[serde(default)]
    pub circuit_breaker_overrides: Option<String>,

    pub max_retry_attempts: u32,
    pub initial_retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    pub retry_backoff_multiplier: u64,

    pub dlq_replay_enabled: bool,
    pub dlq_replay_delay_ms: u64,

    pub server_port: u16,
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        dotenv().ok();

        let config = envy::from_env::<Self>()
            .map_err(|_| anyhow!("Invalid or missing environmental variable"))?;
        Ok(config)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_retry_attempts,
            initial_delay_ms: self.initial_retry_delay_ms,
            max_delay_ms: self.max_retry_delay_ms,
            backoff_multiplier: self.retry_backoff_multiplier,
        }
    }

    pub fn circuit_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.circuit_breaker_failure_threshold,
            success_threshold: self.circuit_breaker_success_threshold,
            timeout_ms: self.circuit_breaker_timeout_ms,
            half_open_max_calls: self.circuit_breaker_half_open_max_calls,
        }
    }

    /// Breaker config for one provider: the per-provider override when one is
    /// configured, the shared defaults otherwise.
    pub fn circuit_breaker_config_for(&self, provider_name: &str) -> CircuitBreakerConfig {
        self.circuit_breaker_override_map()
            .remove(provider_name)
            .unwrap_or_else(|| self.circuit_breaker_config())
    }

    fn circuit_breaker_override_map(&self) -> HashMap<String, CircuitBreakerConfig> {
        let Some(raw) = self.circuit_breaker_overrides.as_deref() else {
            return HashMap::new();
        };

        match serde_json::from_str(raw) {
            Ok(map) => map,
            Err(e) => {
                warn!(error = %e, "Ignoring unparseable circuit breaker overrides");
                HashMap::new()
            }
        }
    }

    pub fn queue_for_channel(&self, channel: ChannelType) -> &str {
        match channel {
            ChannelType::Push => &self.push_queue_name,
            ChannelType::Email => &self.email_queue_name,
        }
    }

    pub fn dlq_queue_name(queue: &str) -> String {
        format!("{}.dlq", queue)
    }

    /// Every DLQ the replay worker drains: one per retriable-origin queue.
    pub fn dlq_queue_names(&self) -> Vec<String> {
        vec![
            Self::dlq_queue_name(&self.notification_queue_name),
            Self::dlq_queue_name(&self.push_queue_name),
            Self::dlq_queue_name(&self.email_queue_name),
        ]
    }
}
