use std::{
    collections::{HashMap, HashSet},
    sync::atomic::{AtomicU32, Ordering},
};

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, header::HeaderMap};
use serde_json::{Value as JsonValue, json};
use tokio::sync::Mutex;

use delivery_service::{
    clients::{provider_config::ProviderCatalog, rbmq::MessagePublisher, redis::DedupStore},
    config::Config,
    models::{
        message::{ChannelMessage, NotificationMessage, RenderedTemplate},
        provider::{ChannelType, ProviderDescriptor},
    },
    providers::{NotificationProvider, ProviderCallResult, require_subject},
};

pub fn test_config() -> Config {
    Config {
        rabbitmq_url: "amqp://localhost:5672".to_string(),
        notification_queue_name: "notifications".to_string(),
        push_queue_name: "notifications.push".to_string(),
        email_queue_name: "notifications.email".to_string(),
        delivery_log_queue_name: "delivery.logs".to_string(),
        provider_audit_queue_name: "provider.audit".to_string(),
        prefetch_count: 10,
        redis_url: "redis://localhost:6379".to_string(),
        dedup_ttl_seconds: 120,
        provider_config_url: "http://localhost:8081".to_string(),
        fcm_project_id: "test-project".to_string(),
        expo_access_token: None,
        sendgrid_api_key: "SG.test-key".to_string(),
        postmark_server_token: "pm-test-token".to_string(),
        email_from_address: "noreply@example.com".to_string(),
        circuit_breaker_failure_threshold: 3,
        circuit_breaker_success_threshold: 2,
        circuit_breaker_timeout_ms: 60_000,
        circuit_breaker_half_open_max_calls: 2,
        circuit_breaker_overrides: None,
        max_retry_attempts: 3,
        initial_retry_delay_ms: 10,
        max_retry_delay_ms: 100,
        retry_backoff_multiplier: 2,
        dlq_replay_enabled: true,
        dlq_replay_delay_ms: 10,
        server_port: 8080,
    }
}

#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub queue: String,
    pub key: Option<String>,
    pub payload: Vec<u8>,
}

/// In-memory broker producer. Records every successful publish and can be
/// told to fail specific queues with a chosen error message.
pub struct MemoryPublisher {
    messages: Mutex<Vec<PublishedMessage>>,
    attempted: Mutex<Vec<String>>,
    failures: Mutex<HashMap<String, String>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            attempted: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
        }
    }

    pub async fn fail_queue(&self, queue: &str, error: &str) {
        self.failures
            .lock()
            .await
            .insert(queue.to_string(), error.to_string());
    }

    pub async fn published(&self) -> Vec<PublishedMessage> {
        self.messages.lock().await.clone()
    }

    pub async fn attempted_queues(&self) -> Vec<String> {
        self.attempted.lock().await.clone()
    }

    /// Successfully published payloads on one queue, parsed as JSON.
    pub async fn json_for(&self, queue: &str) -> Vec<JsonValue> {
        self.messages
            .lock()
            .await
            .iter()
            .filter(|m| m.queue == queue)
            .map(|m| serde_json::from_slice(&m.payload).expect("published payload is JSON"))
            .collect()
    }
}

#[async_trait]
impl MessagePublisher for MemoryPublisher {
    async fn publish(&self, queue: &str, key: Option<&str>, payload: Vec<u8>) -> Result<(), Error> {
        self.attempted.lock().await.push(queue.to_string());

        if let Some(error) = self.failures.lock().await.get(queue) {
            return Err(anyhow!("{}", error));
        }

        self.messages.lock().await.push(PublishedMessage {
            queue: queue.to_string(),
            key: key.map(|k| k.to_string()),
            payload,
        });

        Ok(())
    }
}

/// In-memory dedup window without TTL expiry; the tests never run long
/// enough for the window to matter.
pub struct MemoryDedupStore {
    seen: Mutex<HashSet<String>>,
}

impl MemoryDedupStore {
    pub fn new() -> Self {
        Self {
            seen: Mutex::new(HashSet::new()),
        }
    }
}

#[async_trait]
impl DedupStore for MemoryDedupStore {
    async fn seen(&self, prefix: &str, notification_id: &str) -> Result<bool, Error> {
        Ok(self
            .seen
            .lock()
            .await
            .contains(&format!("{}:{}", prefix, notification_id)))
    }

    async fn mark_processed(&self, prefix: &str, notification_id: &str) -> Result<(), Error> {
        self.seen
            .lock()
            .await
            .insert(format!("{}:{}", prefix, notification_id));
        Ok(())
    }
}

/// Fixed provider list per channel id, standing in for the external
/// configuration service.
pub struct StaticCatalog {
    providers: HashMap<String, Vec<ProviderDescriptor>>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    pub fn with_channel(mut self, channel_id: &str, names: &[&str]) -> Self {
        let descriptors = names
            .iter()
            .enumerate()
            .map(|(i, name)| ProviderDescriptor {
                provider_id: format!("prov_{}", name),
                name: name.to_string(),
                channel_id: channel_id.to_string(),
                priority: i as i32 + 1,
            })
            .collect();

        self.providers.insert(channel_id.to_string(), descriptors);
        self
    }
}

#[async_trait]
impl ProviderCatalog for StaticCatalog {
    async fn providers_for_channel(
        &self,
        channel_id: &str,
    ) -> Result<Vec<ProviderDescriptor>, Error> {
        Ok(self.providers.get(channel_id).cloned().unwrap_or_default())
    }
}

/// Scriptable provider: succeeds with a deterministic message id or always
/// fails with a fixed error. Counts executed calls.
pub struct StubProvider {
    name: String,
    channel: ChannelType,
    failure: Option<String>,
    calls: AtomicU32,
}

impl StubProvider {
    pub fn succeeding(name: &str, channel: ChannelType) -> Self {
        Self {
            name: name.to_string(),
            channel,
            failure: None,
            calls: AtomicU32::new(0),
        }
    }

    pub fn failing(name: &str, channel: ChannelType, error: &str) -> Self {
        Self {
            name: name.to_string(),
            channel,
            failure: Some(error.to_string()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationProvider for StubProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn channel(&self) -> ChannelType {
        self.channel
    }

    fn endpoint_url(&self, _message: &ChannelMessage) -> String {
        format!("http://localhost/{}", self.name)
    }

    fn build_request(&self, message: &ChannelMessage) -> Result<JsonValue, Error> {
        if self.channel == ChannelType::Email {
            require_subject(message)?;
        }

        Ok(json!({ "to": message.recipient }))
    }

    async fn build_headers(&self) -> Result<HeaderMap, Error> {
        Ok(HeaderMap::new())
    }

    async fn execute(
        &self,
        _http_client: &Client,
        _url: &str,
        _headers: HeaderMap,
        _body: &JsonValue,
    ) -> Result<ProviderCallResult, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        match &self.failure {
            Some(error) => Err(anyhow!("{}", error)),
            None => Ok(ProviderCallResult {
                message_id: Some(format!("{}-message-id", self.name)),
                response_body: "{}".to_string(),
            }),
        }
    }
}

pub fn channel_message(suffix: &str, channel: ChannelType) -> ChannelMessage {
    ChannelMessage {
        notification_id: format!("notif_{}", suffix),
        event_id: format!("event_{}", suffix),
        event_name: "user_signed_up".to_string(),
        channel_id: format!("channel_{}", channel.as_str()),
        channel_name: channel.as_str().to_string(),
        template_id: "tmpl_1".to_string(),
        template_name: "welcome".to_string(),
        subject: match channel {
            ChannelType::Push => None,
            ChannelType::Email => Some("Welcome aboard".to_string()),
        },
        content: "Hello and welcome".to_string(),
        recipient: match channel {
            ChannelType::Push => format!("device_token_{}", suffix),
            ChannelType::Email => format!("user_{}@example.com", suffix),
        },
        variables: HashMap::new(),
        metadata: None,
    }
}

pub fn rendered_template(channel_name: &str) -> RenderedTemplate {
    RenderedTemplate {
        channel_id: format!("channel_{}", channel_name),
        channel_name: channel_name.to_string(),
        template_id: "tmpl_1".to_string(),
        template_name: "welcome".to_string(),
        subject: if channel_name == "email" {
            Some("Welcome aboard".to_string())
        } else {
            None
        },
        content: "Hello and welcome".to_string(),
        recipient: format!("recipient_{}", channel_name),
    }
}

pub fn notification_message(suffix: &str, channel_names: &[&str]) -> NotificationMessage {
    NotificationMessage {
        notification_id: format!("notif_{}", suffix),
        event_id: format!("event_{}", suffix),
        event_name: "user_signed_up".to_string(),
        rendered_templates: channel_names.iter().map(|c| rendered_template(c)).collect(),
        data: HashMap::new(),
        metadata: HashMap::new(),
    }
}

/// Delivery-log entries with a given stage, for assertions over the log
/// queue contents.
pub fn logs_with_stage(logs: &[JsonValue], stage: &str) -> Vec<JsonValue> {
    logs.iter()
        .filter(|log| log["stage"] == stage)
        .cloned()
        .collect()
}
