use std::sync::Arc;

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, header::HeaderMap};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use crate::{
    clients::{circuit_breaker::CircuitBreaker, rbmq::MessagePublisher},
    config::Config,
    models::{
        audit::ProviderRequestResponse,
        circuit_breaker::CircuitBreakerConfig,
        delivery_log::{DeliveryLog, DeliveryStage, DeliveryStatus},
        message::ChannelMessage,
        provider::{ChannelType, ProviderResponse},
    },
};

pub mod directory;
pub mod expo;
pub mod fcm;
pub mod postmark;
pub mod sendgrid;

/// Raw outcome of one provider HTTP call.
#[derive(Debug, Clone)]
pub struct ProviderCallResult {
    pub message_id: Option<String>,
    pub response_body: String,
}

/// Request shape of one concrete delivery provider. Implementations differ
/// only in endpoint, body, headers, and where the provider-side message id
/// lives in the response; the surrounding admission/audit flow is shared.
#[async_trait]
pub trait NotificationProvider: Send + Sync {
    fn name(&self) -> &str;

    fn channel(&self) -> ChannelType;

    fn endpoint_url(&self, message: &ChannelMessage) -> String;

    fn build_request(&self, message: &ChannelMessage) -> Result<JsonValue, Error>;

    async fn build_headers(&self) -> Result<HeaderMap, Error>;

    fn extract_message_id(&self, _response_body: &JsonValue) -> Option<String> {
        None
    }

    async fn execute(
        &self,
        http_client: &Client,
        url: &str,
        headers: HeaderMap,
        body: &JsonValue,
    ) -> Result<ProviderCallResult, Error> {
        let response = http_client
            .post(url)
            .headers(headers)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            let parsed = serde_json::from_str::<JsonValue>(&text).unwrap_or(JsonValue::Null);

            Ok(ProviderCallResult {
                message_id: self.extract_message_id(&parsed),
                response_body: text,
            })
        } else {
            Err(anyhow!(
                "{} request failed with status {}: {}",
                self.name(),
                status,
                text
            ))
        }
    }
}

/// A concrete provider composed with the shared circuit breaker and the
/// producer used for audit and delivery-log emission. All delivery attempts
/// go through `send_notification`.
pub struct Provider {
    inner: Arc<dyn NotificationProvider>,
    circuit_breaker: Arc<CircuitBreaker>,
    breaker_config: CircuitBreakerConfig,
    publisher: Arc<dyn MessagePublisher>,
    http_client: Client,
    audit_queue: String,
    delivery_log_queue: String,
}

impl Provider {
    pub fn new(
        inner: Arc<dyn NotificationProvider>,
        circuit_breaker: Arc<CircuitBreaker>,
        publisher: Arc<dyn MessagePublisher>,
        config: &Config,
    ) -> Self {
        let breaker_config = config.circuit_breaker_config_for(inner.name());

        Self {
            inner,
            circuit_breaker,
            breaker_config,
            publisher,
            http_client: Client::new(),
            audit_queue: config.provider_audit_queue_name.clone(),
            delivery_log_queue: config.delivery_log_queue_name.clone(),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn channel(&self) -> ChannelType {
        self.inner.channel()
    }

    /// Attempts one delivery. The breaker is consulted before anything else;
    /// a denial fails without writing any audit records. Admitted calls
    /// always leave behind one audit record, and successful ones also a
    /// `provider_success` delivery log.
    pub async fn send_notification(
        &self,
        message: &ChannelMessage,
    ) -> Result<ProviderResponse, Error> {
        let name = self.inner.name();

        if !self
            .circuit_breaker
            .should_allow_request(name, &self.breaker_config)
        {
            return Err(anyhow!("Circuit breaker is open for {}", name));
        }

        debug!(
            notification_id = %message.notification_id,
            provider = name,
            "Attempting provider delivery"
        );

        let body = self.inner.build_request(message)?;
        let headers = self.inner.build_headers().await?;

        let audit = ProviderRequestResponse::new(message, name.to_string())
            .with_request(body.to_string(), headers_to_json(&headers));

        let url = self.inner.endpoint_url(message);

        match self
            .inner
            .execute(&self.http_client, &url, headers, &body)
            .await
        {
            Ok(result) => {
                self.circuit_breaker
                    .record_success(name, &self.breaker_config);

                self.emit_audit(audit.with_response(result.response_body.clone()))
                    .await;

                let mut log = DeliveryLog::for_channel_message(
                    message,
                    DeliveryStage::ProviderSuccess,
                    DeliveryStatus::Success,
                )
                .with_provider(name.to_string());

                if let Some(message_id) = result.message_id.clone() {
                    log = log.with_message_id(message_id);
                }

                self.emit_delivery_log(log).await;

                info!(
                    notification_id = %message.notification_id,
                    provider = name,
                    "Notification delivered"
                );

                Ok(ProviderResponse {
                    success: true,
                    message_id: result.message_id,
                    provider_name: name.to_string(),
                    provider_request_id: message.notification_id.clone(),
                })
            }
            Err(e) => {
                self.circuit_breaker
                    .record_failure(name, &self.breaker_config);

                let error_body = serde_json::json!({ "error": e.to_string() }).to_string();
                self.emit_audit(audit.with_response(error_body)).await;

                Err(e)
            }
        }
    }

    async fn emit_audit(&self, audit: ProviderRequestResponse) {
        let payload = match serde_json::to_vec(&audit) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Failed to serialize provider audit record");
                return;
            }
        };

        if let Err(e) = self
            .publisher
            .publish(&self.audit_queue, Some(&audit.notification_id), payload)
            .await
        {
            warn!(error = %e, "Failed to publish provider audit record");
        }
    }

    async fn emit_delivery_log(&self, log: DeliveryLog) {
        let payload = match serde_json::to_vec(&log) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Failed to serialize delivery log");
                return;
            }
        };

        if let Err(e) = self
            .publisher
            .publish(&self.delivery_log_queue, Some(&log.notification_id), payload)
            .await
        {
            warn!(error = %e, "Failed to publish delivery log");
        }
    }
}

fn headers_to_json(headers: &HeaderMap) -> JsonValue {
    let map: serde_json::Map<String, JsonValue> = headers
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                JsonValue::String(value.to_str().unwrap_or("<binary>").to_string()),
            )
        })
        .collect();

    JsonValue::Object(map)
}

/// Push notifications carry the subject as title when one was rendered, the
/// event name otherwise.
pub fn push_title(message: &ChannelMessage) -> String {
    message
        .subject
        .clone()
        .unwrap_or_else(|| message.event_name.clone())
}

/// Email providers refuse to build a request without a subject.
pub fn require_subject(message: &ChannelMessage) -> Result<&str, Error> {
    message
        .subject
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow!("Email subject is required"))
}
