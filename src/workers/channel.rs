use std::{collections::HashMap, sync::Arc};

use anyhow::{Error, Result, anyhow};
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use crate::{
    classifier,
    clients::{rbmq::MessagePublisher, redis::DedupStore},
    config::Config,
    models::{
        delivery_log::{DeliveryLog, DeliveryStage, DeliveryStatus},
        message::ChannelMessage,
        provider::ChannelType,
    },
    providers::directory::ProviderDirectory,
    workers::{WorkerContext, lenient_field},
};

/// Consumes one channel queue and drives the dedup → validate → failover
/// pipeline for each message. One instance per channel role (push, email).
pub struct ChannelWorker {
    channel: ChannelType,
    queue_name: String,
    dedup_prefix: String,
    directory: Arc<ProviderDirectory>,
    context: WorkerContext,
}

impl ChannelWorker {
    pub fn new(
        channel: ChannelType,
        config: &Config,
        directory: Arc<ProviderDirectory>,
        publisher: Arc<dyn MessagePublisher>,
        dedup: Arc<dyn DedupStore>,
    ) -> Self {
        Self {
            channel,
            queue_name: config.queue_for_channel(channel).to_string(),
            dedup_prefix: format!("{}_worker", channel.as_str()),
            directory,
            context: WorkerContext::new(config, publisher, dedup),
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Per-message entry point. Never propagates an error across the message
    /// boundary: every path ends in a delivery log, a DLQ entry, or a silent
    /// duplicate drop, and the caller always acks.
    pub async fn handle_message(&self, payload: &str) {
        if let Err(e) = self.process(payload).await {
            warn!(error = %e, "Channel worker pipeline failed unexpectedly, routing to DLQ");
            self.dlq_raw_payload(payload, &e, 0).await;
        }
    }

    async fn process(&self, payload: &str) -> Result<(), Error> {
        let message: ChannelMessage = match serde_json::from_str(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Discarding malformed channel message");

                self.context
                    .emit_delivery_log(
                        self.fallback_log(
                            payload,
                            DeliveryStage::ProcessingFailed,
                            DeliveryStatus::Failed,
                        )
                        .with_error(format!("Malformed channel message: {}", e)),
                    )
                    .await;

                return Ok(());
            }
        };

        if self
            .context
            .is_duplicate(&self.dedup_prefix, &message.notification_id)
            .await
        {
            info!(
                notification_id = %message.notification_id,
                "Duplicate channel message, skipping"
            );
            return Ok(());
        }

        // Marked before any provider attempt so broker redeliveries inside
        // the TTL window collapse even if this process dies mid-delivery.
        self.context
            .mark_processed(&self.dedup_prefix, &message.notification_id)
            .await;

        if let Err(e) = self.validate(&message) {
            self.context
                .emit_delivery_log(
                    DeliveryLog::for_channel_message(
                        &message,
                        DeliveryStage::ProcessingFailed,
                        DeliveryStatus::Failed,
                    )
                    .with_error(e.to_string()),
                )
                .await;

            info!(
                notification_id = %message.notification_id,
                error = %e,
                "Channel message failed validation"
            );
            return Ok(());
        }

        let candidates = self
            .directory
            .get_providers_for_channel(&message.channel_id)
            .await?;

        if candidates.is_empty() {
            let error = anyhow!("No providers configured for channel {}", message.channel_name);

            self.context
                .emit_delivery_log(
                    DeliveryLog::for_channel_message(
                        &message,
                        DeliveryStage::ProviderCalled,
                        DeliveryStatus::Failed,
                    )
                    .with_error(error.to_string()),
                )
                .await;

            // Still DLQ'd: an empty list can be config-cache staleness, and
            // replay after the cache refreshes will succeed.
            self.dlq_channel_message(&message, payload, &error, "ConfigurationError", 0)
                .await;

            return Ok(());
        }

        let mut attempts: u32 = 0;

        for descriptor in &candidates {
            let Some(provider) = self.directory.get_provider(&descriptor.name) else {
                warn!(
                    provider = %descriptor.name,
                    "Configured provider has no implementation, skipping"
                );
                continue;
            };

            if provider.channel() != self.channel {
                warn!(
                    provider = %descriptor.name,
                    provider_channel = provider.channel().as_str(),
                    "Configured provider serves a different channel, skipping"
                );
                continue;
            }

            attempts += 1;

            self.context
                .emit_delivery_log(
                    DeliveryLog::for_channel_message(
                        &message,
                        DeliveryStage::ProviderCalled,
                        DeliveryStatus::Pending,
                    )
                    .with_provider(descriptor.name.clone()),
                )
                .await;

            // Sequential failover: first success wins and later candidates
            // are never tried.
            match provider.send_notification(&message).await {
                Ok(response) => {
                    info!(
                        notification_id = %message.notification_id,
                        provider = %response.provider_name,
                        "Channel message delivered"
                    );
                    return Ok(());
                }
                Err(e) => {
                    if classifier::is_circuit_breaker_open(&e) {
                        self.context
                            .emit_delivery_log(
                                DeliveryLog::for_channel_message(
                                    &message,
                                    DeliveryStage::CircuitBreakerOpen,
                                    DeliveryStatus::Failed,
                                )
                                .with_provider(descriptor.name.clone())
                                .with_error(e.to_string()),
                            )
                            .await;
                    }

                    warn!(
                        notification_id = %message.notification_id,
                        provider = %descriptor.name,
                        error = %e,
                        "Provider attempt failed, trying next candidate"
                    );
                }
            }
        }

        let error = anyhow!("All providers failed");

        self.context
            .emit_delivery_log(
                DeliveryLog::for_channel_message(
                    &message,
                    DeliveryStage::ProviderFailed,
                    DeliveryStatus::Failed,
                )
                .with_error(error.to_string()),
            )
            .await;

        self.dlq_channel_message(&message, payload, &error, "ProviderError", attempts)
            .await;

        Ok(())
    }

    fn validate(&self, message: &ChannelMessage) -> Result<(), Error> {
        if message.recipient.is_empty() {
            return Err(anyhow!("Missing recipient for channel message"));
        }

        if self.channel == ChannelType::Email
            && message.subject.as_deref().unwrap_or("").is_empty()
        {
            return Err(anyhow!("Email subject is required"));
        }

        Ok(())
    }

    async fn dlq_channel_message(
        &self,
        message: &ChannelMessage,
        payload: &str,
        error: &Error,
        error_type: &str,
        retry_count: u32,
    ) {
        let original = serde_json::from_str::<JsonValue>(payload)
            .unwrap_or_else(|_| JsonValue::String(payload.to_string()));

        let mut metadata = HashMap::new();
        metadata.insert(
            "notification_id".to_string(),
            JsonValue::String(message.notification_id.clone()),
        );
        metadata.insert(
            "channel_name".to_string(),
            JsonValue::String(message.channel_name.clone()),
        );

        let dlq = self.context.dlq_message(
            original,
            &self.queue_name,
            Some(&message.notification_id),
            error,
            error_type,
            retry_count,
            metadata,
        );

        self.context.emit_dlq(dlq).await;
    }

    /// Outer-boundary capture for payloads that failed before a typed
    /// message existed.
    async fn dlq_raw_payload(&self, payload: &str, error: &Error, retry_count: u32) {
        let original = serde_json::from_str::<JsonValue>(payload)
            .unwrap_or_else(|_| JsonValue::String(payload.to_string()));

        let notification_id = lenient_field(payload, "notification_id");

        let mut metadata = HashMap::new();
        metadata.insert(
            "notification_id".to_string(),
            JsonValue::String(notification_id.clone()),
        );
        metadata.insert(
            "channel_name".to_string(),
            JsonValue::String(self.channel.as_str().to_string()),
        );

        let dlq = self.context.dlq_message(
            original,
            &self.queue_name,
            Some(&notification_id),
            error,
            "Error",
            retry_count,
            metadata,
        );

        self.context.emit_dlq(dlq).await;
    }

    fn fallback_log(
        &self,
        payload: &str,
        stage: DeliveryStage,
        status: DeliveryStatus,
    ) -> DeliveryLog {
        DeliveryLog::new(
            lenient_field(payload, "notification_id"),
            lenient_field(payload, "event_id"),
            lenient_field(payload, "event_name"),
            lenient_field(payload, "channel_id"),
            self.channel.as_str().to_string(),
            stage,
            status,
        )
    }
}
