use std::{collections::HashMap, sync::Arc};

use anyhow::{Error, Result, anyhow};
use futures_util::future::join_all;
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use crate::{
    classifier,
    clients::{rbmq::MessagePublisher, redis::DedupStore},
    config::Config,
    models::{
        delivery_log::{DeliveryLog, DeliveryStage, DeliveryStatus},
        message::{ChannelMessage, NotificationMessage, RenderedTemplate},
        provider::ChannelType,
    },
    workers::{WorkerContext, lenient_field},
};

const DEDUP_PREFIX: &str = "splitter";

/// Consumes the unified notification queue and fans each notification out
/// into one channel-queue message per rendered template.
pub struct SplitterWorker {
    queue_name: String,
    push_queue: String,
    email_queue: String,
    context: WorkerContext,
}

impl SplitterWorker {
    pub fn new(
        config: &Config,
        publisher: Arc<dyn MessagePublisher>,
        dedup: Arc<dyn DedupStore>,
    ) -> Self {
        Self {
            queue_name: config.notification_queue_name.clone(),
            push_queue: config.push_queue_name.clone(),
            email_queue: config.email_queue_name.clone(),
            context: WorkerContext::new(config, publisher, dedup),
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Per-message entry point; never propagates an error to the consumer
    /// loop. Unexpected failures are classified: retriable ones DLQ the
    /// original notification, the rest commit with a failure log.
    pub async fn handle_message(&self, payload: &str) {
        if let Err(e) = self.process(payload).await {
            warn!(error = %e, "Splitter pipeline failed unexpectedly");

            if classifier::is_retriable(&e) {
                self.dlq_notification(payload, &e, "Error").await;
            } else {
                self.context
                    .emit_delivery_log(
                        self.fallback_log(payload).with_error(e.to_string()),
                    )
                    .await;
            }
        }
    }

    async fn process(&self, payload: &str) -> Result<(), Error> {
        let notification: NotificationMessage = match serde_json::from_str(payload) {
            Ok(notification) => notification,
            Err(e) => {
                warn!(error = %e, "Discarding malformed notification message");

                self.context
                    .emit_delivery_log(
                        self.fallback_log(payload)
                            .with_error(format!("Malformed notification message: {}", e)),
                    )
                    .await;

                return Ok(());
            }
        };

        if self
            .context
            .is_duplicate(DEDUP_PREFIX, &notification.notification_id)
            .await
        {
            info!(
                notification_id = %notification.notification_id,
                "Duplicate notification, skipping"
            );
            return Ok(());
        }

        self.context
            .mark_processed(DEDUP_PREFIX, &notification.notification_id)
            .await;

        if notification.rendered_templates.is_empty() {
            // Non-retriable: a notification with nothing to route will never
            // grow templates on redelivery.
            self.context
                .emit_delivery_log(
                    DeliveryLog::new(
                        notification.notification_id.clone(),
                        notification.event_id.clone(),
                        notification.event_name.clone(),
                        String::new(),
                        String::new(),
                        DeliveryStage::ProcessingFailed,
                        DeliveryStatus::Failed,
                    )
                    .with_error("Notification contains no rendered templates".to_string()),
                )
                .await;

            return Ok(());
        }

        // Fan-out is concurrent; there is no ordering requirement between
        // channels of one notification.
        let results = join_all(
            notification
                .rendered_templates
                .iter()
                .map(|template| self.route_template(&notification, template)),
        )
        .await;

        let failures: Vec<Error> = results.into_iter().filter_map(Result::err).collect();

        if failures.is_empty() {
            info!(
                notification_id = %notification.notification_id,
                channels = notification.rendered_templates.len(),
                "Notification routed to channel queues"
            );
            return Ok(());
        }

        if let Some(retriable) = failures.iter().find(|e| classifier::is_retriable(e)) {
            self.dlq_notification(payload, retriable, "RoutingError").await;
        } else {
            self.context
                .emit_delivery_log(
                    DeliveryLog::new(
                        notification.notification_id.clone(),
                        notification.event_id.clone(),
                        notification.event_name.clone(),
                        String::new(),
                        String::new(),
                        DeliveryStage::ProcessingFailed,
                        DeliveryStatus::Failed,
                    )
                    .with_error(
                        failures
                            .iter()
                            .map(|e| e.to_string())
                            .collect::<Vec<_>>()
                            .join("; "),
                    ),
                )
                .await;
        }

        Ok(())
    }

    /// Routes one rendered template to its channel queue. Failures are
    /// logged as `routed`/failed and returned without aborting siblings.
    async fn route_template(
        &self,
        notification: &NotificationMessage,
        template: &RenderedTemplate,
    ) -> Result<(), Error> {
        let outcome = self.publish_channel_message(notification, template).await;

        let mut log = DeliveryLog::new(
            notification.notification_id.clone(),
            notification.event_id.clone(),
            notification.event_name.clone(),
            template.channel_id.clone(),
            template.channel_name.clone(),
            DeliveryStage::Routed,
            match outcome {
                Ok(_) => DeliveryStatus::Pending,
                Err(_) => DeliveryStatus::Failed,
            },
        );

        if let Err(e) = &outcome {
            log = log.with_error(e.to_string());

            warn!(
                notification_id = %notification.notification_id,
                channel = %template.channel_name,
                error = %e,
                "Failed to route rendered template"
            );
        }

        self.context.emit_delivery_log(log).await;

        outcome
    }

    async fn publish_channel_message(
        &self,
        notification: &NotificationMessage,
        template: &RenderedTemplate,
    ) -> Result<(), Error> {
        let queue = match ChannelType::from_channel_name(&template.channel_name) {
            Some(ChannelType::Push) => &self.push_queue,
            Some(ChannelType::Email) => &self.email_queue,
            None => return Err(anyhow!("Unknown channel: {}", template.channel_name)),
        };

        let message = ChannelMessage::from_template(notification, template);
        let payload = serde_json::to_vec(&message)?;

        self.context
            .publisher
            .publish(queue, Some(&message.notification_id), payload)
            .await
    }

    async fn dlq_notification(&self, payload: &str, error: &Error, error_type: &str) {
        let original = serde_json::from_str::<JsonValue>(payload)
            .unwrap_or_else(|_| JsonValue::String(payload.to_string()));

        let notification_id = lenient_field(payload, "notification_id");

        let mut metadata = HashMap::new();
        metadata.insert(
            "notification_id".to_string(),
            JsonValue::String(notification_id.clone()),
        );

        let dlq = self.context.dlq_message(
            original,
            &self.queue_name,
            Some(&notification_id),
            error,
            error_type,
            0,
            metadata,
        );

        self.context.emit_dlq(dlq).await;
    }

    fn fallback_log(&self, payload: &str) -> DeliveryLog {
        DeliveryLog::new(
            lenient_field(payload, "notification_id"),
            lenient_field(payload, "event_id"),
            lenient_field(payload, "event_name"),
            String::new(),
            String::new(),
            DeliveryStage::ProcessingFailed,
            DeliveryStatus::Failed,
        )
    }
}
