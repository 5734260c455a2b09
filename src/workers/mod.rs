use std::{collections::HashMap, sync::Arc};

use anyhow::Error;
use serde_json::Value as JsonValue;
use tracing::warn;

use crate::{
    clients::{
        rbmq::{MessagePublisher, publish_to_dlq},
        redis::DedupStore,
    },
    config::Config,
    models::{
        delivery_log::DeliveryLog,
        message::{DlqError, DlqMessage},
    },
};

pub mod channel;
pub mod replay;
pub mod splitter;

/// Shared per-worker plumbing: the dedup gate and the delivery-log/DLQ
/// producers. Workers hold this by value and keep their pipeline logic in
/// their own types.
pub struct WorkerContext {
    pub publisher: Arc<dyn MessagePublisher>,
    pub dedup: Arc<dyn DedupStore>,
    delivery_log_queue: String,
    max_retry_attempts: u32,
}

impl WorkerContext {
    pub fn new(
        config: &Config,
        publisher: Arc<dyn MessagePublisher>,
        dedup: Arc<dyn DedupStore>,
    ) -> Self {
        Self {
            publisher,
            dedup,
            delivery_log_queue: config.delivery_log_queue_name.clone(),
            max_retry_attempts: config.max_retry_attempts,
        }
    }

    /// Dedup read. A cache failure counts as "not seen": at-least-once
    /// processing beats silently dropping a live notification.
    pub async fn is_duplicate(&self, prefix: &str, notification_id: &str) -> bool {
        match self.dedup.seen(prefix, notification_id).await {
            Ok(seen) => seen,
            Err(e) => {
                warn!(
                    notification_id,
                    error = %e,
                    "Dedup check failed, continuing with processing"
                );
                false
            }
        }
    }

    pub async fn mark_processed(&self, prefix: &str, notification_id: &str) {
        if let Err(e) = self.dedup.mark_processed(prefix, notification_id).await {
            warn!(
                notification_id,
                error = %e,
                "Failed to mark message as processed"
            );
        }
    }

    pub async fn emit_delivery_log(&self, log: DeliveryLog) {
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

    pub async fn emit_dlq(&self, message: DlqMessage) {
        if let Err(e) = publish_to_dlq(self.publisher.as_ref(), &message).await {
            warn!(
                original_topic = %message.original_topic,
                error = %e,
                "Failed to publish DLQ message"
            );
        }
    }

    /// Builds the DLQ envelope for a failed message. The original payload is
    /// kept as raw JSON so replay can republish it verbatim.
    pub fn dlq_message(
        &self,
        original_message: JsonValue,
        original_topic: &str,
        original_key: Option<&str>,
        error: &Error,
        error_type: &str,
        retry_count: u32,
        metadata: HashMap<String, JsonValue>,
    ) -> DlqMessage {
        DlqMessage {
            original_message,
            original_topic: original_topic.to_string(),
            original_key: original_key.map(|k| k.to_string()),
            error: DlqError::new(error.to_string(), error_type),
            retry_count,
            max_retries: self.max_retry_attempts,
            timestamp: crate::utils::now_rfc3339(),
            metadata,
        }
    }
}

/// Best-effort field recovery from a payload that failed typed parsing, so
/// even malformed-input logs carry whatever ids were present.
pub fn lenient_field(payload: &str, field: &str) -> String {
    serde_json::from_str::<JsonValue>(payload)
        .ok()
        .and_then(|v| v.get(field).and_then(|f| f.as_str()).map(|s| s.to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}
