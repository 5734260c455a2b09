use std::sync::Arc;

use tokio::time::{Duration, sleep};
use tracing::{info, warn};

use crate::{clients::rbmq::MessagePublisher, config::Config, models::message::DlqMessage};

/// Drains the DLQ queues and republishes each captured message to its
/// original queue after a fixed delay. Replay is best-effort and
/// single-shot: a failed republish is logged and the entry is dropped.
pub struct DlqReplayWorker {
    publisher: Arc<dyn MessagePublisher>,
    replay_delay: Duration,
}

impl DlqReplayWorker {
    pub fn new(config: &Config, publisher: Arc<dyn MessagePublisher>) -> Self {
        Self {
            publisher,
            replay_delay: Duration::from_millis(config.dlq_replay_delay_ms),
        }
    }

    pub async fn handle_message(&self, payload: &str) {
        let dlq: DlqMessage = match serde_json::from_str(payload) {
            Ok(dlq) => dlq,
            Err(e) => {
                warn!(error = %e, "Discarding malformed DLQ message");
                return;
            }
        };

        // Fixed pause between capture and replay so a burst of failures does
        // not turn into a retry storm against a recovering dependency.
        sleep(self.replay_delay).await;

        self.replay(&dlq).await;
    }

    async fn replay(&self, dlq: &DlqMessage) {
        let payload = match serde_json::to_vec(&dlq.original_message) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Failed to serialize DLQ original message, dropping");
                return;
            }
        };

        match self
            .publisher
            .publish(&dlq.original_topic, dlq.original_key.as_deref(), payload)
            .await
        {
            Ok(()) => {
                info!(
                    original_topic = %dlq.original_topic,
                    original_key = ?dlq.original_key,
                    failed_with = %dlq.error.message,
                    "Replayed DLQ message to original queue"
                );
            }
            Err(e) => {
                warn!(
                    original_topic = %dlq.original_topic,
                    error = %e,
                    "Failed to replay DLQ message, dropping"
                );
            }
        }
    }
}
