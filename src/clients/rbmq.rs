use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, Consumer,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
        QueueDeclareOptions,
    },
    types::FieldTable,
};

use crate::{config::Config, models::message::DlqMessage};

/// Producer seam used by workers and providers for every queue write. Lets
/// the pipeline run against an in-memory sink in tests.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// Publishes a JSON payload to a queue. `key` is the message key
    /// (notification id), carried in the broker message-id property.
    async fn publish(&self, queue: &str, key: Option<&str>, payload: Vec<u8>) -> Result<(), Error>;
}

pub struct RabbitMqClient {
    channel: Channel,
}

impl RabbitMqClient {
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        println!("Connecting to RabbitMQ...");

        let connection = Connection::connect(&config.rabbitmq_url, ConnectionProperties::default())
            .await
            .map_err(|_| anyhow!("Failed to connect to RabbitMQ"))?;

        println!("RabbitMQ connection established");

        let channel = connection
            .create_channel()
            .await
            .map_err(|_| anyhow!("RabbitMQ channel creation failed"))?;

        channel
            .basic_qos(config.prefetch_count, BasicQosOptions::default())
            .await
            .map_err(|_| anyhow!("Failed to set up QoS"))?;

        let client = Self { channel };

        for queue in [
            config.notification_queue_name.as_str(),
            config.push_queue_name.as_str(),
            config.email_queue_name.as_str(),
            config.delivery_log_queue_name.as_str(),
            config.provider_audit_queue_name.as_str(),
        ] {
            client.declare_queue(queue).await?;
        }

        // Retriable-origin queues each get a DLQ companion.
        for dlq in config.dlq_queue_names() {
            client.declare_queue(&dlq).await?;
        }

        println!("Queues declared");

        Ok(client)
    }

    async fn declare_queue(&self, queue: &str) -> Result<(), Error> {
        self.channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|_| anyhow!("Failed to declare queue {}", queue))?;

        Ok(())
    }

    pub async fn create_consumer(&self, queue: &str, consumer_tag: &str) -> Result<Consumer, Error> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|_| anyhow!("Failed to create consumer for {}", queue))?;

        Ok(consumer)
    }

    pub async fn acknowledge(&self, delivery_tag: u64) -> Result<(), Error> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await
            .map_err(|_| anyhow!("Failed to acknowledge message"))?;

        Ok(())
    }

}

#[async_trait]
impl MessagePublisher for RabbitMqClient {
    async fn publish(&self, queue: &str, key: Option<&str>, payload: Vec<u8>) -> Result<(), Error> {
        let mut properties = BasicProperties::default().with_delivery_mode(2);

        if let Some(key) = key {
            properties = properties.with_message_id(key.to_string().into());
        }

        self.channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                &payload,
                properties,
            )
            .await
            .map_err(|_| anyhow!("Failed to publish message to {}", queue))?;

        Ok(())
    }
}

/// Serializes a DLQ envelope and publishes it to the origin queue's DLQ.
pub async fn publish_to_dlq(
    publisher: &dyn MessagePublisher,
    message: &DlqMessage,
) -> Result<(), Error> {
    let payload = serde_json::to_vec(message)?;
    let dlq_queue = Config::dlq_queue_name(&message.original_topic);

    publisher
        .publish(&dlq_queue, message.original_key.as_deref(), payload)
        .await
}
