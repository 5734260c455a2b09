use std::sync::Arc;

use anyhow::{Error, Result};
use futures_util::StreamExt;
use tracing::{info, warn};
use uuid::Uuid;

use delivery_service::{
    api::run_api_server,
    clients::{
        circuit_breaker::CircuitBreaker,
        rbmq::{MessagePublisher, RabbitMqClient},
        redis::{DedupStore, RedisClient},
    },
    config::Config,
    models::provider::ChannelType,
    providers::directory::ProviderDirectory,
    workers::channel::ChannelWorker,
};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::load()?;
    let instance_id = Uuid::new_v4();

    let rabbitmq = Arc::new(RabbitMqClient::connect(&config).await?);
    let publisher: Arc<dyn MessagePublisher> = rabbitmq.clone();

    let dedup: Arc<dyn DedupStore> = Arc::new(RedisClient::connect(&config).await?);

    let circuit_breaker = Arc::new(CircuitBreaker::new());

    let directory = Arc::new(ProviderDirectory::new(
        &config,
        Arc::clone(&circuit_breaker),
        Arc::clone(&publisher),
    )?);

    let worker = ChannelWorker::new(
        ChannelType::Email,
        &config,
        directory,
        Arc::clone(&publisher),
        dedup,
    );

    tokio::spawn(run_api_server(config.clone(), Arc::clone(&circuit_breaker)));

    let mut consumer = rabbitmq
        .create_consumer(worker.queue_name(), "email_worker")
        .await?;

    info!(queue = worker.queue_name(), instance = %instance_id, "Email worker started");

    loop {
        tokio::select! {
            delivery = consumer.next() => {
                match delivery {
                    Some(Ok(delivery)) => {
                        let payload = String::from_utf8_lossy(&delivery.data).to_string();
                        worker.handle_message(&payload).await;

                        if let Err(e) = rabbitmq.acknowledge(delivery.delivery_tag).await {
                            warn!(error = %e, "Failed to acknowledge message");
                        }
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Consumer delivery error");
                    }
                    None => {
                        warn!("Consumer stream closed, shutting down");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received, stopping email worker");
                break;
            }
        }
    }

    Ok(())
}
