use std::sync::Arc;

use anyhow::{Error, Result};
use futures_util::{StreamExt, stream::select_all};
use tracing::{info, warn};
use uuid::Uuid;

use delivery_service::{
    api::run_api_server,
    clients::{
        circuit_breaker::CircuitBreaker,
        rbmq::{MessagePublisher, RabbitMqClient},
    },
    config::Config,
    workers::replay::DlqReplayWorker,
};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::load()?;
    let instance_id = Uuid::new_v4();

    if !config.dlq_replay_enabled {
        info!("DLQ replay is disabled, exiting");
        return Ok(());
    }

    let rabbitmq = Arc::new(RabbitMqClient::connect(&config).await?);
    let publisher: Arc<dyn MessagePublisher> = rabbitmq.clone();

    let circuit_breaker = Arc::new(CircuitBreaker::new());

    let worker = DlqReplayWorker::new(&config, Arc::clone(&publisher));

    tokio::spawn(run_api_server(config.clone(), Arc::clone(&circuit_breaker)));

    // One merged consumer over every DLQ this deployment knows about.
    let mut consumers = Vec::new();

    for queue in config.dlq_queue_names() {
        // Consumer tags must be unique per channel, so each DLQ gets its own.
        let consumer_tag = format!("dlq_replay_worker.{}", queue);
        let consumer = rabbitmq.create_consumer(&queue, &consumer_tag).await?;
        info!(queue = %queue, "DLQ replay worker consuming");
        consumers.push(consumer);
    }

    let mut merged = select_all(consumers);

    info!(instance = %instance_id, "DLQ replay worker started");

    loop {
        tokio::select! {
            delivery = merged.next() => {
                match delivery {
                    Some(Ok(delivery)) => {
                        let payload = String::from_utf8_lossy(&delivery.data).to_string();
                        worker.handle_message(&payload).await;

                        if let Err(e) = rabbitmq.acknowledge(delivery.delivery_tag).await {
                            warn!(error = %e, "Failed to acknowledge DLQ message");
                        }
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Consumer delivery error");
                    }
                    None => {
                        warn!("DLQ consumer streams closed, shutting down");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received, stopping DLQ replay worker");
                break;
            }
        }
    }

    Ok(())
}
