use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::MultiplexedConnection};

use crate::config::Config;

/// TTL-bounded dedup window. Workers mark a notification id as processed
/// under their own key prefix before attempting delivery; redeliveries inside
/// the window are dropped.
#[async_trait]
pub trait DedupStore: Send + Sync {
    async fn seen(&self, prefix: &str, notification_id: &str) -> Result<bool, Error>;

    async fn mark_processed(&self, prefix: &str, notification_id: &str) -> Result<(), Error>;
}

pub struct RedisClient {
    connection: MultiplexedConnection,
    dedup_ttl_seconds: u64,
}

impl RedisClient {
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        println!("Connecting to Redis...");

        let client = Client::open(config.redis_url.as_str())
            .map_err(|_| anyhow!("Failed to create redis client"))?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|_| anyhow!("Failed to connect to redis client"))?;

        println!("Redis connection established");

        Ok(Self {
            connection,
            dedup_ttl_seconds: config.dedup_ttl_seconds,
        })
    }

    fn key(prefix: &str, notification_id: &str) -> String {
        format!("dedup:{}:{}", prefix, notification_id)
    }
}

#[async_trait]
impl DedupStore for RedisClient {
    async fn seen(&self, prefix: &str, notification_id: &str) -> Result<bool, Error> {
        let key = Self::key(prefix, notification_id);
        let mut connection = self.connection.clone();

        let value: Option<String> = connection
            .get(&key)
            .await
            .map_err(|e| anyhow!("Failed to read dedup key: {}", e))?;

        Ok(value.is_some())
    }

    async fn mark_processed(&self, prefix: &str, notification_id: &str) -> Result<(), Error> {
        let key = Self::key(prefix, notification_id);
        let mut connection = self.connection.clone();

        connection
            .set_ex::<_, _, ()>(&key, "processed", self.dedup_ttl_seconds)
            .await
            .map_err(|e| anyhow!("Failed to mark message as processed: {}", e))?;

        Ok(())
    }
}
