use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::{
    config::Config,
    models::{provider::ProviderDescriptor, retry::RetryConfig},
    utils::retry_with_backoff,
};

/// Read-only view of the provider-by-channel configuration owned by the
/// external configuration service.
#[async_trait]
pub trait ProviderCatalog: Send + Sync {
    /// Candidate providers for a channel, ordered ascending by priority
    /// (failover order). An empty list is a valid answer.
    async fn providers_for_channel(
        &self,
        channel_id: &str,
    ) -> Result<Vec<ProviderDescriptor>, Error>;
}

pub struct ProviderConfigClient {
    http_client: Client,
    base_url: String,
    retry_config: RetryConfig,
}

impl ProviderConfigClient {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|_| anyhow!("Failed to create HTTP client"))?;

        Ok(Self {
            http_client,
            base_url: config.provider_config_url.clone(),
            retry_config: config.retry_config(),
        })
    }
}

#[async_trait]
impl ProviderCatalog for ProviderConfigClient {
    async fn providers_for_channel(
        &self,
        channel_id: &str,
    ) -> Result<Vec<ProviderDescriptor>, Error> {
        let url = format!("{}/api/v1/channels/{}/providers", self.base_url, channel_id);

        debug!(channel_id, "Fetching provider list from config service");

        let mut providers = retry_with_backoff(&self.retry_config, || {
            let url = url.clone();
            let client = self.http_client.clone();

            async move {
                let response = client.get(&url).send().await.map_err(|e| e.to_string())?;

                let status = response.status();

                if status.is_success() {
                    response
                        .json::<Vec<ProviderDescriptor>>()
                        .await
                        .map_err(|e| format!("Failed to parse provider list JSON: {}", e))
                } else {
                    Err(format!("Provider config service returned status {}", status))
                }
            }
        })
        .await
        .map_err(|e| anyhow!("Failed to fetch provider list: {}", e))?;

        providers.sort_by_key(|p| p.priority);

        Ok(providers)
    }
}
