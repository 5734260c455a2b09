use std::{collections::HashMap, sync::Arc};

use anyhow::{Error, Result};
use tracing::info;

use crate::{
    clients::{
        circuit_breaker::CircuitBreaker,
        provider_config::{ProviderCatalog, ProviderConfigClient},
        rbmq::MessagePublisher,
    },
    config::Config,
    models::provider::ProviderDescriptor,
    providers::{
        Provider, expo::ExpoProvider, fcm::FcmProvider, postmark::PostmarkProvider,
        sendgrid::SendGridProvider,
    },
};

/// Resolves failover candidates per channel and hands out the wired provider
/// instances. Every known provider implementation is constructed here, each
/// sharing the one circuit breaker registry and broker producer.
pub struct ProviderDirectory {
    catalog: Arc<dyn ProviderCatalog>,
    providers: HashMap<String, Arc<Provider>>,
}

impl ProviderDirectory {
    pub fn new(
        config: &Config,
        circuit_breaker: Arc<CircuitBreaker>,
        publisher: Arc<dyn MessagePublisher>,
    ) -> Result<Self, Error> {
        let catalog: Arc<dyn ProviderCatalog> = Arc::new(ProviderConfigClient::new(config)?);

        let providers = [
            Provider::new(
                Arc::new(FcmProvider::new(config)),
                Arc::clone(&circuit_breaker),
                Arc::clone(&publisher),
                config,
            ),
            Provider::new(
                Arc::new(ExpoProvider::new(config)),
                Arc::clone(&circuit_breaker),
                Arc::clone(&publisher),
                config,
            ),
            Provider::new(
                Arc::new(SendGridProvider::new(config)),
                Arc::clone(&circuit_breaker),
                Arc::clone(&publisher),
                config,
            ),
            Provider::new(
                Arc::new(PostmarkProvider::new(config)),
                Arc::clone(&circuit_breaker),
                Arc::clone(&publisher),
                config,
            ),
        ];

        let directory = Self::with_parts(catalog, providers.into_iter().map(Arc::new).collect());

        info!(
            providers = directory.providers.len(),
            "Provider directory initialized"
        );

        Ok(directory)
    }

    /// Wires a directory from pre-built parts. Production goes through
    /// `new`; tests supply their own catalog and providers.
    pub fn with_parts(catalog: Arc<dyn ProviderCatalog>, providers: Vec<Arc<Provider>>) -> Self {
        Self {
            catalog,
            providers: providers
                .into_iter()
                .map(|p| (p.name().to_string(), p))
                .collect(),
        }
    }

    /// Candidate descriptors for a channel, ascending priority. The list is
    /// owned by the external configuration service and may be empty.
    pub async fn get_providers_for_channel(
        &self,
        channel_id: &str,
    ) -> Result<Vec<ProviderDescriptor>, Error> {
        self.catalog.providers_for_channel(channel_id).await
    }

    pub fn get_provider(&self, name: &str) -> Option<Arc<Provider>> {
        self.providers.get(name).cloned()
    }
}
