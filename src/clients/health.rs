use std::{collections::HashMap, sync::Arc, time::Instant};

use chrono::Utc;
use redis::AsyncCommands;
use tracing::{debug, warn};

use crate::{
    clients::{circuit_breaker::CircuitBreaker, rbmq::RabbitMqClient},
    config::Config,
    models::{
        circuit_breaker::CircuitState,
        health::{HealthCheckResponse, HealthStatus, ServiceHealth},
    },
};

pub const KNOWN_PROVIDERS: &[&str] = &["fcm", "expo", "sendgrid", "postmark"];

pub struct HealthChecker {
    config: Config,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl HealthChecker {
    pub fn new(config: Config, circuit_breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            config,
            circuit_breaker,
        }
    }

    pub async fn check_all(&self) -> HealthCheckResponse {
        let mut checks = HashMap::new();

        let redis_health = self.check_redis().await;
        checks.insert("cache_service".to_string(), redis_health);

        let rabbitmq_health = self.check_rabbitmq().await;
        checks.insert("message_broker".to_string(), rabbitmq_health);

        for provider in KNOWN_PROVIDERS {
            let provider_health = self.check_circuit_breaker(provider);
            checks.insert(provider.to_string(), provider_health);
        }

        let overall_status = self.determine_overall_status(&checks);

        HealthCheckResponse {
            status: overall_status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
            checks,
        }
    }

    async fn check_redis(&self) -> ServiceHealth {
        let start = Instant::now();

        match redis::Client::open(self.config.redis_url.as_str()) {
            Ok(client) => match client.get_multiplexed_async_connection().await {
                Ok(mut conn) => match conn.ping::<String>().await {
                    Ok(_) => {
                        let elapsed = start.elapsed().as_millis() as u64;
                        debug!(response_time_ms = elapsed, "Redis health check passed");
                        ServiceHealth::healthy(elapsed)
                    }
                    Err(e) => {
                        warn!(error = %e, "Redis ping failed");
                        ServiceHealth::unhealthy(format!("Ping failed: {}", e))
                    }
                },
                Err(e) => {
                    warn!(error = %e, "Redis connection failed");
                    ServiceHealth::unhealthy(format!("Connection failed: {}", e))
                }
            },
            Err(e) => {
                warn!(error = %e, "Redis client creation failed");
                ServiceHealth::unhealthy(format!("Client creation failed: {}", e))
            }
        }
    }

    async fn check_rabbitmq(&self) -> ServiceHealth {
        let start = Instant::now();

        match RabbitMqClient::connect(&self.config).await {
            Ok(_) => {
                let elapsed = start.elapsed().as_millis() as u64;
                debug!(response_time_ms = elapsed, "RabbitMQ health check passed");
                ServiceHealth::healthy(elapsed)
            }
            Err(e) => {
                warn!(error = %e, "RabbitMQ connection failed");
                ServiceHealth::unhealthy(format!("Connection failed: {}", e))
            }
        }
    }

    fn check_circuit_breaker(&self, provider: &str) -> ServiceHealth {
        let state = self.circuit_breaker.get_state(provider);
        let state_str = state.as_str().to_string();

        debug!(
            provider,
            circuit_state = %state_str,
            "Circuit breaker state checked"
        );

        match state {
            CircuitState::Closed => ServiceHealth::healthy(0).with_circuit_breaker(state_str),
            CircuitState::HalfOpen => ServiceHealth {
                status: HealthStatus::Degraded,
                response_time_ms: None,
                circuit_breaker: Some(state_str),
                error: Some("Circuit breaker in recovery mode".to_string()),
            },
            CircuitState::Open => ServiceHealth::degraded_circuit_open(state_str),
        }
    }

    fn determine_overall_status(&self, checks: &HashMap<String, ServiceHealth>) -> HealthStatus {
        let has_unhealthy = checks
            .values()
            .any(|health| health.status == HealthStatus::Unhealthy);

        let has_degraded = checks
            .values()
            .any(|health| health.status == HealthStatus::Degraded);

        if has_unhealthy {
            HealthStatus::Unhealthy
        } else if has_degraded {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}
