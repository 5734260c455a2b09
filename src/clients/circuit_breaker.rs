use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use tracing::{debug, info, warn};

use crate::models::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState};

/// Admission and transition policy for one breaker. Injectable so a provider
/// can be given bespoke behavior; `ConsecutiveFailureStrategy` is the default.
pub trait BreakerStrategy: Send + Sync {
    fn should_allow(&self, metrics: &CircuitBreakerMetrics, config: &CircuitBreakerConfig) -> bool;

    fn on_success(&self, metrics: &mut CircuitBreakerMetrics, config: &CircuitBreakerConfig);

    fn on_failure(&self, metrics: &mut CircuitBreakerMetrics, config: &CircuitBreakerConfig);
}

/// Default policy: open after `failure_threshold` consecutive failures while
/// closed, admit a bounded trial budget while half-open, close again after
/// `success_threshold` trial successes. Any half-open failure reopens.
pub struct ConsecutiveFailureStrategy;

impl BreakerStrategy for ConsecutiveFailureStrategy {
    fn should_allow(&self, metrics: &CircuitBreakerMetrics, config: &CircuitBreakerConfig) -> bool {
        match metrics.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            // Trial-call budget, not a concurrency limiter; concurrent checks
            // can over-admit.
            CircuitState::HalfOpen => {
                metrics.success_count + metrics.failure_count < config.half_open_max_calls
            }
        }
    }

    fn on_success(&self, metrics: &mut CircuitBreakerMetrics, config: &CircuitBreakerConfig) {
        match metrics.state {
            CircuitState::Closed => {
                metrics.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                metrics.success_count += 1;

                if metrics.success_count >= config.success_threshold {
                    metrics.state = CircuitState::Closed;
                    metrics.last_state_change = Instant::now();
                    metrics.failure_count = 0;
                    metrics.success_count = 0;
                    info!("Circuit breaker closed after successful recovery");
                }
            }
            // A call admitted before the breaker opened can still land here.
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self, metrics: &mut CircuitBreakerMetrics, config: &CircuitBreakerConfig) {
        metrics.last_failure_time = Some(Instant::now());

        match metrics.state {
            CircuitState::Closed => {
                metrics.failure_count += 1;

                if metrics.failure_count >= config.failure_threshold {
                    metrics.state = CircuitState::Open;
                    metrics.last_state_change = Instant::now();
                    warn!(
                        failures = metrics.failure_count,
                        "Circuit breaker opened due to consecutive failures"
                    );
                }
            }
            CircuitState::HalfOpen => {
                metrics.state = CircuitState::Open;
                metrics.last_state_change = Instant::now();
                warn!("Circuit breaker reopened after failed recovery attempt");
            }
            CircuitState::Open => {}
        }
    }
}

/// Process-local breaker registry keyed by provider name. State is created
/// lazily on first reference and dropped only by `reset`; it is not shared
/// across worker instances.
pub struct CircuitBreaker {
    metrics: Mutex<HashMap<String, CircuitBreakerMetrics>>,
    strategy: Arc<dyn BreakerStrategy>,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::with_strategy(Arc::new(ConsecutiveFailureStrategy))
    }

    pub fn with_strategy(strategy: Arc<dyn BreakerStrategy>) -> Self {
        Self {
            metrics: Mutex::new(HashMap::new()),
            strategy,
        }
    }

    /// Admission check. Lazily moves an expired open breaker to half-open
    /// (resetting trial counters) before delegating to the strategy.
    pub fn should_allow_request(&self, name: &str, config: &CircuitBreakerConfig) -> bool {
        let mut metrics = self.lock();
        let entry = metrics.entry(name.to_string()).or_default();

        if entry.state == CircuitState::Open {
            let elapsed = entry.last_failure_time.map(|t| t.elapsed());

            if elapsed.is_some_and(|e| e >= Duration::from_millis(config.timeout_ms)) {
                entry.state = CircuitState::HalfOpen;
                entry.last_state_change = Instant::now();
                entry.success_count = 0;
                entry.failure_count = 0;
                info!(provider = name, "Circuit breaker attempting reset");
            }
        }

        let allowed = self.strategy.should_allow(entry, config);

        if !allowed {
            debug!(
                provider = name,
                state = entry.state.as_str(),
                "Circuit breaker rejecting request"
            );
        }

        allowed
    }

    pub fn record_success(&self, name: &str, config: &CircuitBreakerConfig) {
        let mut metrics = self.lock();
        let entry = metrics.entry(name.to_string()).or_default();
        self.strategy.on_success(entry, config);
    }

    pub fn record_failure(&self, name: &str, config: &CircuitBreakerConfig) {
        let mut metrics = self.lock();
        let entry = metrics.entry(name.to_string()).or_default();
        self.strategy.on_failure(entry, config);
    }

    pub fn get_state(&self, name: &str) -> CircuitState {
        self.lock()
            .get(name)
            .map(|m| m.state)
            .unwrap_or(CircuitState::Closed)
    }

    /// Operator escape hatch: drops the provider's metrics entirely, so the
    /// next reference starts from a fresh closed breaker.
    pub fn reset(&self, name: &str) {
        self.lock().remove(name);
        info!(provider = name, "Circuit breaker state reset");
    }

    pub fn metrics_snapshot(&self, name: &str) -> Option<CircuitBreakerMetrics> {
        self.lock().get(name).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CircuitBreakerMetrics>> {
        match self.metrics.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}
