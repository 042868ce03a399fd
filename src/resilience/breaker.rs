//! Per-resource circuit breaker with lazy half-open probing.

use crate::errors::AgentCallError;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation; failures are counted.
    Closed,
    /// Calls fail immediately until the recovery timeout elapses.
    Open,
    /// Probing recovery; successes are counted toward closing.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Configuration for a circuit breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in Closed that open the circuit.
    pub failure_threshold: u32,
    /// How long the circuit stays Open before the next call may probe.
    pub recovery_timeout: Duration,
    /// Consecutive HalfOpen successes needed to close the circuit.
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 3,
        }
    }
}

impl CircuitBreakerConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the failure threshold.
    #[must_use]
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Sets the recovery timeout.
    #[must_use]
    pub fn with_recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }

    /// Sets the success threshold.
    #[must_use]
    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_time: Option<Instant>,
    recovery_start_time: Option<Instant>,
}

/// A point-in-time view of a breaker, for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    /// The resource name.
    pub name: String,
    /// Current state.
    pub state: CircuitState,
    /// Failures since the last success (Closed) or since opening.
    pub failure_count: u32,
    /// Successes recorded while HalfOpen.
    pub success_count: u32,
}

/// Fail-fast state machine guarding one named resource.
///
/// State lives behind its own mutex; instances are shared via `Arc` and
/// cached in a [`CircuitBreakerRegistry`] for the process lifetime.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Creates a breaker for the named resource.
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure_time: None,
                recovery_start_time: None,
            }),
        }
    }

    /// Returns the resource name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Gate to run before invoking the wrapped call.
    ///
    /// While Open and not yet eligible to probe, fails immediately with
    /// [`AgentCallError::CircuitOpen`] without invoking anything. Once the
    /// recovery timeout has elapsed, the next call transitions the breaker
    /// to HalfOpen and is allowed through (lazy, not timer-driven).
    pub fn before_call(&self) -> Result<(), AgentCallError> {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::Open {
            let eligible = inner
                .recovery_start_time
                .is_some_and(|start| start.elapsed() >= self.config.recovery_timeout);
            if eligible {
                inner.state = CircuitState::HalfOpen;
                inner.success_count = 0;
                info!(breaker = %self.name, "Circuit transitioning to half-open probe");
            } else {
                return Err(AgentCallError::CircuitOpen(self.name.clone()));
            }
        }
        Ok(())
    }

    /// Records a successful call.
    pub fn on_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    inner.recovery_start_time = None;
                    info!(breaker = %self.name, "Circuit reset to closed");
                }
            }
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::Open => {}
        }
    }

    /// Records a failed call.
    pub fn on_failure(&self) {
        let mut inner = self.inner.lock();
        inner.failure_count += 1;
        inner.last_failure_time = Some(Instant::now());

        match inner.state {
            CircuitState::HalfOpen => {
                // A failed probe restarts the full recovery wait.
                inner.state = CircuitState::Open;
                inner.recovery_start_time = Some(Instant::now());
                warn!(breaker = %self.name, "Half-open probe failed; circuit reopened");
            }
            CircuitState::Closed => {
                if inner.failure_count >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.recovery_start_time = Some(Instant::now());
                    warn!(
                        breaker = %self.name,
                        failures = inner.failure_count,
                        "Circuit opened"
                    );
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Executes a call under breaker protection.
    pub async fn call<T, F, Fut>(&self, op: F) -> Result<T, AgentCallError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, AgentCallError>>,
    {
        self.before_call()?;
        match op().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(e) => {
                self.on_failure();
                Err(e)
            }
        }
    }

    /// Returns a point-in-time view of the breaker.
    #[must_use]
    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
        }
    }
}

/// Process-wide breaker store keyed by resource name.
///
/// Injected explicitly wherever it is needed; there is no module-level
/// singleton, so tests construct fresh registries per run.
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    default_config: CircuitBreakerConfig,
}

impl CircuitBreakerRegistry {
    /// Creates a registry with the default breaker configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with a custom default configuration.
    #[must_use]
    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            default_config: config,
        }
    }

    /// Returns the breaker for a resource, creating it lazily.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Arc<CircuitBreaker> {
        Arc::clone(
            self.breakers
                .entry(name.to_string())
                .or_insert_with(|| {
                    Arc::new(CircuitBreaker::new(name, self.default_config.clone()))
                })
                .value(),
        )
    }

    /// Returns the number of active breakers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    /// Returns true if no breakers exist yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Returns snapshots of every active breaker, for health reporting.
    #[must_use]
    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        self.breakers.iter().map(|b| b.snapshot()).collect()
    }

    /// Counts breakers currently in the given state.
    #[must_use]
    pub fn count_in_state(&self, state: CircuitState) -> usize {
        self.breakers
            .iter()
            .filter(|b| b.state() == state)
            .count()
    }
}
