//! Orchestrates breaker, retry, fallback, and sanitization around one call.

use crate::core::AgentResponse;
use crate::errors::AgentCallError;
use crate::events::{Event, EventLevel, EventSink, NoOpEventSink};
use crate::resilience::{
    classify, CircuitBreakerRegistry, CircuitState, FallbackProvider, RetryPolicy,
};
use crate::sanitize::{HallucinationSanitizer, HALLUCINATION_FLAG};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tracing::{error, warn};

/// Wraps every external call with the full recovery pipeline.
///
/// The wrapped call flows breaker gate, optional per-call timeout, retry
/// with backoff, then sanitization on success or a degraded fallback on
/// exhaustion. [`execute_with_resilience`](Self::execute_with_resilience)
/// never returns an error; exhaustion is absorbed into a fallback response.
pub struct ResilienceManager {
    breakers: Arc<CircuitBreakerRegistry>,
    fallback: Arc<FallbackProvider>,
    sanitizer: Arc<HallucinationSanitizer>,
    default_policy: RetryPolicy,
    sink: Arc<dyn EventSink>,
}

impl Default for ResilienceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ResilienceManager {
    /// Creates a manager with default components and a no-op sink.
    #[must_use]
    pub fn new() -> Self {
        Self {
            breakers: Arc::new(CircuitBreakerRegistry::new()),
            fallback: Arc::new(FallbackProvider::new()),
            sanitizer: Arc::new(HallucinationSanitizer::new()),
            default_policy: RetryPolicy::default(),
            sink: Arc::new(NoOpEventSink),
        }
    }

    /// Replaces the breaker registry.
    #[must_use]
    pub fn with_breakers(mut self, breakers: Arc<CircuitBreakerRegistry>) -> Self {
        self.breakers = breakers;
        self
    }

    /// Replaces the fallback provider.
    #[must_use]
    pub fn with_fallback(mut self, fallback: Arc<FallbackProvider>) -> Self {
        self.fallback = fallback;
        self
    }

    /// Replaces the sanitizer.
    #[must_use]
    pub fn with_sanitizer(mut self, sanitizer: Arc<HallucinationSanitizer>) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    /// Replaces the default retry policy.
    #[must_use]
    pub fn with_default_policy(mut self, policy: RetryPolicy) -> Self {
        self.default_policy = policy;
        self
    }

    /// Replaces the event sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Returns the breaker registry, for health reporting.
    #[must_use]
    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    /// Returns the fallback provider.
    #[must_use]
    pub fn fallback(&self) -> &Arc<FallbackProvider> {
        &self.fallback
    }

    fn emit_breaker_transition(&self, resource: &str, before: CircuitState, after: CircuitState) {
        if before == after {
            return;
        }
        let (level, message) = match after {
            CircuitState::Open => (EventLevel::Warning, "breaker.opened"),
            CircuitState::HalfOpen => (EventLevel::Info, "breaker.half_open"),
            CircuitState::Closed => (EventLevel::Info, "breaker.closed"),
        };
        self.sink
            .try_emit(Event::new(level, "resilience", message).with_agent(resource));
    }

    /// Executes a call under the full recovery pipeline.
    ///
    /// `resource` keys the circuit breaker and fallback lookup. `policy`
    /// overrides the default retry policy for this call. The returned
    /// response is always usable: either the (sanitized) real result or a
    /// degraded fallback carrying `fallback_used` metadata.
    pub async fn execute_with_resilience<F, Fut>(
        &self,
        resource: &str,
        policy: Option<&RetryPolicy>,
        mut call: F,
    ) -> AgentResponse
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<AgentResponse, AgentCallError>>,
    {
        let policy = policy.unwrap_or(&self.default_policy);
        let breaker = self.breakers.resolve(resource);
        let mut last_error = AgentCallError::Other("no attempts made".to_string());

        for attempt in 1..=policy.max_attempts {
            if attempt > 1 {
                let delay = policy.delay_for_attempt(attempt - 1);
                self.sink.try_emit(
                    Event::new(EventLevel::Warning, "resilience", "retry.attempt")
                        .with_agent(resource)
                        .with_data(json!({
                            "attempt": attempt,
                            "delay_secs": delay.as_secs_f64(),
                        })),
                );
                tokio::time::sleep(delay).await;
            }

            let state_before = breaker.state();
            if let Err(e) = breaker.before_call() {
                // Rejected without invoking the call; not a breaker failure.
                let kind = classify(&e);
                last_error = e;
                if !policy.is_retryable(kind) {
                    break;
                }
                continue;
            }
            self.emit_breaker_transition(resource, state_before, breaker.state());

            let outcome = match policy.call_timeout {
                Some(timeout) => match tokio::time::timeout(timeout, call()).await {
                    Ok(result) => result,
                    Err(_) => Err(AgentCallError::Timeout(timeout)),
                },
                None => call().await,
            };

            match outcome {
                Ok(response) => {
                    let before = breaker.state();
                    breaker.on_success();
                    self.emit_breaker_transition(resource, before, breaker.state());
                    let sanitized = self.sanitizer.sanitize(response);
                    if sanitized.metadata_value(HALLUCINATION_FLAG).is_some() {
                        self.sink.try_emit(
                            Event::new(EventLevel::Warning, "sanitizer", "hallucination.detected")
                                .with_agent(resource),
                        );
                    }
                    return sanitized;
                }
                Err(e) => {
                    let before = breaker.state();
                    breaker.on_failure();
                    self.emit_breaker_transition(resource, before, breaker.state());
                    let kind = classify(&e);
                    warn!(
                        resource,
                        attempt,
                        kind = %kind,
                        error = %e,
                        "Call failed"
                    );
                    let retryable = policy.is_retryable(kind);
                    last_error = e;
                    if !retryable {
                        break;
                    }
                }
            }
        }

        error!(resource, error = %last_error, "Recovery exhausted; using fallback");
        self.sink.try_emit(
            Event::new(EventLevel::Error, "resilience", "fallback.used")
                .with_agent(resource)
                .with_data(json!({"error": last_error.to_string()})),
        );
        self.fallback.degraded(resource, &last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ResponseContent;
    use crate::events::CollectingEventSink;
    use crate::resilience::CircuitBreakerConfig;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new()
            .with_base_delay(Duration::from_millis(1))
            .with_jitter(false)
    }

    #[tokio::test]
    async fn test_success_passes_through_sanitized() {
        let manager = ResilienceManager::new();

        let response = manager
            .execute_with_resilience("agent", Some(&fast_policy()), || async {
                Ok(AgentResponse::ok_text("All good."))
            })
            .await;

        assert!(response.success);
        assert_eq!(response.content.as_text(), Some("All good."));
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let manager = ResilienceManager::new();
        let calls = AtomicU32::new(0);

        let response = manager
            .execute_with_resilience("agent", Some(&fast_policy()), || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(AgentCallError::Network("flaky".to_string()))
                    } else {
                        Ok(AgentResponse::ok_text("recovered"))
                    }
                }
            })
            .await;

        assert!(response.success);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_fallback_never_errors() {
        let sink = Arc::new(CollectingEventSink::new());
        let manager = ResilienceManager::new().with_sink(Arc::clone(&sink) as _);
        let calls = AtomicU32::new(0);

        let response = manager
            .execute_with_resilience("agent", Some(&fast_policy()), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AgentCallError::Network("down".to_string())) }
            })
            .await;

        assert!(!response.success);
        assert_eq!(calls.load(Ordering::SeqCst), 3, "three attempts, no more");
        assert_eq!(
            response.metadata_value("fallback_used"),
            Some(&json!(true))
        );
        assert_eq!(sink.events_matching("fallback.used").len(), 1);
        assert_eq!(sink.events_matching("retry.attempt").len(), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_fast() {
        let manager = ResilienceManager::new();
        let calls = AtomicU32::new(0);

        let response = manager
            .execute_with_resilience("agent", Some(&fast_policy()), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AgentCallError::Validation("bad schema".to_string())) }
            })
            .await;

        assert!(!response.success);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_open_breaker_short_circuits_to_fallback() {
        let breakers = Arc::new(CircuitBreakerRegistry::with_config(
            CircuitBreakerConfig::new()
                .with_failure_threshold(1)
                .with_recovery_timeout(Duration::from_secs(60)),
        ));
        let manager = ResilienceManager::new().with_breakers(Arc::clone(&breakers));
        let calls = AtomicU32::new(0);

        // First run trips the breaker.
        let _ = manager
            .execute_with_resilience("agent", Some(&fast_policy()), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AgentCallError::Validation("bad".to_string())) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Second run never reaches the call.
        let response = manager
            .execute_with_resilience("agent", Some(&fast_policy()), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(AgentResponse::ok_text("unreachable")) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!response.success);
        assert!(response
            .metadata_value("original_error")
            .and_then(|v| v.as_str())
            .is_some_and(|s| s.contains("circuit")));
    }

    #[tokio::test]
    async fn test_call_timeout_maps_to_timeout_error() {
        let manager = ResilienceManager::new();
        let policy = fast_policy()
            .with_max_attempts(1)
            .with_call_timeout(Duration::from_millis(5));

        let response = manager
            .execute_with_resilience("agent", Some(&policy), || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(AgentResponse::ok(ResponseContent::Text("late".to_string())))
            })
            .await;

        assert!(!response.success);
        assert!(response
            .metadata_value("original_error")
            .and_then(|v| v.as_str())
            .is_some_and(|s| s.to_lowercase().contains("timed out")));
    }
}
