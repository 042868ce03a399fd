//! Failure resilience: error classification, circuit breaking, bounded
//! retry with backoff, and fallback degradation.

mod breaker;
mod classify;
mod fallback;
mod manager;
mod retry;

pub use breaker::{
    BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState,
};
pub use classify::{classify, ErrorKind};
pub use fallback::FallbackProvider;
pub use manager::ResilienceManager;
pub use retry::RetryPolicy;
