//! Degraded responses returned when all recovery attempts are exhausted.

use crate::core::{AgentResponse, ResponseContent};
use crate::errors::AgentCallError;
use dashmap::DashMap;
use serde_json::json;

/// Supplies a canned degraded response per resource.
///
/// Callers register resource-specific responses up front; resources without
/// one fall back to a generic low-confidence failure response. Every
/// degraded response carries `fallback_used` and `original_error` metadata
/// so downstream consumers can distinguish it from real output.
#[derive(Debug, Default)]
pub struct FallbackProvider {
    responses: DashMap<String, AgentResponse>,
}

impl FallbackProvider {
    /// Creates a provider with no resource-specific responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the canned response for a resource.
    pub fn register(&self, resource: impl Into<String>, response: AgentResponse) {
        self.responses.insert(resource.into(), response);
    }

    fn default_response() -> AgentResponse {
        AgentResponse::failure(ResponseContent::Text(
            "Processing failed. Please try again later.".to_string(),
        ))
        .with_confidence(0.1)
        .with_reasoning("Service degraded; returning fallback response")
        .with_suggestion("Try again")
        .with_suggestion("Contact support if the issue persists")
    }

    /// Builds the degraded response for a resource after exhaustion.
    #[must_use]
    pub fn degraded(&self, resource: &str, error: &AgentCallError) -> AgentResponse {
        let base = self
            .responses
            .get(resource)
            .map(|r| r.clone())
            .unwrap_or_else(Self::default_response);

        base.with_metadata("fallback_used", json!(true))
            .with_metadata("original_error", json!(error.to_string()))
            .with_metadata("resource", json!(resource))
    }
}
