//! Capability interfaces the orchestration core consumes.
//!
//! Agents declare a [`CapabilityKind`] tag and implement the one fixed
//! method that kind maps to; the scheduler dispatches on the tag. Tools are
//! invoked by name through a bounded-concurrency registry.

use crate::core::{AgentResponse, CapabilityKind};
use crate::errors::AgentCallError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Input handed to one step invocation.
///
/// `fields` carries the step's own input map; `upstream` carries the
/// responses of every step already completed in the run.
#[derive(Debug, Clone, Default)]
pub struct StepInput {
    /// The step's declared input values.
    pub fields: HashMap<String, serde_json::Value>,
    /// Responses of completed upstream steps, keyed by step name.
    pub upstream: HashMap<String, AgentResponse>,
}

impl StepInput {
    /// Creates an input from field values and upstream results.
    #[must_use]
    pub fn new(
        fields: HashMap<String, serde_json::Value>,
        upstream: HashMap<String, AgentResponse>,
    ) -> Self {
        Self { fields, upstream }
    }

    /// Gets a declared field value.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&serde_json::Value> {
        self.fields.get(key)
    }

    /// Gets a field as a string slice.
    #[must_use]
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(serde_json::Value::as_str)
    }

    /// Gets an upstream step's response.
    #[must_use]
    pub fn upstream(&self, step_name: &str) -> Option<&AgentResponse> {
        self.upstream.get(step_name)
    }
}

/// An LLM-backed agent the orchestrator can call.
///
/// Business failures must be returned as `AgentResponse { success: false }`;
/// only infrastructure failures (network, timeout) may be raised as
/// [`AgentCallError`] for the resilience layer to handle.
#[async_trait]
pub trait Agent: Send + Sync + Debug {
    /// Returns the agent's unique name.
    fn name(&self) -> &str;

    /// Returns the capability this agent provides.
    fn capability(&self) -> CapabilityKind;

    /// Extracts structure or insight from input content.
    async fn analyze(&self, _input: &StepInput) -> Result<AgentResponse, AgentCallError> {
        Err(AgentCallError::unsupported(self.name(), CapabilityKind::Analysis))
    }

    /// Produces new content from upstream results.
    async fn synthesize(&self, _input: &StepInput) -> Result<AgentResponse, AgentCallError> {
        Err(AgentCallError::unsupported(self.name(), CapabilityKind::Synthesis))
    }

    /// Checks produced content for quality or consistency.
    async fn verify(&self, _input: &StepInput) -> Result<AgentResponse, AgentCallError> {
        Err(AgentCallError::unsupported(self.name(), CapabilityKind::Verification))
    }
}

/// Registry of agents keyed by name.
///
/// Constructed with the orchestrator and injected explicitly, so tests get
/// a fresh registry per run.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: DashMap<String, Arc<dyn Agent>>,
}

impl AgentRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an agent under its declared name.
    pub fn register(&self, agent: Arc<dyn Agent>) {
        tracing::debug!(agent = agent.name(), capability = %agent.capability(), "Agent registered");
        self.agents.insert(agent.name().to_string(), agent);
    }

    /// Looks up an agent by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Agent>> {
        self.agents.get(name).map(|a| Arc::clone(a.value()))
    }

    /// Returns the number of registered agents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Returns true if no agents are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

/// The result of one tool invocation.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolOutcome {
    /// Whether the tool succeeded.
    pub success: bool,
    /// The tool's result payload, when successful.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// The failure message, when unsuccessful.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Wall-clock execution time in seconds.
    pub execution_time: f64,
}

impl ToolOutcome {
    /// Creates a successful outcome.
    #[must_use]
    pub fn ok(result: serde_json::Value, execution_time: f64) -> Self {
        Self {
            success: true,
            result: Some(result),
            error_message: None,
            execution_time,
        }
    }

    /// Creates a failed outcome.
    #[must_use]
    pub fn error(message: impl Into<String>, execution_time: f64) -> Self {
        Self {
            success: false,
            result: None,
            error_message: Some(message.into()),
            execution_time,
        }
    }
}

/// A callable tool.
#[async_trait]
pub trait Tool: Send + Sync + Debug {
    /// Returns the tool's unique name.
    fn name(&self) -> &str;

    /// Invokes the tool with the given parameters.
    async fn call(
        &self,
        parameters: &HashMap<String, serde_json::Value>,
    ) -> Result<ToolOutcome, AgentCallError>;
}

/// Registry of tools with bounded execution concurrency.
///
/// Tool calls may be CPU-bound, so concurrent executions are limited by a
/// semaphore acting as a worker pool.
#[derive(Debug)]
pub struct ToolRegistry {
    tools: DashMap<String, Arc<dyn Tool>>,
    permits: Arc<Semaphore>,
}

impl ToolRegistry {
    /// Default number of concurrently executing tools.
    pub const DEFAULT_MAX_CONCURRENT: usize = 4;

    /// Creates a registry with the default concurrency bound.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_concurrent(Self::DEFAULT_MAX_CONCURRENT)
    }

    /// Creates a registry with an explicit concurrency bound.
    #[must_use]
    pub fn with_max_concurrent(max_concurrent: usize) -> Self {
        Self {
            tools: DashMap::new(),
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Registers a tool under its declared name.
    pub fn register(&self, tool: Arc<dyn Tool>) {
        tracing::debug!(tool = tool.name(), "Tool registered");
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Looks up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(|t| Arc::clone(t.value()))
    }

    /// Returns the number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns true if no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Executes a tool by name under the concurrency bound.
    ///
    /// An unregistered name or a failed outcome both surface as
    /// [`AgentCallError::Tool`], so they re-enter the resilience pipeline
    /// as `ToolFailure`.
    pub async fn execute(
        &self,
        tool_name: &str,
        parameters: &HashMap<String, serde_json::Value>,
    ) -> Result<ToolOutcome, AgentCallError> {
        let tool = self
            .get(tool_name)
            .ok_or_else(|| AgentCallError::tool(tool_name, "not registered"))?;

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| AgentCallError::Other(format!("tool pool unavailable: {e}")))?;

        let outcome = tool.call(parameters).await?;
        if outcome.success {
            Ok(outcome)
        } else {
            Err(AgentCallError::tool(
                tool_name,
                outcome
                    .error_message
                    .unwrap_or_else(|| "unknown tool error".to_string()),
            ))
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ResponseContent;

    #[derive(Debug)]
    struct EchoAgent;

    #[async_trait]
    impl Agent for EchoAgent {
        fn name(&self) -> &str {
            "echo"
        }

        fn capability(&self) -> CapabilityKind {
            CapabilityKind::Analysis
        }

        async fn analyze(&self, input: &StepInput) -> Result<AgentResponse, AgentCallError> {
            let text = input.field_str("text").unwrap_or("nothing").to_string();
            Ok(AgentResponse::ok(ResponseContent::Text(text)))
        }
    }

    #[derive(Debug)]
    struct FixedTool {
        succeed: bool,
    }

    #[async_trait]
    impl Tool for FixedTool {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn call(
            &self,
            _parameters: &HashMap<String, serde_json::Value>,
        ) -> Result<ToolOutcome, AgentCallError> {
            if self.succeed {
                Ok(ToolOutcome::ok(serde_json::json!({"done": true}), 0.01))
            } else {
                Ok(ToolOutcome::error("disk full", 0.01))
            }
        }
    }

    #[tokio::test]
    async fn test_agent_registry_lookup() {
        let registry = AgentRegistry::new();
        registry.register(Arc::new(EchoAgent));

        assert_eq!(registry.len(), 1);
        let agent = registry.get("echo").unwrap();
        assert_eq!(agent.capability(), CapabilityKind::Analysis);
        assert!(registry.get("missing").is_none());
    }

    #[tokio::test]
    async fn test_agent_unsupported_capability_default() {
        let agent = EchoAgent;
        let input = StepInput::default();

        let err = agent.synthesize(&input).await.unwrap_err();
        assert!(matches!(err, AgentCallError::UnsupportedCapability { .. }));
    }

    #[tokio::test]
    async fn test_tool_execute_success() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(FixedTool { succeed: true }));

        let outcome = registry.execute("fixed", &HashMap::new()).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.result, Some(serde_json::json!({"done": true})));
    }

    #[tokio::test]
    async fn test_tool_failed_outcome_becomes_error() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(FixedTool { succeed: false }));

        let err = registry.execute("fixed", &HashMap::new()).await.unwrap_err();
        assert!(matches!(err, AgentCallError::Tool { .. }));
        assert!(err.to_string().contains("disk full"));
    }

    #[tokio::test]
    async fn test_tool_not_registered() {
        let registry = ToolRegistry::new();
        let err = registry.execute("ghost", &HashMap::new()).await.unwrap_err();
        assert!(err.to_string().contains("not registered"));
    }
}
