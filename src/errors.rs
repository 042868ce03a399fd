//! Error types for the agentflow orchestration core.
//!
//! Two families live here: [`OrchestratorError`] for planning and workflow
//! bookkeeping, and [`AgentCallError`] for infrastructure failures raised by
//! agent and tool calls. Business failures are never errors; they travel as
//! `AgentResponse { success: false }`.

use crate::core::CapabilityKind;
use std::time::Duration;
use thiserror::Error;

/// The main error type for orchestrator operations.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// A plan validation error occurred.
    #[error("{0}")]
    Validation(#[from] PlanValidationError),

    /// The requested workflow does not exist.
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    /// The requested workflow template does not exist.
    #[error("Workflow template not found: {0}")]
    TemplateNotFound(String),

    /// A step references an agent that was never registered.
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    /// A step exhausted its own retry budget, aborting the run.
    #[error("Step '{step}' exhausted its retry budget: {message}")]
    StepExhausted {
        /// The failing step name.
        step: String,
        /// The last recorded error for the step.
        message: String,
    },

    /// The workflow was cancelled.
    #[error("Workflow cancelled: {0}")]
    Cancelled(String),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error raised when a step graph cannot be turned into a valid plan.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PlanValidationError {
    /// The error message.
    pub message: String,
    /// The steps involved in the error.
    pub steps: Vec<String>,
}

impl PlanValidationError {
    /// Creates a new plan validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            steps: Vec::new(),
        }
    }

    /// Sets the steps involved.
    #[must_use]
    pub fn with_steps(mut self, steps: Vec<String>) -> Self {
        self.steps = steps;
        self
    }

    /// Creates the error reported when level partitioning gets stuck:
    /// either a dependency cycle or a reference to an undeclared step.
    #[must_use]
    pub fn circular_or_missing(remaining: Vec<String>) -> Self {
        Self::new(format!(
            "circular or missing dependency; unschedulable steps: {}",
            remaining.join(", ")
        ))
        .with_steps(remaining)
    }
}

/// Infrastructure failure raised by an agent or tool invocation.
///
/// These are the errors the resilience layer classifies, retries, and
/// ultimately converts into fallback responses.
#[derive(Debug, Clone, Error)]
pub enum AgentCallError {
    /// The call exceeded its deadline.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    /// A network-level failure.
    #[error("network error: {0}")]
    Network(String),

    /// The input or output failed validation.
    #[error("validation error: {0}")]
    Validation(String),

    /// A tool invocation failed.
    #[error("tool '{name}' failed: {reason}")]
    Tool {
        /// The tool name.
        name: String,
        /// The reason for failure.
        reason: String,
    },

    /// The agent itself failed during processing.
    #[error("agent failure: {0}")]
    Agent(String),

    /// The named circuit breaker rejected the call without executing it.
    #[error("circuit breaker '{0}' is open")]
    CircuitOpen(String),

    /// The agent does not implement the requested capability.
    #[error("agent '{agent}' does not support {kind} calls")]
    UnsupportedCapability {
        /// The agent name.
        agent: String,
        /// The requested capability.
        kind: CapabilityKind,
    },

    /// Anything else; classified by message substrings.
    #[error("{0}")]
    Other(String),
}

impl AgentCallError {
    /// Creates a tool failure error.
    #[must_use]
    pub fn tool(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Tool {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates an unsupported-capability error.
    #[must_use]
    pub fn unsupported(agent: impl Into<String>, kind: CapabilityKind) -> Self {
        Self::UnsupportedCapability {
            agent: agent.into(),
            kind,
        }
    }
}
