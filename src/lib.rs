//! # Agentflow
//!
//! An orchestration core for multi-stage AI content generation.
//!
//! Agentflow coordinates LLM-backed agents and tools through declarative
//! workflows:
//!
//! - **Planned execution**: Step graphs are validated and partitioned into
//!   dependency levels, then run sequentially or level-parallel
//! - **Resilience**: Every external call goes through circuit breaking,
//!   bounded retry with backoff, and fallback degradation
//! - **Hallucination sanitization**: Successful text responses are scored
//!   and rewritten before they reach the caller
//! - **Run-scoped state**: Pipeline runs accumulate typed stage results,
//!   timings, and stage-tagged diagnostics
//! - **Cooperative cancellation**: Runs stop scheduling on request without
//!   interrupting in-flight calls
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use agentflow::prelude::*;
//!
//! let orchestrator = Orchestrator::new(agents, tools, resilience);
//! let id = orchestrator.create_from_template(
//!     "content_repurposing",
//!     &input,
//!     Some(ExecutionMode::Parallel),
//! )?;
//!
//! let result = orchestrator.execute(&id).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod agents;
pub mod cancellation;
pub mod core;
pub mod errors;
pub mod events;
pub mod resilience;
pub mod sanitize;
pub mod state;
pub mod workflow;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::agents::{Agent, AgentRegistry, StepInput, Tool, ToolOutcome, ToolRegistry};
    pub use crate::cancellation::CancellationToken;
    pub use crate::core::{
        AgentResponse, CapabilityKind, PipelineStatus, ResponseContent, StepStatus,
        WorkflowStatus,
    };
    pub use crate::errors::{AgentCallError, OrchestratorError, PlanValidationError};
    pub use crate::events::{
        CollectingEventSink, Event, EventLevel, EventSink, LoggingEventSink, NoOpEventSink,
    };
    pub use crate::resilience::{
        classify, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState,
        ErrorKind, FallbackProvider, ResilienceManager, RetryPolicy,
    };
    pub use crate::sanitize::{Detection, HallucinationSanitizer};
    pub use crate::state::{PipelineState, StateManager};
    pub use crate::workflow::{
        ExecutionMode, ExecutionPlan, Orchestrator, WorkflowResult, WorkflowState, WorkflowStep,
        WorkflowTemplate,
    };
}
