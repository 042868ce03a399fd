//! Workflow step and per-run workflow state.

use crate::core::{AgentResponse, CapabilityKind, StepStatus, WorkflowStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// One unit of work in a workflow.
///
/// Owned by its [`WorkflowState`] and mutated only by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Unique step name within the workflow.
    pub step_name: String,
    /// The agent (or tool, for tool-call steps) that executes this step.
    pub agent_name: String,
    /// How the step is dispatched.
    pub capability: CapabilityKind,
    /// Names of steps that must complete before this one runs.
    #[serde(default)]
    pub dependencies: HashSet<String>,
    /// Input values handed to the agent.
    #[serde(default)]
    pub input: HashMap<String, serde_json::Value>,
    /// Current execution status.
    #[serde(default)]
    pub status: StepStatus,
    /// The step's result, once completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<AgentResponse>,
    /// The last recorded error, if the step failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Failed attempts so far.
    #[serde(default)]
    pub retry_count: u32,
    /// Failed attempts allowed before the step is abandoned.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_max_retries() -> u32 {
    3
}

impl WorkflowStep {
    /// Creates a step with no dependencies or input.
    #[must_use]
    pub fn new(
        step_name: impl Into<String>,
        agent_name: impl Into<String>,
        capability: CapabilityKind,
    ) -> Self {
        Self {
            step_name: step_name.into(),
            agent_name: agent_name.into(),
            capability,
            dependencies: HashSet::new(),
            input: HashMap::new(),
            status: StepStatus::default(),
            output: None,
            error_message: None,
            retry_count: 0,
            max_retries: default_max_retries(),
        }
    }

    /// Adds a dependency on another step.
    #[must_use]
    pub fn depends_on(mut self, step_name: impl Into<String>) -> Self {
        self.dependencies.insert(step_name.into());
        self
    }

    /// Sets an input value.
    #[must_use]
    pub fn with_input(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.input.insert(key.into(), value);
        self
    }

    /// Sets the retry budget.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// All state for one workflow run.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowState {
    /// Unique run id.
    pub workflow_id: Uuid,
    /// Human-readable workflow name.
    pub workflow_name: String,
    /// Steps in declared order.
    pub steps: Vec<WorkflowStep>,
    /// Results of completed steps, keyed by step name.
    ///
    /// Only successful responses land here; a step runs only once every
    /// dependency name is present as a key.
    pub results: HashMap<String, AgentResponse>,
    /// Overall run status.
    pub status: WorkflowStatus,
    /// The step currently executing, if any.
    pub current_step: Option<String>,
    /// When the run started executing.
    pub start_time: Option<DateTime<Utc>>,
    /// When the run reached a terminal status.
    pub end_time: Option<DateTime<Utc>>,
    /// Wall-clock execution time in seconds.
    pub total_execution_time: f64,
    /// Errors accumulated across the run.
    pub errors: Vec<String>,
}

impl WorkflowState {
    /// Creates a pending workflow run.
    #[must_use]
    pub fn new(workflow_name: impl Into<String>, steps: Vec<WorkflowStep>) -> Self {
        Self {
            workflow_id: Uuid::new_v4(),
            workflow_name: workflow_name.into(),
            steps,
            results: HashMap::new(),
            status: WorkflowStatus::Pending,
            current_step: None,
            start_time: None,
            end_time: None,
            total_execution_time: 0.0,
            errors: Vec::new(),
        }
    }

    /// Looks up a step by name.
    #[must_use]
    pub fn step(&self, name: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.step_name == name)
    }

    /// Returns whether every dependency of a step is satisfied.
    #[must_use]
    pub fn dependencies_met(&self, step: &WorkflowStep) -> bool {
        step.dependencies.iter().all(|d| self.results.contains_key(d))
    }
}

/// The outcome handed back to the caller after a run.
///
/// Always produced, even for failed or cancelled runs; `results` carries
/// whatever steps did complete.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowResult {
    /// Whether every step completed successfully.
    pub success: bool,
    /// The run id.
    pub workflow_id: Uuid,
    /// Results of completed steps, keyed by step name.
    pub results: HashMap<String, AgentResponse>,
    /// Errors accumulated across the run.
    pub errors: Vec<String>,
    /// Wall-clock execution time in seconds.
    pub total_execution_time: f64,
}
