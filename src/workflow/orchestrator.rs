//! The execution engine: schedules steps, dispatches agents and tools, and
//! records run state.

use crate::agents::{Agent, AgentRegistry, StepInput, Tool, ToolRegistry};
use crate::cancellation::CancellationToken;
use crate::core::{AgentResponse, CapabilityKind, ResponseContent, StepStatus, WorkflowStatus};
use crate::errors::{AgentCallError, OrchestratorError};
use crate::events::{Event, EventLevel, EventSink, NoOpEventSink};
use crate::resilience::ResilienceManager;
use crate::workflow::{
    content_repurposing_template, ExecutionMode, ExecutionPlan, WorkflowResult, WorkflowState,
    WorkflowStep, WorkflowTemplate,
};
use chrono::Utc;
use dashmap::DashMap;
use futures::future::join_all;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Coordinates workflow runs over injected registries.
///
/// Every collaborator is passed in at construction; nothing global is
/// consulted, so two orchestrators in one process are fully independent.
pub struct Orchestrator {
    agents: Arc<AgentRegistry>,
    tools: Arc<ToolRegistry>,
    resilience: Arc<ResilienceManager>,
    sink: Arc<dyn EventSink>,
    templates: DashMap<String, WorkflowTemplate>,
    workflows: DashMap<Uuid, WorkflowState>,
    plans: DashMap<Uuid, ExecutionPlan>,
    cancel_tokens: DashMap<Uuid, Arc<CancellationToken>>,
    max_concurrent_workflows: usize,
}

impl Orchestrator {
    /// Default bound on simultaneously active workflows.
    pub const DEFAULT_MAX_CONCURRENT_WORKFLOWS: usize = 16;

    /// Creates an orchestrator with the built-in templates registered.
    #[must_use]
    pub fn new(
        agents: Arc<AgentRegistry>,
        tools: Arc<ToolRegistry>,
        resilience: Arc<ResilienceManager>,
    ) -> Self {
        let orchestrator = Self {
            agents,
            tools,
            resilience,
            sink: Arc::new(NoOpEventSink),
            templates: DashMap::new(),
            workflows: DashMap::new(),
            plans: DashMap::new(),
            cancel_tokens: DashMap::new(),
            max_concurrent_workflows: Self::DEFAULT_MAX_CONCURRENT_WORKFLOWS,
        };
        orchestrator.register_template(content_repurposing_template());
        orchestrator
    }

    /// Replaces the event sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Sets the bound on simultaneously active workflows.
    #[must_use]
    pub fn with_max_concurrent_workflows(mut self, max: usize) -> Self {
        self.max_concurrent_workflows = max.max(1);
        self
    }

    /// Registers an agent.
    pub fn register_agent(&self, agent: Arc<dyn Agent>) {
        self.agents.register(agent);
    }

    /// Registers a tool.
    pub fn register_tool(&self, tool: Arc<dyn Tool>) {
        self.tools.register(tool);
    }

    /// Registers a workflow template.
    pub fn register_template(&self, template: WorkflowTemplate) {
        self.templates.insert(template.name.clone(), template);
    }

    /// Creates a workflow from explicit steps, returning its id.
    ///
    /// Validates that every non-tool step names a registered agent and that
    /// the step graph is plannable in the requested mode. No step body runs.
    pub fn create_workflow(
        &self,
        workflow_name: impl Into<String>,
        steps: Vec<WorkflowStep>,
        mode: Option<ExecutionMode>,
    ) -> Result<Uuid, OrchestratorError> {
        if self.list_active().len() >= self.max_concurrent_workflows {
            return Err(OrchestratorError::Internal(format!(
                "maximum of {} concurrent workflows reached",
                self.max_concurrent_workflows
            )));
        }

        for step in &steps {
            if step.capability != CapabilityKind::ToolCall
                && self.agents.get(&step.agent_name).is_none()
            {
                return Err(OrchestratorError::AgentNotFound(step.agent_name.clone()));
            }
        }

        let plan = ExecutionPlan::new(&steps, mode)?;
        let state = WorkflowState::new(workflow_name, steps);
        let id = state.workflow_id;

        info!(workflow_id = %id, mode = %plan.mode, "Workflow created");
        self.plans.insert(id, plan);
        self.cancel_tokens.insert(id, Arc::new(CancellationToken::new()));
        self.workflows.insert(id, state);
        Ok(id)
    }

    /// Creates a workflow from a registered template.
    ///
    /// The input map is merged into every step; template-declared inputs win
    /// on collision.
    pub fn create_from_template(
        &self,
        template_name: &str,
        input: &std::collections::HashMap<String, serde_json::Value>,
        mode: Option<ExecutionMode>,
    ) -> Result<Uuid, OrchestratorError> {
        let template = self
            .templates
            .get(template_name)
            .ok_or_else(|| OrchestratorError::TemplateNotFound(template_name.to_string()))?;
        let steps = template.instantiate(input);
        let name = template.name.clone();
        drop(template);
        self.create_workflow(name, steps, mode)
    }

    /// Returns a workflow's current status.
    #[must_use]
    pub fn workflow_status(&self, workflow_id: &Uuid) -> Option<WorkflowStatus> {
        self.workflows.get(workflow_id).map(|w| w.status)
    }

    /// Returns a clone of a workflow's full state.
    #[must_use]
    pub fn workflow_state(&self, workflow_id: &Uuid) -> Option<WorkflowState> {
        self.workflows.get(workflow_id).map(|w| w.clone())
    }

    /// Returns the ids of workflows that have not reached a terminal status.
    #[must_use]
    pub fn list_active(&self) -> Vec<Uuid> {
        self.workflows
            .iter()
            .filter(|w| {
                matches!(w.status, WorkflowStatus::Pending | WorkflowStatus::Running)
            })
            .map(|w| w.workflow_id)
            .collect()
    }

    /// Stops tracking a workflow, returning its final state.
    ///
    /// Only terminal runs can be removed; an active run must be cancelled
    /// (and executed to its Cancelled status) first. Frees the run's plan
    /// and cancellation token along with the state.
    pub fn remove_workflow(
        &self,
        workflow_id: &Uuid,
    ) -> Result<WorkflowState, OrchestratorError> {
        let is_terminal = self
            .workflow_status(workflow_id)
            .ok_or_else(|| OrchestratorError::WorkflowNotFound(workflow_id.to_string()))?
            .is_terminal();
        if !is_terminal {
            return Err(OrchestratorError::Internal(format!(
                "workflow {workflow_id} is still active; cancel it before removing"
            )));
        }

        self.plans.remove(workflow_id);
        self.cancel_tokens.remove(workflow_id);
        self.workflows
            .remove(workflow_id)
            .map(|(_, state)| state)
            .ok_or_else(|| OrchestratorError::WorkflowNotFound(workflow_id.to_string()))
    }

    /// Requests cooperative cancellation of a workflow.
    ///
    /// Stops further scheduling; in-flight calls are not interrupted.
    pub fn cancel_workflow(
        &self,
        workflow_id: &Uuid,
        reason: impl Into<String>,
    ) -> Result<(), OrchestratorError> {
        let token = self
            .cancel_tokens
            .get(workflow_id)
            .ok_or_else(|| OrchestratorError::WorkflowNotFound(workflow_id.to_string()))?;
        token.cancel(reason);
        Ok(())
    }

    /// Runs a workflow to completion (or failure or cancellation).
    ///
    /// Always produces a [`WorkflowResult`] carrying whatever steps did
    /// complete; partial work is never lost. Errs only when the id is
    /// unknown.
    pub async fn execute(&self, workflow_id: &Uuid) -> Result<WorkflowResult, OrchestratorError> {
        let (mut state, plan, token) = {
            let state = self
                .workflows
                .get(workflow_id)
                .map(|w| w.clone())
                .ok_or_else(|| OrchestratorError::WorkflowNotFound(workflow_id.to_string()))?;
            let plan = self
                .plans
                .get(workflow_id)
                .map(|p| p.clone())
                .ok_or_else(|| OrchestratorError::WorkflowNotFound(workflow_id.to_string()))?;
            let token = self
                .cancel_tokens
                .get(workflow_id)
                .map(|t| Arc::clone(&t))
                .ok_or_else(|| OrchestratorError::WorkflowNotFound(workflow_id.to_string()))?;
            (state, plan, token)
        };

        state.status = WorkflowStatus::Running;
        state.start_time = Some(Utc::now());
        self.workflows.insert(*workflow_id, state.clone());
        self.sink.try_emit(
            Event::new(EventLevel::Info, "orchestrator", "workflow.started")
                .with_data(json!({"workflow_id": workflow_id, "mode": plan.mode})),
        );

        let started = Instant::now();
        match plan.mode {
            ExecutionMode::Parallel => self.run_parallel(&mut state, &plan, &token).await,
            ExecutionMode::Sequential | ExecutionMode::Adaptive => {
                self.run_sequential(&mut state, &token).await
            }
        }

        state.current_step = None;
        state.end_time = Some(Utc::now());
        state.total_execution_time = started.elapsed().as_secs_f64();
        state.status = if token.is_cancelled() {
            let reason = token.reason().unwrap_or_else(|| "unspecified".to_string());
            state.errors.push(format!("workflow cancelled: {reason}"));
            WorkflowStatus::Cancelled
        } else if state.errors.is_empty() {
            WorkflowStatus::Completed
        } else {
            WorkflowStatus::Failed
        };

        let lifecycle = match state.status {
            WorkflowStatus::Completed => "workflow.completed",
            WorkflowStatus::Cancelled => "workflow.cancelled",
            _ => "workflow.failed",
        };
        self.sink.try_emit(
            Event::new(EventLevel::Info, "orchestrator", lifecycle).with_data(json!({
                "workflow_id": workflow_id,
                "completed_steps": state.results.len(),
                "errors": state.errors.len(),
            })),
        );

        let result = WorkflowResult {
            success: state.status == WorkflowStatus::Completed,
            workflow_id: *workflow_id,
            results: state.results.clone(),
            errors: state.errors.clone(),
            total_execution_time: state.total_execution_time,
        };
        self.workflows.insert(*workflow_id, state);
        Ok(result)
    }

    async fn run_sequential(&self, state: &mut WorkflowState, token: &CancellationToken) {
        for index in 0..state.steps.len() {
            if token.is_cancelled() {
                break;
            }

            let step = state.steps[index].clone();
            if !state.dependencies_met(&step) {
                self.fail_step(state, index, 0, "dependency not met");
                continue;
            }

            state.current_step = Some(step.step_name.clone());
            state.steps[index].status = StepStatus::Acting;
            self.sink.try_emit(
                Event::new(EventLevel::Info, "orchestrator", "step.started")
                    .with_agent(&step.agent_name)
                    .with_data(json!({"step": step.step_name})),
            );

            let input = StepInput::new(step.input.clone(), state.results.clone());
            let (response, failed_attempts) = self.run_step_with_retries(&step, &input).await;

            if response.success {
                self.complete_step(state, index, response);
            } else {
                // The step's own retry budget is spent; abort the run but
                // keep everything already completed.
                let message = failure_message(&response);
                self.fail_step(state, index, failed_attempts, &message);
                let exhausted = OrchestratorError::StepExhausted {
                    step: step.step_name.clone(),
                    message,
                };
                warn!(step = %step.step_name, "Aborting run: {exhausted}");
                break;
            }
        }
    }

    async fn run_parallel(
        &self,
        state: &mut WorkflowState,
        plan: &ExecutionPlan,
        token: &CancellationToken,
    ) {
        for level in &plan.levels {
            if token.is_cancelled() {
                break;
            }

            let mut ready = Vec::new();
            for name in level {
                let Some(index) = state.steps.iter().position(|s| &s.step_name == name) else {
                    continue;
                };
                let step = state.steps[index].clone();
                if !state.dependencies_met(&step) {
                    self.fail_step(state, index, 0, "dependency not met");
                    continue;
                }
                state.steps[index].status = StepStatus::Acting;
                self.sink.try_emit(
                    Event::new(EventLevel::Info, "orchestrator", "step.started")
                        .with_agent(&step.agent_name)
                        .with_data(json!({"step": step.step_name})),
                );
                let input = StepInput::new(step.input.clone(), state.results.clone());
                ready.push((index, step, input));
            }

            // The whole level is a barrier: results merge only after every
            // sibling finishes, and one failure never cancels the others.
            let runs = ready.into_iter().map(|(index, step, input)| async move {
                let outcome = self.run_step_with_retries(&step, &input).await;
                (index, outcome)
            });
            let outcomes = join_all(runs).await;

            // A failed step only deprives its own dependents of a results
            // entry; later levels still run and independent steps complete.
            for (index, (response, failed_attempts)) in outcomes {
                if response.success {
                    self.complete_step(state, index, response);
                } else {
                    let message = failure_message(&response);
                    self.fail_step(state, index, failed_attempts, &message);
                }
            }
        }
    }

    /// Runs one step through the resilience layer, re-attempting until it
    /// succeeds or its retry budget is spent. Never errors; a spent budget
    /// returns the last (fallback) response with the attempt count.
    async fn run_step_with_retries(
        &self,
        step: &WorkflowStep,
        input: &StepInput,
    ) -> (AgentResponse, u32) {
        let mut failed_attempts = step.retry_count;
        loop {
            let response = self.dispatch(step, input).await;
            if response.success {
                return (response, failed_attempts);
            }
            failed_attempts += 1;
            if failed_attempts >= step.max_retries {
                return (response, failed_attempts);
            }
        }
    }

    async fn dispatch(&self, step: &WorkflowStep, input: &StepInput) -> AgentResponse {
        if step.capability == CapabilityKind::ToolCall {
            let tools = Arc::clone(&self.tools);
            let tool_name = step.agent_name.clone();
            let params = input.fields.clone();
            return self
                .resilience
                .execute_with_resilience(&step.agent_name, None, move || {
                    let tools = Arc::clone(&tools);
                    let tool_name = tool_name.clone();
                    let params = params.clone();
                    async move {
                        let outcome = tools.execute(&tool_name, &params).await?;
                        Ok(AgentResponse::ok(ResponseContent::Raw(
                            outcome.result.unwrap_or(serde_json::Value::Null),
                        ))
                        .with_metadata("execution_time", json!(outcome.execution_time)))
                    }
                })
                .await;
        }

        let Some(agent) = self.agents.get(&step.agent_name) else {
            return self.resilience.fallback().degraded(
                &step.agent_name,
                &AgentCallError::Agent(format!("agent not registered: {}", step.agent_name)),
            );
        };

        let capability = step.capability;
        self.resilience
            .execute_with_resilience(&step.agent_name, None, move || {
                let agent = Arc::clone(&agent);
                let input = input.clone();
                async move {
                    match capability {
                        CapabilityKind::Analysis => agent.analyze(&input).await,
                        CapabilityKind::Synthesis => agent.synthesize(&input).await,
                        CapabilityKind::Verification => agent.verify(&input).await,
                        CapabilityKind::ToolCall => {
                            Err(AgentCallError::unsupported(agent.name(), capability))
                        }
                    }
                }
            })
            .await
    }

    fn complete_step(&self, state: &mut WorkflowState, index: usize, response: AgentResponse) {
        let step = &mut state.steps[index];
        step.status = StepStatus::Completed;
        step.output = Some(response.clone());
        self.sink.try_emit(
            Event::new(EventLevel::Info, "orchestrator", "step.completed")
                .with_agent(&step.agent_name)
                .with_data(json!({"step": step.step_name})),
        );
        state.results.insert(step.step_name.clone(), response);
    }

    fn fail_step(
        &self,
        state: &mut WorkflowState,
        index: usize,
        failed_attempts: u32,
        message: &str,
    ) {
        let step = &mut state.steps[index];
        step.status = StepStatus::Failed;
        step.retry_count = failed_attempts;
        step.error_message = Some(message.to_string());
        state.errors.push(format!("[{}] {message}", step.step_name));
        self.sink.try_emit(
            Event::new(EventLevel::Error, "orchestrator", "step.failed")
                .with_agent(&step.agent_name)
                .with_data(json!({"step": step.step_name, "error": message})),
        );
    }
}

fn failure_message(response: &AgentResponse) -> String {
    response
        .metadata_value("original_error")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| "step failed".to_string())
}
