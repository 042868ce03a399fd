//! End-to-end scenarios exercising planning, resilience, and state together.

use crate::agents::{Agent, AgentRegistry, StepInput, ToolRegistry};
use crate::core::{AgentResponse, CapabilityKind, StepStatus, WorkflowStatus};
use crate::errors::AgentCallError;
use crate::events::CollectingEventSink;
use crate::resilience::{CircuitBreakerConfig, CircuitBreakerRegistry, ResilienceManager, RetryPolicy};
use crate::workflow::{ExecutionMode, Orchestrator, WorkflowStep};
use async_trait::async_trait;
use tokio_test::assert_ok;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Succeeds or fails deterministically, counting its invocations.
#[derive(Debug)]
struct CountingAgent {
    name: &'static str,
    capability: CapabilityKind,
    fail: bool,
    calls: Arc<AtomicU32>,
}

impl CountingAgent {
    fn ok(name: &'static str, capability: CapabilityKind) -> (Arc<Self>, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let agent = Arc::new(Self {
            name,
            capability,
            fail: false,
            calls: Arc::clone(&calls),
        });
        (agent, calls)
    }

    fn failing(name: &'static str, capability: CapabilityKind) -> (Arc<Self>, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let agent = Arc::new(Self {
            name,
            capability,
            fail: true,
            calls: Arc::clone(&calls),
        });
        (agent, calls)
    }

    fn respond(&self) -> Result<AgentResponse, AgentCallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(AgentCallError::Network(format!("{} unreachable", self.name)))
        } else {
            Ok(AgentResponse::ok_text(format!("{} output", self.name)))
        }
    }
}

#[async_trait]
impl Agent for CountingAgent {
    fn name(&self) -> &str {
        self.name
    }

    fn capability(&self) -> CapabilityKind {
        self.capability
    }

    async fn analyze(&self, _input: &StepInput) -> Result<AgentResponse, AgentCallError> {
        self.respond()
    }

    async fn synthesize(&self, _input: &StepInput) -> Result<AgentResponse, AgentCallError> {
        self.respond()
    }

    async fn verify(&self, _input: &StepInput) -> Result<AgentResponse, AgentCallError> {
        self.respond()
    }
}

fn fast_resilience() -> Arc<ResilienceManager> {
    Arc::new(
        ResilienceManager::new()
            .with_default_policy(
                RetryPolicy::new()
                    .with_base_delay(Duration::from_millis(1))
                    .with_jitter(false),
            )
            .with_breakers(Arc::new(CircuitBreakerRegistry::with_config(
                CircuitBreakerConfig::new().with_failure_threshold(100),
            ))),
    )
}

fn build(resilience: Arc<ResilienceManager>) -> Orchestrator {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    Orchestrator::new(
        Arc::new(AgentRegistry::new()),
        Arc::new(ToolRegistry::new()),
        resilience,
    )
}

fn step(name: &str, agent: &str, deps: &[&str]) -> WorkflowStep {
    let mut s = WorkflowStep::new(name, agent, CapabilityKind::Analysis).with_max_retries(1);
    for d in deps {
        s = s.depends_on(*d);
    }
    s
}

#[tokio::test]
async fn test_parallel_sibling_failure_keeps_completed_results() {
    let orchestrator = build(fast_resilience());
    let (a, _) = CountingAgent::ok("agent_a", CapabilityKind::Analysis);
    let (b, _) = CountingAgent::ok("agent_b", CapabilityKind::Analysis);
    let (c, _) = CountingAgent::failing("agent_c", CapabilityKind::Analysis);
    orchestrator.register_agent(a);
    orchestrator.register_agent(b);
    orchestrator.register_agent(c);

    let steps = vec![
        step("a", "agent_a", &[]),
        step("b", "agent_b", &["a"]),
        step("c", "agent_c", &["a"]),
    ];
    let id = orchestrator
        .create_workflow("fanout", steps, Some(ExecutionMode::Parallel))
        .unwrap();

    let result = orchestrator.execute(&id).await.unwrap();

    assert!(!result.success);
    assert!(result.results.contains_key("a"));
    assert!(result.results.contains_key("b"));
    assert!(!result.results.contains_key("c"));

    let state = orchestrator.workflow_state(&id).unwrap();
    assert_eq!(state.step("c").unwrap().status, StepStatus::Failed);
    assert_eq!(state.step("b").unwrap().status, StepStatus::Completed);
}

#[tokio::test]
async fn test_parallel_failure_does_not_block_independent_later_steps() {
    let orchestrator = build(fast_resilience());
    let (a, _) = CountingAgent::ok("agent_a", CapabilityKind::Analysis);
    let (b, _) = CountingAgent::failing("agent_b", CapabilityKind::Analysis);
    let (c, c_calls) = CountingAgent::ok("agent_c", CapabilityKind::Analysis);
    let (d, d_calls) = CountingAgent::ok("agent_d", CapabilityKind::Analysis);
    orchestrator.register_agent(a);
    orchestrator.register_agent(b);
    orchestrator.register_agent(c);
    orchestrator.register_agent(d);

    // Levels {0: [a, b], 1: [c, d]}. b's failure must not stop level 1:
    // c depends only on a and still runs; d depends on b and fails the
    // dependency check without its body running.
    let steps = vec![
        step("a", "agent_a", &[]),
        step("b", "agent_b", &[]),
        step("c", "agent_c", &["a"]),
        step("d", "agent_d", &["b"]),
    ];
    let id = orchestrator
        .create_workflow("fanout", steps, Some(ExecutionMode::Parallel))
        .unwrap();

    let result = orchestrator.execute(&id).await.unwrap();

    assert!(!result.success);
    assert_eq!(c_calls.load(Ordering::SeqCst), 1, "c's body should have run");
    assert_eq!(d_calls.load(Ordering::SeqCst), 0, "d's body never runs");
    assert!(result.results.contains_key("a"));
    assert!(result.results.contains_key("c"));

    let state = orchestrator.workflow_state(&id).unwrap();
    assert_eq!(state.step("b").unwrap().status, StepStatus::Failed);
    assert_eq!(
        state.step("d").unwrap().error_message.as_deref(),
        Some("dependency not met")
    );
}

#[tokio::test]
async fn test_sequential_missing_dependency_fails_only_that_step() {
    let orchestrator = build(fast_resilience());
    let (a, a_calls) = CountingAgent::ok("agent_a", CapabilityKind::Analysis);
    let (b, b_calls) = CountingAgent::ok("agent_b", CapabilityKind::Analysis);
    orchestrator.register_agent(a);
    orchestrator.register_agent(b);

    let steps = vec![step("a", "agent_a", &[]), step("b", "agent_b", &["missing"])];
    let id = orchestrator
        .create_workflow("broken", steps, Some(ExecutionMode::Sequential))
        .unwrap();

    let result = orchestrator.execute(&id).await.unwrap();

    assert!(!result.success);
    assert!(result.results.contains_key("a"));
    assert_eq!(a_calls.load(Ordering::SeqCst), 1);
    assert_eq!(b_calls.load(Ordering::SeqCst), 0, "b's body never runs");
    assert!(result.errors.iter().any(|e| e.contains("dependency not met")));

    let state = orchestrator.workflow_state(&id).unwrap();
    assert_eq!(state.step("b").unwrap().status, StepStatus::Failed);
    assert_eq!(state.step("b").unwrap().retry_count, 0, "never retried");
}

#[tokio::test]
async fn test_same_graph_fails_parallel_plan_creation() {
    let orchestrator = build(fast_resilience());
    let (a, _) = CountingAgent::ok("agent_a", CapabilityKind::Analysis);
    let (b, _) = CountingAgent::ok("agent_b", CapabilityKind::Analysis);
    orchestrator.register_agent(a);
    orchestrator.register_agent(b);

    let steps = vec![step("a", "agent_a", &[]), step("b", "agent_b", &["missing"])];
    let err = orchestrator
        .create_workflow("broken", steps, Some(ExecutionMode::Parallel))
        .unwrap_err();

    assert!(err.to_string().contains("circular or missing dependency"));
}

#[tokio::test]
async fn test_failing_step_exhausts_retries_then_aborts_with_partial_results() {
    let orchestrator = build(fast_resilience());
    let (a, _) = CountingAgent::ok("agent_a", CapabilityKind::Analysis);
    let (b, b_calls) = CountingAgent::failing("agent_b", CapabilityKind::Analysis);
    let (c, c_calls) = CountingAgent::ok("agent_c", CapabilityKind::Analysis);
    orchestrator.register_agent(a);
    orchestrator.register_agent(b);
    orchestrator.register_agent(c);

    // b fails every attempt: 1 step-level attempt x 3 resilience attempts.
    let steps = vec![
        step("a", "agent_a", &[]),
        step("b", "agent_b", &["a"]),
        step("c", "agent_c", &["a"]),
    ];
    let id = orchestrator
        .create_workflow("aborting", steps, Some(ExecutionMode::Sequential))
        .unwrap();

    let result = orchestrator.execute(&id).await.unwrap();

    assert!(!result.success);
    assert!(result.results.contains_key("a"), "partial work is kept");
    assert_eq!(b_calls.load(Ordering::SeqCst), 3, "default policy attempts");
    assert_eq!(c_calls.load(Ordering::SeqCst), 0, "run aborted before c");
    assert_eq!(
        orchestrator.workflow_status(&id),
        Some(WorkflowStatus::Failed)
    );
}

#[tokio::test]
async fn test_fallback_response_marks_step_failed_without_err() {
    let sink = Arc::new(CollectingEventSink::new());
    let resilience = Arc::new(
        ResilienceManager::new().with_default_policy(
            RetryPolicy::new()
                .with_max_attempts(1)
                .with_base_delay(Duration::from_millis(1)),
        ),
    );
    let orchestrator = build(resilience).with_sink(Arc::clone(&sink) as _);
    let (bad, _) = CountingAgent::failing("agent_bad", CapabilityKind::Analysis);
    orchestrator.register_agent(bad);

    let id = orchestrator
        .create_workflow(
            "solo",
            vec![step("only", "agent_bad", &[])],
            Some(ExecutionMode::Sequential),
        )
        .unwrap();

    // No Err from execute even though every attempt failed.
    let result = orchestrator.execute(&id).await.unwrap();
    assert!(!result.success);
    assert!(result.results.is_empty());
    assert_eq!(sink.events_matching("step.failed").len(), 1);
    assert_eq!(sink.events_matching("workflow.failed").len(), 1);
}

#[tokio::test]
async fn test_cancellation_stops_scheduling_and_returns_partial_results() {
    let orchestrator = build(fast_resilience());
    let (a, _) = CountingAgent::ok("agent_a", CapabilityKind::Analysis);
    let (b, b_calls) = CountingAgent::ok("agent_b", CapabilityKind::Analysis);
    orchestrator.register_agent(a);
    orchestrator.register_agent(b);

    let steps = vec![step("a", "agent_a", &[]), step("b", "agent_b", &["a"])];
    let id = orchestrator
        .create_workflow("cancelled", steps, Some(ExecutionMode::Sequential))
        .unwrap();

    orchestrator.cancel_workflow(&id, "operator request").unwrap();
    let result = orchestrator.execute(&id).await.unwrap();

    assert!(!result.success);
    assert_eq!(b_calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        orchestrator.workflow_status(&id),
        Some(WorkflowStatus::Cancelled)
    );
    assert!(result
        .errors
        .iter()
        .any(|e| e.contains("operator request")));
}

#[tokio::test]
async fn test_diamond_runs_in_level_order() {
    let sink = Arc::new(CollectingEventSink::new());
    let orchestrator = build(fast_resilience()).with_sink(Arc::clone(&sink) as _);
    for name in ["agent_a", "agent_b", "agent_c", "agent_d"] {
        let (agent, _) = CountingAgent::ok(name, CapabilityKind::Analysis);
        orchestrator.register_agent(agent);
    }

    let steps = vec![
        step("a", "agent_a", &[]),
        step("b", "agent_b", &["a"]),
        step("c", "agent_c", &["a"]),
        step("d", "agent_d", &["b", "c"]),
    ];
    let id = orchestrator
        .create_workflow("diamond", steps, Some(ExecutionMode::Parallel))
        .unwrap();

    let result = tokio_test::assert_ok!(orchestrator.execute(&id).await);

    assert!(result.success);
    assert_eq!(result.results.len(), 4);

    // d started only after both b and c completed.
    let events = sink.events();
    let started_d = events
        .iter()
        .position(|e| {
            e.message == "step.started"
                && e.data.as_ref().is_some_and(|d| d["step"] == "d")
        })
        .unwrap();
    for sibling in ["b", "c"] {
        let completed = events
            .iter()
            .position(|e| {
                e.message == "step.completed"
                    && e.data.as_ref().is_some_and(|d| d["step"] == sibling)
            })
            .unwrap();
        assert!(completed < started_d);
    }
}
