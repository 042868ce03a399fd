//! Workflow definition, planning, and execution.

mod orchestrator;
mod plan;
mod step;
mod templates;

#[cfg(test)]
mod integration_tests;

pub use orchestrator::Orchestrator;
pub use plan::{ExecutionMode, ExecutionPlan};
pub use step::{WorkflowResult, WorkflowState, WorkflowStep};
pub use templates::{content_repurposing_template, WorkflowTemplate};
