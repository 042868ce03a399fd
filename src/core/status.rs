//! Status and capability enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The capability a step asks its agent for.
///
/// The scheduler dispatches on this tag; each kind maps to exactly one
/// method on the `Agent` trait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    /// Extracts structure or insight from existing content.
    Analysis,
    /// Produces new content from upstream results.
    Synthesis,
    /// Checks produced content for quality or consistency.
    Verification,
    /// Invokes a registered tool instead of an agent.
    ToolCall,
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Analysis => write!(f, "analysis"),
            Self::Synthesis => write!(f, "synthesis"),
            Self::Verification => write!(f, "verification"),
            Self::ToolCall => write!(f, "tool_call"),
        }
    }
}

/// The execution status of a single workflow step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Step has not started.
    #[default]
    Pending,
    /// Step is currently executing.
    Acting,
    /// Step completed successfully.
    Completed,
    /// Step failed.
    Failed,
}

impl StepStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Acting => write!(f, "acting"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// The execution status of a whole workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Workflow created but not started.
    #[default]
    Pending,
    /// Workflow is executing.
    Running,
    /// All steps finished; at least the run itself succeeded.
    Completed,
    /// The run aborted with an error.
    Failed,
    /// The run was cancelled cooperatively.
    Cancelled,
}

impl WorkflowStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// The lifecycle status of a pipeline state object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    /// Pipeline created but no stage has run.
    #[default]
    Pending,
    /// A stage is in progress.
    Running,
    /// Pipeline finished successfully.
    Completed,
    /// Pipeline recorded an error.
    Failed,
}

impl PipelineStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_kind_display() {
        assert_eq!(CapabilityKind::Analysis.to_string(), "analysis");
        assert_eq!(CapabilityKind::ToolCall.to_string(), "tool_call");
    }

    #[test]
    fn test_step_status_terminal() {
        assert!(StepStatus::Completed.is_terminal());
        assert!(StepStatus::Failed.is_terminal());
        assert!(!StepStatus::Pending.is_terminal());
        assert!(!StepStatus::Acting.is_terminal());
    }

    #[test]
    fn test_workflow_status_terminal() {
        assert!(WorkflowStatus::Cancelled.is_terminal());
        assert!(!WorkflowStatus::Running.is_terminal());
    }

    #[test]
    fn test_status_serialize_snake_case() {
        let json = serde_json::to_string(&StepStatus::Acting).unwrap();
        assert_eq!(json, r#""acting""#);

        let json = serde_json::to_string(&CapabilityKind::ToolCall).unwrap();
        assert_eq!(json, r#""tool_call""#);

        let back: WorkflowStatus = serde_json::from_str(r#""cancelled""#).unwrap();
        assert_eq!(back, WorkflowStatus::Cancelled);
    }
}
