//! Core vocabulary types shared across the orchestration layers.

mod response;
mod status;

pub use response::{
    AgentResponse, AnalysisContent, BlogContent, NewsletterContent, ResponseContent,
    ScriptContent, SocialContent,
};
pub use status::{CapabilityKind, PipelineStatus, StepStatus, WorkflowStatus};
