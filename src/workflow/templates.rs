//! Reusable workflow templates.

use crate::core::CapabilityKind;
use crate::workflow::WorkflowStep;
use std::collections::HashMap;

/// A named, reusable step graph.
///
/// Instantiating a template clones its steps and merges the caller's input
/// map into every step.
#[derive(Debug, Clone)]
pub struct WorkflowTemplate {
    /// Unique template name.
    pub name: String,
    /// What the template does.
    pub description: String,
    /// Prototype steps, cloned per instantiation.
    pub steps: Vec<WorkflowStep>,
}

impl WorkflowTemplate {
    /// Creates a template.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        steps: Vec<WorkflowStep>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            steps,
        }
    }

    /// Clones the steps with the caller's input merged into each one.
    ///
    /// Template-declared inputs win over caller inputs on key collision.
    #[must_use]
    pub fn instantiate(&self, input: &HashMap<String, serde_json::Value>) -> Vec<WorkflowStep> {
        self.steps
            .iter()
            .cloned()
            .map(|mut step| {
                for (key, value) in input {
                    step.input.entry(key.clone()).or_insert_with(|| value.clone());
                }
                step
            })
            .collect()
    }
}

/// The built-in content repurposing pipeline: extract a transcript, analyze
/// it, then fan out into channel-specific content with a final quality gate.
#[must_use]
pub fn content_repurposing_template() -> WorkflowTemplate {
    WorkflowTemplate::new(
        "content_repurposing",
        "Turn source media into social, script, newsletter, and blog content",
        vec![
            WorkflowStep::new(
                "transcript_extraction",
                "transcript_extractor",
                CapabilityKind::ToolCall,
            ),
            WorkflowStep::new("content_analysis", "content_analyst", CapabilityKind::Analysis)
                .depends_on("transcript_extraction"),
            WorkflowStep::new("product_detection", "product_detector", CapabilityKind::Analysis)
                .depends_on("content_analysis"),
            WorkflowStep::new("seo_analysis", "seo_analyst", CapabilityKind::Analysis)
                .depends_on("content_analysis"),
            WorkflowStep::new(
                "social_content_creation",
                "social_creator",
                CapabilityKind::Synthesis,
            )
            .depends_on("content_analysis")
            .depends_on("seo_analysis"),
            WorkflowStep::new("script_creation", "script_writer", CapabilityKind::Synthesis)
                .depends_on("content_analysis"),
            WorkflowStep::new(
                "newsletter_creation",
                "newsletter_writer",
                CapabilityKind::Synthesis,
            )
            .depends_on("content_analysis")
            .depends_on("seo_analysis"),
            WorkflowStep::new("blog_creation", "blog_writer", CapabilityKind::Synthesis)
                .depends_on("content_analysis")
                .depends_on("seo_analysis")
                .depends_on("product_detection"),
            WorkflowStep::new(
                "quality_control",
                "quality_controller",
                CapabilityKind::Verification,
            )
            .depends_on("social_content_creation")
            .depends_on("script_creation")
            .depends_on("newsletter_creation")
            .depends_on("blog_creation"),
        ],
    )
}
