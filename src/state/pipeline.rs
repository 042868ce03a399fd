//! Mutable state carried through one content-repurposing run.

use crate::cancellation::CancellationToken;
use crate::core::{AgentResponse, PipelineStatus, ResponseContent};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Sentinel returned when no stage has produced critiquable content yet.
const NO_CONTENT_SENTINEL: &str = "No content available for critique";

/// All state accumulated by one pipeline run.
///
/// Each stage writes into its own typed slot; errors and warnings are
/// stage-tagged strings; timings are recorded per stage in seconds. The
/// embedded cancellation token lets callers abort cooperatively.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineState {
    /// Unique run id.
    pub pipeline_id: Uuid,
    /// When the run started.
    pub start_time: DateTime<Utc>,
    /// When the run ended; set exactly once on terminal transition.
    pub end_time: Option<DateTime<Utc>>,
    /// The stage currently executing.
    pub current_stage: String,
    /// Overall run status.
    pub status: PipelineStatus,

    /// URL the source content was fetched from, if any.
    pub source_url: Option<String>,
    /// The source text being repurposed.
    pub source_text: Option<String>,
    /// Keywords the run should optimize for.
    pub target_keywords: Vec<String>,
    /// The brand voice description, if configured.
    pub brand_voice: Option<String>,
    /// Metadata produced during transcript extraction.
    pub transcription_metadata: HashMap<String, Value>,

    /// Product detected in the source, if any.
    pub detected_product: Option<Value>,
    /// SEO analysis payload.
    pub seo_analysis: HashMap<String, Value>,
    /// Content analysis stage result.
    pub content_analysis: Option<AgentResponse>,
    /// Social post stage result.
    pub social_content: Option<AgentResponse>,
    /// Video script stage result.
    pub script: Option<AgentResponse>,
    /// Newsletter stage result.
    pub newsletter: Option<AgentResponse>,
    /// Blog post stage result.
    pub blog_post: Option<AgentResponse>,
    /// Per-stage quality scores.
    pub quality_scores: HashMap<String, f64>,

    /// Stage-tagged error messages. Any entry forces status Failed.
    pub errors: Vec<String>,
    /// Stage-tagged warnings.
    pub warnings: Vec<String>,
    /// Free-form debugging context.
    pub debug_info: HashMap<String, Value>,
    /// Stages completed so far, in order, without duplicates.
    pub completed_stages: Vec<String>,
    /// Elapsed seconds per stage, plus a "total" entry on completion.
    pub stage_timings: HashMap<String, f64>,

    /// Cooperative cancellation for this run.
    #[serde(skip)]
    pub cancel: Arc<CancellationToken>,
    #[serde(skip)]
    stage_started_at: Option<Instant>,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineState {
    /// Creates a fresh state in the `initialized` stage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pipeline_id: Uuid::new_v4(),
            start_time: Utc::now(),
            end_time: None,
            current_stage: "initialized".to_string(),
            status: PipelineStatus::Pending,
            source_url: None,
            source_text: None,
            target_keywords: Vec::new(),
            brand_voice: None,
            transcription_metadata: HashMap::new(),
            detected_product: None,
            seo_analysis: HashMap::new(),
            content_analysis: None,
            social_content: None,
            script: None,
            newsletter: None,
            blog_post: None,
            quality_scores: HashMap::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            debug_info: HashMap::new(),
            completed_stages: Vec::new(),
            stage_timings: HashMap::new(),
            cancel: Arc::new(CancellationToken::new()),
            stage_started_at: None,
        }
    }

    /// Sets the source text.
    #[must_use]
    pub fn with_source_text(mut self, text: impl Into<String>) -> Self {
        self.source_text = Some(text.into());
        self
    }

    /// Sets the source URL.
    #[must_use]
    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    /// Sets the target keywords.
    #[must_use]
    pub fn with_target_keywords(mut self, keywords: Vec<String>) -> Self {
        self.target_keywords = keywords;
        self
    }

    /// Sets the brand voice.
    #[must_use]
    pub fn with_brand_voice(mut self, voice: impl Into<String>) -> Self {
        self.brand_voice = Some(voice.into());
        self
    }

    /// Advances to a new stage.
    ///
    /// Records the elapsed time of the outgoing stage, appends the new stage
    /// to `completed_stages` if absent, and moves the status to Running.
    /// Calling with the current stage name again is a no-op for the list.
    pub fn update_stage(&mut self, stage: impl Into<String>) {
        let stage = stage.into();
        if let Some(started) = self.stage_started_at.take() {
            self.stage_timings
                .insert(self.current_stage.clone(), started.elapsed().as_secs_f64());
        }
        if !self.completed_stages.contains(&stage) {
            self.completed_stages.push(stage.clone());
        }
        self.current_stage = stage;
        self.status = PipelineStatus::Running;
        self.stage_started_at = Some(Instant::now());
    }

    /// Records a stage-tagged error and forces status Failed.
    pub fn add_error(&mut self, message: impl Into<String>, stage: Option<&str>) {
        let stage = stage.unwrap_or(&self.current_stage);
        self.errors.push(format!("[{stage}] {}", message.into()));
        self.status = PipelineStatus::Failed;
    }

    /// Records a stage-tagged warning.
    pub fn add_warning(&mut self, message: impl Into<String>, stage: Option<&str>) {
        let stage = stage.unwrap_or(&self.current_stage);
        self.warnings.push(format!("[{stage}] {}", message.into()));
    }

    /// Records a debugging value.
    pub fn add_debug(&mut self, key: impl Into<String>, value: Value) {
        self.debug_info.insert(key.into(), value);
    }

    /// Returns the best available text for downstream critique.
    ///
    /// Probes social, blog, newsletter, then script content, falls back to
    /// the source text, and finally to a fixed sentinel. Never empty.
    #[must_use]
    pub fn get_content_for_critique(&self) -> String {
        [
            &self.social_content,
            &self.blog_post,
            &self.newsletter,
            &self.script,
        ]
        .into_iter()
        .flatten()
        .find_map(|r| r.content.body_text().map(str::to_string))
        .or_else(|| self.source_text.clone())
        .unwrap_or_else(|| NO_CONTENT_SENTINEL.to_string())
    }

    /// Merges the analysis payload with the source text and detected product
    /// into one map for agents that need full context.
    #[must_use]
    pub fn get_analysis_with_context(&self) -> HashMap<String, Value> {
        let mut context = HashMap::new();

        if let Some(response) = &self.content_analysis {
            match &response.content {
                ResponseContent::Analysis(analysis) => {
                    if let Ok(Value::Object(map)) = serde_json::to_value(analysis) {
                        context.extend(map);
                    }
                }
                ResponseContent::Raw(Value::Object(map)) => {
                    context.extend(map.clone().into_iter());
                }
                other => {
                    if let Some(text) = other.body_text() {
                        context.insert("analysis_text".to_string(), json!(text));
                    }
                }
            }
        }
        if let Some(text) = &self.source_text {
            context.insert("source_text".to_string(), json!(text));
        }
        if let Some(product) = &self.detected_product {
            context.insert("detected_product".to_string(), product.clone());
        }

        context
    }

    /// Marks the run completed. The end time is set exactly once.
    pub fn mark_completed(&mut self) {
        if self.end_time.is_none() {
            self.finalize(PipelineStatus::Completed);
        }
    }

    /// Marks the run failed with an error. The end time is set exactly once.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        if self.end_time.is_none() {
            self.errors
                .push(format!("[{}] {}", self.current_stage, error.into()));
            self.finalize(PipelineStatus::Failed);
        }
    }

    fn finalize(&mut self, status: PipelineStatus) {
        let end = Utc::now();
        let total = (end - self.start_time)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        self.end_time = Some(end);
        self.stage_timings.insert("total".to_string(), total);
        self.status = status;
    }

    /// Returns a flattened snapshot of the run, for reporting and persistence.
    #[must_use]
    pub fn summary(&self) -> Value {
        json!({
            "pipeline_id": self.pipeline_id,
            "start_time": self.start_time,
            "end_time": self.end_time,
            "status": self.status,
            "current_stage": self.current_stage,
            "completed_stages": self.completed_stages,
            "stage_timings": self.stage_timings,
            "quality_scores": self.quality_scores,
            "errors": self.errors,
            "warnings": self.warnings,
            "has_content_analysis": self.content_analysis.is_some(),
            "has_social_content": self.social_content.is_some(),
            "has_script": self.script.is_some(),
            "has_newsletter": self.newsletter.is_some(),
            "has_blog_post": self.blog_post.is_some(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SocialContent;

    #[test]
    fn test_fresh_state_returns_sentinel() {
        let state = PipelineState::new();
        assert_eq!(state.get_content_for_critique(), NO_CONTENT_SENTINEL);
    }

    #[test]
    fn test_critique_prefers_social_then_source() {
        let mut state = PipelineState::new().with_source_text("the transcript");
        assert_eq!(state.get_content_for_critique(), "the transcript");

        state.social_content = Some(AgentResponse::ok(ResponseContent::Social(SocialContent {
            platform: "twitter".to_string(),
            body: "a hot take".to_string(),
            hashtags: vec![],
            mentions: vec![],
        })));
        assert_eq!(state.get_content_for_critique(), "a hot take");
    }

    #[test]
    fn test_update_stage_is_idempotent_and_times_stages() {
        let mut state = PipelineState::new();

        state.update_stage("content_analysis");
        state.update_stage("content_analysis");
        assert_eq!(state.completed_stages, vec!["content_analysis"]);
        assert_eq!(state.status, PipelineStatus::Running);

        state.update_stage("seo_analysis");
        assert_eq!(
            state.completed_stages,
            vec!["content_analysis", "seo_analysis"]
        );
        assert!(state.stage_timings.contains_key("content_analysis"));
    }

    #[test]
    fn test_add_error_forces_failed_and_tags_stage() {
        let mut state = PipelineState::new();
        state.update_stage("blog_creation");
        state.add_error("model unavailable", None);
        state.add_warning("slow response", Some("seo_analysis"));

        assert_eq!(state.status, PipelineStatus::Failed);
        assert_eq!(state.errors, vec!["[blog_creation] model unavailable"]);
        assert_eq!(state.warnings, vec!["[seo_analysis] slow response"]);
    }

    #[test]
    fn test_end_time_set_exactly_once() {
        let mut state = PipelineState::new();
        state.mark_completed();
        let first = state.end_time;
        assert!(first.is_some());
        assert!(state.stage_timings.contains_key("total"));

        state.mark_failed("late failure");
        assert_eq!(state.end_time, first);
        assert_eq!(state.status, PipelineStatus::Completed);
        assert!(state.errors.is_empty(), "late failure is ignored");
    }

    #[test]
    fn test_analysis_context_merges_sources() {
        let mut state = PipelineState::new().with_source_text("raw text");
        state.detected_product = Some(json!({"name": "WidgetPro"}));

        let context = state.get_analysis_with_context();
        assert_eq!(context.get("source_text"), Some(&json!("raw text")));
        assert_eq!(
            context.get("detected_product"),
            Some(&json!({"name": "WidgetPro"}))
        );
    }

    #[test]
    fn test_analysis_context_folds_raw_and_text_payloads() {
        let mut state = PipelineState::new();
        state.content_analysis = Some(AgentResponse::ok(ResponseContent::Raw(json!({
            "topics": ["ai"],
            "sentiment": "positive",
        }))));

        let context = state.get_analysis_with_context();
        assert_eq!(context.get("topics"), Some(&json!(["ai"])));
        assert_eq!(context.get("sentiment"), Some(&json!("positive")));

        state.content_analysis = Some(AgentResponse::ok_text("plain analysis"));
        let context = state.get_analysis_with_context();
        assert_eq!(context.get("analysis_text"), Some(&json!("plain analysis")));
    }

    #[test]
    fn test_summary_shape() {
        let mut state = PipelineState::new();
        state.update_stage("content_analysis");
        state.mark_completed();

        let summary = state.summary();
        assert_eq!(summary["status"], json!("completed"));
        assert_eq!(summary["completed_stages"], json!(["content_analysis"]));
        assert!(summary["stage_timings"]["total"].is_number());
    }
}
