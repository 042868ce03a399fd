//! Agent response and its typed content variants.
//!
//! Downstream code matches on [`ResponseContent`] instead of duck-typing
//! opaque payloads. The orchestration core never interprets content beyond
//! scanning `Text` for hallucination markers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Structured result of a content-analysis step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisContent {
    /// Main topics detected in the source.
    #[serde(default)]
    pub topics: Vec<String>,
    /// Key points worth repurposing.
    #[serde(default)]
    pub key_points: Vec<String>,
    /// Overall sentiment label.
    #[serde(default)]
    pub sentiment: String,
    /// Audience the source speaks to.
    #[serde(default)]
    pub target_audience: String,
    /// Anything the analyst produced beyond the fixed fields.
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// A single social-media post.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SocialContent {
    /// Target platform (e.g. "linkedin").
    pub platform: String,
    /// Post body.
    pub body: String,
    /// Hashtags to attach.
    #[serde(default)]
    pub hashtags: Vec<String>,
    /// Accounts to mention.
    #[serde(default)]
    pub mentions: Vec<String>,
}

/// A short-form video script.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptContent {
    /// Script title.
    pub title: String,
    /// Opening hook.
    #[serde(default)]
    pub hook: String,
    /// Script body.
    pub body: String,
    /// Closing call to action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_to_action: Option<String>,
}

/// A newsletter issue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewsletterContent {
    /// Subject line.
    pub subject: String,
    /// Issue body.
    pub body: String,
    /// Section headings.
    #[serde(default)]
    pub sections: Vec<String>,
}

/// A blog post.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlogContent {
    /// Post title.
    pub title: String,
    /// Post body.
    pub body: String,
    /// Section headings.
    #[serde(default)]
    pub headings: Vec<String>,
    /// Target keywords.
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// The closed set of payloads an agent call can produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ResponseContent {
    /// Free text; the only variant the hallucination sanitizer scans.
    Text(String),
    /// Structured analysis output.
    Analysis(AnalysisContent),
    /// Social-media content.
    Social(SocialContent),
    /// Video script content.
    Script(ScriptContent),
    /// Newsletter content.
    Newsletter(NewsletterContent),
    /// Blog post content.
    Blog(BlogContent),
    /// Opaque payload (tool results, passthrough data).
    Raw(serde_json::Value),
}

impl Default for ResponseContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl ResponseContent {
    /// Returns the free text when the content is `Text`.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            _ => None,
        }
    }

    /// Returns the main prose body of the content, if it has one.
    ///
    /// Used by the critique fallback chain; `Analysis` and `Raw` carry no
    /// single prose body.
    #[must_use]
    pub fn body_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            Self::Social(s) => Some(&s.body),
            Self::Script(s) => Some(&s.body),
            Self::Newsletter(n) => Some(&n.body),
            Self::Blog(b) => Some(&b.body),
            Self::Analysis(_) | Self::Raw(_) => None,
        }
    }
}

/// The result of one agent or tool invocation.
///
/// `success=false` signals a business failure; infrastructure failures are
/// raised as [`crate::errors::AgentCallError`] and handled by the resilience
/// layer instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    /// Whether the call achieved its goal.
    pub success: bool,
    /// The typed payload.
    pub content: ResponseContent,
    /// Self-declared confidence in [0, 1].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// The agent's reasoning trace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    /// Follow-up suggestions for the caller.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    /// Additional metadata.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AgentResponse {
    /// Creates a successful response with the given content.
    #[must_use]
    pub fn ok(content: ResponseContent) -> Self {
        Self {
            success: true,
            content,
            confidence: None,
            reasoning: None,
            suggestions: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Creates a successful free-text response.
    #[must_use]
    pub fn ok_text(text: impl Into<String>) -> Self {
        Self::ok(ResponseContent::Text(text.into()))
    }

    /// Creates a failed (business-level) response.
    #[must_use]
    pub fn failure(content: ResponseContent) -> Self {
        Self {
            success: false,
            content,
            confidence: None,
            reasoning: None,
            suggestions: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Sets the confidence, clamped to [0, 1].
    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence.clamp(0.0, 1.0));
        self
    }

    /// Sets the reasoning trace.
    #[must_use]
    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    /// Adds a suggestion.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Returns true if the response carries free text the sanitizer can scan.
    #[must_use]
    pub fn is_text_bearing(&self) -> bool {
        matches!(self.content, ResponseContent::Text(_))
    }

    /// Gets a metadata value.
    #[must_use]
    pub fn metadata_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.metadata.get(key)
    }
}
