//! Post-generation hallucination detection and sanitization.
//!
//! Every successful text response flows through the sanitizer before it is
//! returned to the caller. Detection is additive pattern scoring; sanitizing
//! strips self-referential sentences, appends an uncertainty note, lowers
//! confidence, and marks the response so a second pass is a no-op.

use crate::core::{AgentResponse, ResponseContent};
use regex::Regex;
use serde_json::json;
use tracing::warn;

/// Metadata key that marks an already-sanitized response.
pub const HALLUCINATION_FLAG: &str = "hallucination_detected";

const SELF_REFERENCE_PATTERNS: &[&str] = &[
    r"(?i)I (?:am|is) (?:an? )?AI",
    r"(?i)As an? AI",
    r"(?i)I (?:do not|don't) have",
    r"(?i)I (?:cannot|can't)",
    r"(?i)This is (?:not|n't) real",
    r"(?i)I (?:am|is) (?:not|n't) sure",
    r"(?i)I (?:believe|think) (?:that )?this (?:might|may|could)",
    r"(?i)\b(?:obviously|clearly)\b",
    r"(?i)\b(?:certainly|definitely|absolutely)\b",
];

const UNCERTAINTY_MARKERS: &[&str] = &[
    "maybe", "perhaps", "possibly", "might", "could", "may", "seems",
];

const CONTRADICTION_MARKERS: &[&str] = &[
    "however",
    "but",
    "although",
    "despite",
    "on the other hand",
];

const SANITIZE_THRESHOLD: f64 = 0.6;

/// Outcome of scoring one piece of text.
#[derive(Debug, Clone)]
pub struct Detection {
    /// Whether the score crossed the sanitization threshold.
    pub is_hallucination: bool,
    /// Additive score in `[0.0, 1.0]`.
    pub score: f64,
    /// Human-readable reasons that contributed to the score.
    pub reasons: Vec<String>,
}

/// Scores text for hallucination markers and rewrites flagged responses.
///
/// Patterns are compiled once at construction; the sanitizer is immutable
/// afterwards and shared via `Arc`.
#[derive(Debug)]
pub struct HallucinationSanitizer {
    self_reference: Vec<Regex>,
    strip_sentences: Vec<Regex>,
}

impl Default for HallucinationSanitizer {
    fn default() -> Self {
        Self::new()
    }
}

impl HallucinationSanitizer {
    /// Creates a sanitizer with the built-in pattern set.
    ///
    /// The patterns are static and known-valid, so compilation cannot fail.
    #[must_use]
    pub fn new() -> Self {
        let self_reference = SELF_REFERENCE_PATTERNS
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect();
        let strip_sentences = [
            r"(?i)As an? AI[^.]*\.",
            r"(?i)I (?:am|is) (?:an? )?AI[^.]*\.",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect();

        Self {
            self_reference,
            strip_sentences,
        }
    }

    /// Scores a piece of text, factoring in the model's own confidence.
    #[must_use]
    pub fn detect(&self, text: &str, confidence: Option<f64>) -> Detection {
        let mut score: f64 = 0.0;
        let mut reasons = Vec::new();
        let lower = text.to_lowercase();

        // Every occurrence counts, not just each pattern that matched.
        let self_ref_hits: usize = self
            .self_reference
            .iter()
            .map(|re| re.find_iter(text).count())
            .sum();
        if self_ref_hits > 0 {
            score += 0.2 * self_ref_hits as f64;
            reasons.push(format!("{self_ref_hits} self-referential pattern(s)"));
        }

        // Markers count once each; repeating one word is not more uncertain.
        let uncertainty_hits = UNCERTAINTY_MARKERS
            .iter()
            .filter(|m| lower.contains(*m))
            .count();
        if uncertainty_hits > 3 {
            score += 0.3;
            reasons.push(format!("{uncertainty_hits} distinct uncertainty markers"));
        }

        let contradiction_hits = CONTRADICTION_MARKERS
            .iter()
            .filter(|m| lower.contains(*m))
            .count();
        if contradiction_hits > 2 {
            score += 0.2;
            reasons.push(format!("{contradiction_hits} distinct contradiction markers"));
        }

        // High stated confidence on already-suspicious text is itself a signal.
        if let Some(c) = confidence {
            if c > 0.8 && score > 0.5 {
                score += 0.3;
                reasons.push("high confidence on suspicious content".to_string());
            }
        }

        let score = score.min(1.0);
        Detection {
            is_hallucination: score > SANITIZE_THRESHOLD,
            score,
            reasons,
        }
    }

    /// Sanitizes a response in place, returning the (possibly rewritten) copy.
    ///
    /// Failed responses, non-text content, and responses already carrying
    /// the [`HALLUCINATION_FLAG`] pass through untouched, so the operation
    /// is idempotent.
    #[must_use]
    pub fn sanitize(&self, response: AgentResponse) -> AgentResponse {
        if !response.success || response.metadata_value(HALLUCINATION_FLAG).is_some() {
            return response;
        }
        let Some(text) = response.content.as_text() else {
            return response;
        };

        let detection = self.detect(text, response.confidence);
        if !detection.is_hallucination {
            return response;
        }

        warn!(
            score = detection.score,
            reasons = ?detection.reasons,
            "Hallucination detected; sanitizing response"
        );

        let mut cleaned = text.to_string();
        for re in &self.strip_sentences {
            cleaned = re.replace_all(&cleaned, "").to_string();
        }
        cleaned = cleaned.trim().to_string();

        let lower = cleaned.to_lowercase();
        if UNCERTAINTY_MARKERS.iter().any(|m| lower.contains(m)) {
            cleaned.push_str("\n\n[Note: Some information in this response may be uncertain]");
        }

        let original_confidence = response.confidence;
        let new_confidence = (original_confidence.unwrap_or(0.5) - 0.2).max(0.3);
        let reasoning = match &response.reasoning {
            Some(r) => format!("{r} [Content sanitized due to potential hallucination]"),
            None => "[Content sanitized due to potential hallucination]".to_string(),
        };

        let mut sanitized = response;
        sanitized.content = ResponseContent::Text(cleaned);
        sanitized = sanitized
            .with_confidence(new_confidence)
            .with_reasoning(reasoning)
            .with_suggestion("Some content was flagged as potentially unreliable")
            .with_suggestion("Consider verifying the information independently")
            .with_metadata(HALLUCINATION_FLAG, json!(true))
            .with_metadata("hallucination_score", json!(detection.score))
            .with_metadata(
                "original_confidence",
                json!(original_confidence),
            );
        sanitized
    }
}
