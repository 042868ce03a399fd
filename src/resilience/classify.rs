//! Maps raised call errors onto a small closed set of error kinds.

use crate::errors::AgentCallError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of error kinds the retry policy reasons about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The call exceeded a deadline.
    Timeout,
    /// A transport-level failure.
    NetworkError,
    /// Bad input or output shape.
    ValidationError,
    /// A tool invocation failed.
    ToolFailure,
    /// The agent itself failed.
    AgentFailure,
    /// Anything unclassifiable.
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::NetworkError => write!(f, "network_error"),
            Self::ValidationError => write!(f, "validation_error"),
            Self::ToolFailure => write!(f, "tool_failure"),
            Self::AgentFailure => write!(f, "agent_failure"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Classifies a call error into an [`ErrorKind`].
///
/// Typed variants map directly; `Other` falls back to message-substring
/// rules. An open circuit classifies as `Unknown` so it is never retried
/// through itself under the default policy.
#[must_use]
pub fn classify(error: &AgentCallError) -> ErrorKind {
    match error {
        AgentCallError::Timeout(_) => ErrorKind::Timeout,
        AgentCallError::Network(_) => ErrorKind::NetworkError,
        AgentCallError::Validation(_) | AgentCallError::UnsupportedCapability { .. } => {
            ErrorKind::ValidationError
        }
        AgentCallError::Tool { .. } => ErrorKind::ToolFailure,
        AgentCallError::Agent(_) => ErrorKind::AgentFailure,
        AgentCallError::CircuitOpen(_) => ErrorKind::Unknown,
        AgentCallError::Other(message) => classify_message(message),
    }
}

fn classify_message(message: &str) -> ErrorKind {
    let lower = message.to_lowercase();

    if lower.contains("timeout") || lower.contains("timed out") {
        ErrorKind::Timeout
    } else if lower.contains("network") || lower.contains("connection") || lower.contains("http") {
        ErrorKind::NetworkError
    } else if lower.contains("validation") || lower.contains("invalid") {
        ErrorKind::ValidationError
    } else if lower.contains("tool") {
        ErrorKind::ToolFailure
    } else if lower.contains("agent") || lower.contains("processing") {
        ErrorKind::AgentFailure
    } else {
        ErrorKind::Unknown
    }
}
