use chrono::{DateTime, Utc};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FlowError>;

/// Failure raised by the render host boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HostError {
    #[error("render host is disabled")]
    Unavailable,
    #[error("host rejected {operation}: {reason}")]
    Rejected { operation: String, reason: String },
}

impl HostError {
    pub fn rejected(operation: &str, reason: impl Into<String>) -> Self {
        Self::Rejected {
            operation: operation.to_string(),
            reason: reason.into(),
        }
    }
}

/// Error taxonomy of the engine. Validation and duplicate failures are
/// deterministic and never retried; only `Host` rejections are.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FlowError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("duplicate: {0}")]
    Duplicate(String),
    #[error("render host unavailable")]
    HostUnavailable,
    #[error("host failure: {0}")]
    Host(HostError),
}

impl FlowError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn duplicate(message: impl Into<String>) -> Self {
        Self::Duplicate(message.into())
    }

    /// Host rejections may succeed on a later attempt; everything else is
    /// deterministic.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Host(HostError::Rejected { .. }))
    }
}

impl From<HostError> for FlowError {
    fn from(error: HostError) -> Self {
        match error {
            HostError::Unavailable => Self::HostUnavailable,
            rejected => Self::Host(rejected),
        }
    }
}

/// Uniform envelope around a failed mutating operation: what ran, when,
/// what broke, structured context, and remediation hints.
#[derive(Debug, Error)]
#[error("{operation} failed: {source}")]
pub struct OpFailure {
    pub operation: &'static str,
    pub timestamp: DateTime<Utc>,
    #[source]
    pub source: FlowError,
    pub debug: serde_json::Value,
    pub suggestions: Vec<String>,
}

impl OpFailure {
    pub fn new(operation: &'static str, source: FlowError, debug: serde_json::Value) -> Self {
        let suggestions = suggestions_for(operation, &source);
        Self {
            operation,
            timestamp: Utc::now(),
            source,
            debug,
            suggestions,
        }
    }
}

fn suggestions_for(operation: &'static str, error: &FlowError) -> Vec<String> {
    let mut suggestions = Vec::new();
    match error {
        FlowError::Validation(message) => {
            if message.contains("id") {
                suggestions.push("provide a non-empty string id, or omit it to have one generated".to_string());
            }
            if message.contains("coordinate") || message.contains("finite") {
                suggestions.push("check the coordinate computation for NaN or Infinity".to_string());
            }
            if message.contains("kind") {
                suggestions.push("use one of the palette kind tokens (see NodeKind)".to_string());
            }
            suggestions.push(format!("fix the {operation} input; validation failures are deterministic and will not succeed on retry"));
        }
        FlowError::NotFound { kind, id } => {
            suggestions.push(format!("verify that {kind} '{id}' was created and not already deleted"));
        }
        FlowError::Duplicate(_) => {
            suggestions.push("query the existing record instead of re-creating it".to_string());
        }
        FlowError::HostUnavailable => {
            suggestions.push("attach or re-enable the render host before mutating the graph".to_string());
        }
        FlowError::Host(_) => {
            suggestions.push("the host rejected the mutation after retries; inspect the host state".to_string());
        }
    }
    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_host_rejections_are_retryable() {
        assert!(!FlowError::validation("bad").is_retryable());
        assert!(!FlowError::HostUnavailable.is_retryable());
        assert!(FlowError::Host(HostError::rejected("addNode", "busy")).is_retryable());
    }

    #[test]
    fn envelope_carries_suggestions() {
        let failure = OpFailure::new(
            "addNode",
            FlowError::validation("id must be a non-empty string"),
            serde_json::json!({"id": ""}),
        );
        assert_eq!(failure.operation, "addNode");
        assert!(!failure.suggestions.is_empty());
    }
}
