//! Error taxonomy for the orchestration core.
//!
//! Reasoner and research failures are recovered locally (degraded turns,
//! impoverished evidence); only construction-time problems surface as `SimError`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of a reasoning backend call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReasonerError {
    #[error("reasoner unavailable: {0}")]
    Unavailable(String),
    #[error("reasoner timed out after {0} ms")]
    Timeout(u64),
}

impl ReasonerError {
    pub fn kind(&self) -> &'static str {
        match self {
            ReasonerError::Unavailable(_) => "reasoner_unavailable",
            ReasonerError::Timeout(_) => "reasoner_timeout",
        }
    }
}

/// Transport failure of a research backend. "No results" is never an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResearchError {
    #[error("research backend unavailable: {0}")]
    Unavailable(String),
    #[error("research backend returned malformed findings: {0}")]
    Malformed(String),
}

/// An invalid strategy, temperament or randomisation value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field} value {value:?} (expected one of: {expected})")]
pub struct StrategyResolutionError {
    pub field: &'static str,
    pub value: String,
    pub expected: &'static str,
}

/// Errors that reject a trial or batch before any reasoner call is made.
#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    StrategyResolution(#[from] StrategyResolutionError),
    #[error("invalid batch request: {0}")]
    InvalidBatch(String),
    #[error("case description is empty")]
    EmptyCase,
}

/// Non-fatal conditions attached to a valid result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SimWarning {
    #[error("evidence incomplete: {reason}")]
    EvidenceIncomplete { reason: String },
    #[error("batch degraded: {failed} of {total} runs failed (threshold {threshold})")]
    BatchDegraded { failed: usize, total: usize, threshold: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reasoner_error_kind() {
        assert_eq!(ReasonerError::Timeout(100).kind(), "reasoner_timeout");
        assert_eq!(
            ReasonerError::Unavailable("down".into()).kind(),
            "reasoner_unavailable"
        );
    }

    #[test]
    fn test_warning_serializes_with_kind() {
        let w = SimWarning::BatchDegraded { failed: 3, total: 10, threshold: 0.25 };
        let v = serde_json::to_value(&w).unwrap();
        assert_eq!(v["kind"], "batch_degraded");
        assert_eq!(v["failed"], 3);
        assert!(w.to_string().contains("3 of 10"));
    }

    #[test]
    fn test_strategy_error_message_names_field() {
        let err = StrategyResolutionError {
            field: "prosecutor_strategy",
            value: "reckless".into(),
            expected: "aggressive, moderate, conservative, random",
        };
        let msg = err.to_string();
        assert!(msg.contains("prosecutor_strategy"));
        assert!(msg.contains("reckless"));
    }
}
