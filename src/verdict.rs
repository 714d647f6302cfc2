use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    PlaintiffWin,
    DefenseWin,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::PlaintiffWin => "PLAINTIFF_WIN",
            Outcome::DefenseWin => "DEFENSE_WIN",
        }
    }

    /// Party label used in rationales and reports.
    pub fn winner_label(&self) -> &'static str {
        match self {
            Outcome::PlaintiffWin => "plaintiff",
            Outcome::DefenseWin => "defendant",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const FAILED_LABEL: &str = "FAILED";

/// The judge's ruling. A failed trial carries a sentinel verdict: no outcome,
/// confidence 0 and the failure reason as rationale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub outcome: Option<Outcome>,
    pub winner: String,
    pub rationale: String,
    pub key_factors: Vec<String>,
    pub cited_authorities: Vec<String>,
    pub confidence_score: f64,
}

impl Verdict {
    pub fn new(
        outcome: Outcome,
        rationale: String,
        key_factors: Vec<String>,
        cited_authorities: Vec<String>,
        confidence_score: f64,
    ) -> Self {
        Self {
            outcome: Some(outcome),
            winner: outcome.winner_label().to_string(),
            rationale,
            key_factors,
            cited_authorities,
            confidence_score: clamp_confidence(confidence_score),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            outcome: None,
            winner: FAILED_LABEL.to_string(),
            rationale: reason.into(),
            key_factors: Vec::new(),
            cited_authorities: Vec::new(),
            confidence_score: 0.0,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.outcome.is_none()
    }
}

/// Clamp into [0, 1]. NaN maps to 0.
pub fn clamp_confidence(raw: f64) -> f64 {
    if raw.is_nan() {
        0.0
    } else {
        raw.clamp(0.0, 1.0)
    }
}
