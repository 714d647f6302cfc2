// Trial transcript: append-only sequence of argument turns.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::extract::{extract_authorities, extract_key_points};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Prosecutor,
    Defense,
    Judge,
    Researcher,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Prosecutor => "prosecutor",
            Role::Defense => "defense",
            Role::Judge => "judge",
            Role::Researcher => "researcher",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Research,
    Opening,
    Rebuttal,
    Verdict,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Research => "research",
            Phase::Opening => "opening",
            Phase::Rebuttal => "rebuttal",
            Phase::Verdict => "verdict",
        }
    }

    /// Phases whose degraded turn fails the trial.
    pub fn is_required(&self) -> bool {
        matches!(self, Phase::Opening | Phase::Verdict)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgumentTurn {
    pub role: Role,
    pub phase: Phase,
    pub content: String,
    /// Statute and case references found in `content`.
    pub cited_authorities: Vec<String>,
    pub key_points: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl ArgumentTurn {
    pub fn new(role: Role, phase: Phase, content: String) -> Self {
        let cited_authorities = extract_authorities(&content);
        let key_points = extract_key_points(&content, 5);
        Self {
            role,
            phase,
            content,
            cited_authorities,
            key_points,
            created_at: Utc::now(),
        }
    }
}

/// Ordered turns of one trial. Turns can only be appended.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    turns: Vec<ArgumentTurn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: ArgumentTurn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[ArgumentTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn roles(&self) -> Vec<Role> {
        self.turns.iter().map(|t| t.role).collect()
    }

    /// Most recent turn by `role` in `phase`.
    pub fn last_of(&self, role: Role, phase: Phase) -> Option<&ArgumentTurn> {
        self.turns.iter().rev().find(|t| t.role == role && t.phase == phase)
    }

    /// Turns eligible as arguments before the bench (excludes research and verdict).
    pub fn arguments(&self) -> impl Iterator<Item = &ArgumentTurn> {
        self.turns
            .iter()
            .filter(|t| matches!(t.phase, Phase::Opening | Phase::Rebuttal))
    }

    /// SHA-256 over role, phase and content of every turn; timestamps excluded.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for turn in &self.turns {
            hasher.update(turn.role.as_str().as_bytes());
            hasher.update([0u8]);
            hasher.update(turn.phase.as_str().as_bytes());
            hasher.update([0u8]);
            hasher.update(turn.content.as_bytes());
            hasher.update([0xffu8]);
        }
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_phases() {
        assert!(Phase::Opening.is_required());
        assert!(Phase::Verdict.is_required());
        assert!(!Phase::Rebuttal.is_required());
        assert!(!Phase::Research.is_required());
    }

    #[test]
    fn test_last_of_and_arguments() {
        let mut t = Transcript::new();
        t.push(ArgumentTurn::new(Role::Researcher, Phase::Research, "analysis".into()));
        t.push(ArgumentTurn::new(Role::Prosecutor, Phase::Opening, "p open".into()));
        t.push(ArgumentTurn::new(Role::Defense, Phase::Opening, "d open".into()));
        assert_eq!(t.last_of(Role::Defense, Phase::Opening).unwrap().content, "d open");
        assert!(t.last_of(Role::Defense, Phase::Rebuttal).is_none());
        assert_eq!(t.arguments().count(), 2);
        assert_eq!(t.roles(), vec![Role::Researcher, Role::Prosecutor, Role::Defense]);
    }

    #[test]
    fn test_digest_ignores_timestamps() {
        let mut a = Transcript::new();
        a.push(ArgumentTurn::new(Role::Prosecutor, Phase::Opening, "same".into()));
        std::thread::sleep(std::time::Duration::from_millis(2));
        let mut b = Transcript::new();
        b.push(ArgumentTurn::new(Role::Prosecutor, Phase::Opening, "same".into()));
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn test_turn_extracts_citations() {
        let turn = ArgumentTurn::new(
            Role::Prosecutor,
            Phase::Opening,
            "Under the DTSA, 18 U.S.C. § 1836, and Waymo v. Uber, the claim stands.".into(),
        );
        assert!(turn.cited_authorities.iter().any(|a| a.starts_with("DTSA")));
        assert!(turn.cited_authorities.iter().any(|a| a.contains("Waymo v. Uber")));
    }
}
