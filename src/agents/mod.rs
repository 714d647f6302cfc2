//! Role agents: thin policies over the shared reasoner.
//!
//! Strategy and temperament only pick the instruction framing. The one piece of
//! state an agent carries between calls is the argument history it has seen.

use std::fmt;

use crate::error::ReasonerError;
use crate::evidence::EvidencePacket;
use crate::strategy::StrategyAssignment;
use crate::transcript::{Phase, Role};

mod clerk;
mod counsel;
mod judge;

pub use clerk::{CaseAnalysis, Clerk};
pub(crate) use clerk::mentions_nda;
pub use counsel::Counsel;
pub use judge::{parse_verdict, JudgeAgent, Ruling};

/// Why a turn produced no usable content.
#[derive(Debug, Clone, PartialEq)]
pub enum Degradation {
    Reasoner(ReasonerError),
    /// The reply could not be interpreted (e.g. no winner in a ruling).
    Unparseable(String),
    /// The agent was asked to act in a phase its role has no part in.
    OutOfTurn { role: Role, phase: Phase },
}

impl fmt::Display for Degradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Degradation::Reasoner(e) => write!(f, "{}", e),
            Degradation::Unparseable(why) => write!(f, "unparseable reply: {}", why),
            Degradation::OutOfTurn { role, phase } => write!(f, "{} has no turn in the {} phase", role, phase),
        }
    }
}

/// Result of one agent turn. A degraded turn has empty content.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub content: String,
    pub degraded: Option<Degradation>,
}

impl TurnOutcome {
    pub fn ok(content: String) -> Self {
        Self { content, degraded: None }
    }

    pub fn degraded(reason: Degradation) -> Self {
        Self {
            content: String::new(),
            degraded: Some(reason),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }
}

/// One participant of a trial.
#[derive(Debug, Clone)]
pub enum RoleAgent {
    Prosecutor(Counsel),
    Defense(Counsel),
    Judge(JudgeAgent),
    Researcher(Clerk),
}

impl RoleAgent {
    pub fn role(&self) -> Role {
        match self {
            RoleAgent::Prosecutor(_) => Role::Prosecutor,
            RoleAgent::Defense(_) => Role::Defense,
            RoleAgent::Judge(_) => Role::Judge,
            RoleAgent::Researcher(_) => Role::Researcher,
        }
    }

    pub fn instructions(&self) -> String {
        match self {
            RoleAgent::Prosecutor(c) | RoleAgent::Defense(c) => c.instructions(),
            RoleAgent::Judge(j) => j.instructions(),
            RoleAgent::Researcher(c) => c.instructions(),
        }
    }

    /// Fresh agents for one trial, in speaking order.
    pub fn cast(assignment: &StrategyAssignment, fallback_confidence: f64) -> [RoleAgent; 3] {
        [
            RoleAgent::Prosecutor(Counsel::prosecutor(assignment.prosecutor_strategy)),
            RoleAgent::Defense(Counsel::defense(assignment.defense_strategy)),
            RoleAgent::Judge(JudgeAgent::new(assignment.judge_temperament, fallback_confidence)),
        ]
    }
}

/// Case factor lines shared by every prompt. Backends key on these labels.
pub fn case_factors_block(evidence: &EvidencePacket) -> String {
    format!(
        "CASE: {}\nJURISDICTION: {}\n\nCASE FACTORS:\n- NDA Present: {}\n- Evidence Strength: {}\n- Venue: {}",
        evidence.case_description,
        evidence.jurisdiction,
        evidence.has_nda,
        evidence.evidence_strength,
        evidence.venue_bias
    )
}

pub(crate) fn bullet_section(out: &mut String, heading: &str, items: &[String], max: usize) {
    if items.is_empty() {
        return;
    }
    out.push_str("\n\n");
    out.push_str(heading);
    out.push(':');
    for item in items.iter().take(max) {
        out.push_str("\n- ");
        out.push_str(item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::{EvidenceStrength, VenueBias};
    use crate::strategy::{Strategy, Temperament};

    #[test]
    fn test_cast_roles_in_order() {
        let a = StrategyAssignment {
            prosecutor_strategy: Strategy::Aggressive,
            defense_strategy: Strategy::Conservative,
            judge_temperament: Temperament::Strict,
        };
        let roles: Vec<Role> = RoleAgent::cast(&a, 0.5).iter().map(|r| r.role()).collect();
        assert_eq!(roles, vec![Role::Prosecutor, Role::Defense, Role::Judge]);
    }

    #[test]
    fn test_case_factor_labels() {
        let p = EvidencePacket::builder("Engineer left with source code")
            .has_nda(true)
            .evidence_strength(EvidenceStrength::Strong)
            .venue_bias(VenueBias::DefendantFriendly)
            .build();
        let block = case_factors_block(&p);
        assert!(block.contains("NDA Present: true"));
        assert!(block.contains("Evidence Strength: strong"));
        assert!(block.contains("Venue: defendant-friendly"));
    }

    #[test]
    fn test_degraded_turn_is_empty() {
        let t = TurnOutcome::degraded(Degradation::Reasoner(ReasonerError::Timeout(5)));
        assert!(t.is_degraded());
        assert!(t.content.is_empty());
    }
}
