//! Per-run case factor variation.
//!
//! A batch may vary the facts of the case as well as the strategies. Each run
//! draws its own `CaseFactors` and derives a variant packet from the shared
//! base; the base is never touched.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::evidence::{EvidenceBuilder, EvidencePacket, EvidenceStrength, VenueBias};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cooperation {
    Hostile,
    Moderate,
    Cooperative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DamagesClaim {
    Minimal,
    Moderate,
    Extensive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompetitorRelationship {
    Direct,
    Indirect,
    #[serde(rename = "none")]
    Unrelated,
}

/// Months beyond which the departure gap is argued to weaken causation.
pub const LONG_GAP_MONTHS: u8 = 6;
/// Gaps up to this many months count as short in impact reports.
pub const SHORT_GAP_MONTHS: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CaseFactors {
    pub has_nda: bool,
    pub evidence_strength: EvidenceStrength,
    pub venue_bias: VenueBias,
    pub statutes_cited: usize,
    pub precedents_cited: usize,
    pub defendant_cooperation: Cooperation,
    pub damages_claim: DamagesClaim,
    pub months_since_departure: u8,
    pub competitor_relationship: CompetitorRelationship,
}

impl CaseFactors {
    /// Weighted draw: NDA 2/3 of the time, moderate evidence and neutral venue twice as
    /// likely as either extreme, direct competition half the time.
    pub fn sample<R: Rng + ?Sized>(rng: &mut R) -> Self {
        const STRENGTHS: [EvidenceStrength; 4] = [
            EvidenceStrength::Weak,
            EvidenceStrength::Moderate,
            EvidenceStrength::Moderate,
            EvidenceStrength::Strong,
        ];
        const VENUES: [VenueBias; 4] = [
            VenueBias::PlaintiffFriendly,
            VenueBias::Neutral,
            VenueBias::Neutral,
            VenueBias::DefendantFriendly,
        ];
        const COOPERATION: [Cooperation; 3] = [Cooperation::Hostile, Cooperation::Moderate, Cooperation::Cooperative];
        const DAMAGES: [DamagesClaim; 3] = [DamagesClaim::Minimal, DamagesClaim::Moderate, DamagesClaim::Extensive];
        const COMPETITORS: [CompetitorRelationship; 4] = [
            CompetitorRelationship::Direct,
            CompetitorRelationship::Direct,
            CompetitorRelationship::Indirect,
            CompetitorRelationship::Unrelated,
        ];
        Self {
            has_nda: rng.gen_range(0..3) < 2,
            evidence_strength: STRENGTHS[rng.gen_range(0..STRENGTHS.len())],
            venue_bias: VENUES[rng.gen_range(0..VENUES.len())],
            statutes_cited: rng.gen_range(2..=5),
            precedents_cited: rng.gen_range(2..=5),
            defendant_cooperation: COOPERATION[rng.gen_range(0..COOPERATION.len())],
            damages_claim: DAMAGES[rng.gen_range(0..DAMAGES.len())],
            months_since_departure: rng.gen_range(1..=12),
            competitor_relationship: COMPETITORS[rng.gen_range(0..COMPETITORS.len())],
        }
    }

    /// Derive the packet a run with these factors argues over.
    pub fn apply(&self, base: &EvidencePacket) -> EvidencePacket {
        let mut b = EvidenceBuilder::from_packet(base)
            .has_nda(self.has_nda)
            .evidence_strength(self.evidence_strength)
            .venue_bias(self.venue_bias)
            .truncate_authorities(self.statutes_cited, self.precedents_cited);
        b = match self.defendant_cooperation {
            Cooperation::Hostile => b.disputed_fact("Defendant refuses to cooperate with discovery"),
            Cooperation::Cooperative => b.fact("Defendant has cooperated with investigation"),
            Cooperation::Moderate => b,
        };
        if self.months_since_departure > LONG_GAP_MONTHS {
            b = b.defendant_claim(format!(
                "Significant time gap ({} months) weakens causation",
                self.months_since_departure
            ));
        }
        if self.competitor_relationship == CompetitorRelationship::Unrelated {
            b = b.defendant_claim("Companies are not direct competitors");
        }
        b.build()
    }
}
