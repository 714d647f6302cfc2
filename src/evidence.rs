//! Evidence packet: the immutable description of one case.
//!
//! A packet is built once (by research or by the caller) and then shared
//! read-only, behind an `Arc`, by every agent of every trial that uses it.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Jurisdiction {
    Federal,
    State,
    Named(String),
}

impl From<String> for Jurisdiction {
    fn from(s: String) -> Self {
        match s.trim().to_lowercase().as_str() {
            "" | "federal" => Jurisdiction::Federal,
            "state" => Jurisdiction::State,
            _ => Jurisdiction::Named(s.trim().to_string()),
        }
    }
}

impl From<&str> for Jurisdiction {
    fn from(s: &str) -> Self {
        Jurisdiction::from(s.to_string())
    }
}

impl From<Jurisdiction> for String {
    fn from(j: Jurisdiction) -> Self {
        j.to_string()
    }
}

impl fmt::Display for Jurisdiction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Jurisdiction::Federal => f.write_str("Federal"),
            Jurisdiction::State => f.write_str("State"),
            Jurisdiction::Named(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceStrength {
    Weak,
    Moderate,
    Strong,
}

impl EvidenceStrength {
    pub const ALL: [EvidenceStrength; 3] = [EvidenceStrength::Weak, EvidenceStrength::Moderate, EvidenceStrength::Strong];

    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceStrength::Weak => "weak",
            EvidenceStrength::Moderate => "moderate",
            EvidenceStrength::Strong => "strong",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VenueBias {
    PlaintiffFriendly,
    Neutral,
    DefendantFriendly,
}

impl VenueBias {
    pub const ALL: [VenueBias; 3] = [VenueBias::PlaintiffFriendly, VenueBias::Neutral, VenueBias::DefendantFriendly];

    pub fn as_str(&self) -> &'static str {
        match self {
            VenueBias::PlaintiffFriendly => "plaintiff-friendly",
            VenueBias::Neutral => "neutral",
            VenueBias::DefendantFriendly => "defendant-friendly",
        }
    }
}

impl fmt::Display for EvidenceStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for VenueBias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatuteRef {
    pub title: String,
    pub citation: String,
    #[serde(default)]
    pub section: String,
    #[serde(default)]
    pub relevance: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecedentRef {
    pub case_name: String,
    #[serde(default)]
    pub year: Option<u16>,
    #[serde(default)]
    pub citation: String,
    /// Holding or reason the case matters here.
    #[serde(default)]
    pub relevance: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidencePacket {
    pub case_description: String,
    pub jurisdiction: Jurisdiction,
    pub has_nda: bool,
    pub evidence_strength: EvidenceStrength,
    pub venue_bias: VenueBias,
    #[serde(default)]
    pub statutes: Vec<StatuteRef>,
    #[serde(default)]
    pub precedents: Vec<PrecedentRef>,
    #[serde(default)]
    pub facts: Vec<String>,
    #[serde(default)]
    pub plaintiff_claims: Vec<String>,
    #[serde(default)]
    pub defendant_claims: Vec<String>,
    #[serde(default)]
    pub disputed_facts: Vec<String>,
}

impl EvidencePacket {
    pub fn builder(case_description: impl Into<String>) -> EvidenceBuilder {
        EvidenceBuilder::new(case_description)
    }

    /// True when research produced neither statutes nor precedents.
    pub fn is_impoverished(&self) -> bool {
        self.statutes.is_empty() && self.precedents.is_empty()
    }

    /// SHA-256 over the canonical JSON encoding, hex encoded.
    pub fn digest(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }
}

/// Accumulates packet fields; `build` produces the immutable packet.
#[derive(Debug, Clone)]
pub struct EvidenceBuilder {
    packet: EvidencePacket,
}

impl EvidenceBuilder {
    pub fn new(case_description: impl Into<String>) -> Self {
        Self {
            packet: EvidencePacket {
                case_description: case_description.into(),
                jurisdiction: Jurisdiction::Federal,
                has_nda: false,
                evidence_strength: EvidenceStrength::Moderate,
                venue_bias: VenueBias::Neutral,
                statutes: Vec::new(),
                precedents: Vec::new(),
                facts: Vec::new(),
                plaintiff_claims: Vec::new(),
                defendant_claims: Vec::new(),
                disputed_facts: Vec::new(),
            },
        }
    }

    /// Start from an existing packet, e.g. to derive a per-run variant.
    pub fn from_packet(packet: &EvidencePacket) -> Self {
        Self { packet: packet.clone() }
    }

    pub fn jurisdiction(mut self, jurisdiction: impl Into<Jurisdiction>) -> Self {
        self.packet.jurisdiction = jurisdiction.into();
        self
    }

    pub fn has_nda(mut self, has_nda: bool) -> Self {
        self.packet.has_nda = has_nda;
        self
    }

    pub fn evidence_strength(mut self, strength: EvidenceStrength) -> Self {
        self.packet.evidence_strength = strength;
        self
    }

    pub fn venue_bias(mut self, bias: VenueBias) -> Self {
        self.packet.venue_bias = bias;
        self
    }

    pub fn statutes(mut self, statutes: Vec<StatuteRef>) -> Self {
        self.packet.statutes = statutes;
        self
    }

    pub fn precedents(mut self, precedents: Vec<PrecedentRef>) -> Self {
        self.packet.precedents = precedents;
        self
    }

    pub fn truncate_authorities(mut self, max_statutes: usize, max_precedents: usize) -> Self {
        self.packet.statutes.truncate(max_statutes);
        self.packet.precedents.truncate(max_precedents);
        self
    }

    pub fn fact(mut self, fact: impl Into<String>) -> Self {
        self.packet.facts.push(fact.into());
        self
    }

    pub fn facts(mut self, facts: Vec<String>) -> Self {
        self.packet.facts = facts;
        self
    }

    pub fn plaintiff_claim(mut self, claim: impl Into<String>) -> Self {
        self.packet.plaintiff_claims.push(claim.into());
        self
    }

    pub fn plaintiff_claims(mut self, claims: Vec<String>) -> Self {
        self.packet.plaintiff_claims = claims;
        self
    }

    pub fn defendant_claim(mut self, claim: impl Into<String>) -> Self {
        self.packet.defendant_claims.push(claim.into());
        self
    }

    pub fn defendant_claims(mut self, claims: Vec<String>) -> Self {
        self.packet.defendant_claims = claims;
        self
    }

    pub fn disputed_fact(mut self, fact: impl Into<String>) -> Self {
        self.packet.disputed_facts.push(fact.into());
        self
    }

    pub fn disputed_facts(mut self, facts: Vec<String>) -> Self {
        self.packet.disputed_facts = facts;
        self
    }

    pub fn build(self) -> EvidencePacket {
        self.packet
    }
}
