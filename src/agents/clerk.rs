use crate::agents::{Degradation, TurnOutcome};
use crate::evidence::{EvidenceStrength, Jurisdiction, VenueBias};
use crate::extract::extract_labelled_list;
use crate::reasoner::{GenerationParams, Prompt, Reasoner};
use crate::transcript::{Phase, Role};

const NDA_NEGATIONS: &[&str] = &[
    "no nda",
    "without an nda",
    "never signed an nda",
    "did not sign an nda",
    "no confidentiality",
    "without a confidentiality",
    "not bound by",
];

/// Structured reading of a free-text case description.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseAnalysis {
    pub legal_issues: Vec<String>,
    pub key_facts: Vec<String>,
    pub has_nda: bool,
    pub evidence_strength: EvidenceStrength,
    pub venue_bias: VenueBias,
    pub plaintiff_claims: Vec<String>,
    pub defendant_claims: Vec<String>,
    pub disputed_facts: Vec<String>,
}

impl CaseAnalysis {
    /// Scan analysis text (or the raw description) for case factors and lists.
    pub fn from_text(text: &str) -> Self {
        let lower = text.to_lowercase();
        Self {
            legal_issues: extract_labelled_list(text, "legal issue", 5),
            key_facts: extract_labelled_list(text, "key fact", 5),
            has_nda: nda_answer(&lower).unwrap_or_else(|| mentions_nda(&lower)),
            evidence_strength: strength_from(&lower),
            venue_bias: venue_from(&lower),
            plaintiff_claims: extract_labelled_list(text, "plaintiff claim", 5),
            defendant_claims: extract_labelled_list(text, "defendant claim", 5),
            disputed_facts: extract_labelled_list(text, "disputed fact", 5),
        }
    }
}

/// Free-text NDA reading: any agreement mention not negated elsewhere.
pub(crate) fn mentions_nda(lower: &str) -> bool {
    let mentioned = lower
        .split(|c: char| !c.is_alphanumeric())
        .any(|w| w == "nda" || w == "ndas")
        || lower.contains("confidential");
    mentioned && !NDA_NEGATIONS.iter().any(|n| lower.contains(n))
}

// An explicit "NDA: yes" / "NDA: no" answer line.
fn nda_answer(lower: &str) -> Option<bool> {
    lower.lines().find_map(|line| {
        let value = line.trim().trim_start_matches(['-', '*']).trim_start().strip_prefix("nda:")?;
        let value = value.trim();
        if value.starts_with("yes") || value.starts_with("true") {
            Some(true)
        } else if value.starts_with("no") || value.starts_with("false") {
            Some(false)
        } else {
            None
        }
    })
}

fn strength_from(lower: &str) -> EvidenceStrength {
    // A labelled answer wins over stray adjectives elsewhere in the text.
    let head: String = match lower.find("evidence strength") {
        Some(idx) => lower[idx..].chars().take(48).collect(),
        None => lower.to_string(),
    };
    if head.contains("strong") {
        EvidenceStrength::Strong
    } else if head.contains("weak") {
        EvidenceStrength::Weak
    } else {
        EvidenceStrength::Moderate
    }
}

fn venue_from(lower: &str) -> VenueBias {
    if lower.contains("plaintiff-friendly") || lower.contains("plaintiff friendly") {
        VenueBias::PlaintiffFriendly
    } else if lower.contains("defendant-friendly") || lower.contains("defendant friendly") {
        VenueBias::DefendantFriendly
    } else {
        VenueBias::Neutral
    }
}

/// The researcher role: reads the case before evidence is gathered.
#[derive(Debug, Clone, Default)]
pub struct Clerk;

impl Clerk {
    pub fn instructions(&self) -> String {
        "You are a legal research coordinator preparing case evidence for a trade secret dispute. Identify the legal issues, relevant statutes (DTSA, UTSA) and precedents to research, and extract the key facts and each side's claims.".to_string()
    }

    pub async fn analyse(
        &self,
        reasoner: &dyn Reasoner,
        description: &str,
        jurisdiction: &Jurisdiction,
    ) -> (TurnOutcome, CaseAnalysis) {
        let context = format!(
            "Analyze this case ({} jurisdiction):\n\n{}\n\nProvide, each under its own label:\nLegal issues: (list)\nKey facts: (list)\nNDA: yes or no, whether an NDA or confidentiality agreement exists\nEvidence strength: weak, moderate or strong\nVenue bias if mentioned: plaintiff-friendly, defendant-friendly or neutral\nPlaintiff claims: (list)\nDefendant claims: (list)\nDisputed facts: (list)",
            jurisdiction, description
        );
        let prompt = Prompt {
            role: Role::Researcher,
            phase: Phase::Research,
            instructions: self.instructions(),
            context,
            params: GenerationParams::default(),
        };
        match reasoner.generate(&prompt).await {
            Ok(text) => {
                let analysis = CaseAnalysis::from_text(&text);
                (TurnOutcome::ok(text), analysis)
            }
            Err(e) => (
                TurnOutcome::degraded(Degradation::Reasoner(e)),
                CaseAnalysis::from_text(description),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReasonerError;
    use crate::reasoner::{ScriptedReasoner, ScriptedReply};

    #[test]
    fn test_analysis_from_structured_text() {
        let text = "Legal issues:\n- Trade secret status\n- Reasonable measures\nKey facts:\n- Downloaded 10,000 files\nNDA: signed in 2019\nEvidence strength: strong\nVenue: plaintiff-friendly district\nPlaintiff claims:\n- Misappropriation under DTSA";
        let a = CaseAnalysis::from_text(text);
        assert_eq!(a.legal_issues, vec!["Trade secret status", "Reasonable measures"]);
        assert_eq!(a.key_facts, vec!["Downloaded 10,000 files"]);
        assert!(a.has_nda);
        assert_eq!(a.evidence_strength, EvidenceStrength::Strong);
        assert_eq!(a.venue_bias, VenueBias::PlaintiffFriendly);
        assert_eq!(a.plaintiff_claims, vec!["Misappropriation under DTSA"]);
    }

    #[test]
    fn test_negated_nda() {
        let a = CaseAnalysis::from_text("The engineer never signed an NDA. Evidence strength: weak.");
        assert!(!a.has_nda);
        assert_eq!(a.evidence_strength, EvidenceStrength::Weak);
        assert_eq!(a.venue_bias, VenueBias::Neutral);
    }

    #[test]
    fn test_explicit_nda_answer_wins() {
        let a = CaseAnalysis::from_text("Confidentiality: discussed at hiring\nNDA: no");
        assert!(!a.has_nda);
        let a = CaseAnalysis::from_text("- NDA: yes, signed on day one");
        assert!(a.has_nda);
        // "none" is an answer too
        assert!(!CaseAnalysis::from_text("NDA: none found").has_nda);
        assert!(!mentions_nda("the standard calendar"));
    }

    #[tokio::test]
    async fn test_failed_analysis_falls_back_to_description() {
        let reasoner = ScriptedReasoner::from_fn(|_| ScriptedReply::Fail(ReasonerError::Unavailable("x".into())));
        let (turn, analysis) = Clerk
            .analyse(&reasoner, "Engineer under a confidentiality agreement took files", &Jurisdiction::Federal)
            .await;
        assert!(turn.is_degraded());
        assert!(analysis.has_nda);
    }
}
