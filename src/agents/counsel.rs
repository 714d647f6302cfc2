use crate::agents::{bullet_section, case_factors_block, Degradation, TurnOutcome};
use crate::evidence::{EvidencePacket, EvidenceStrength};
use crate::reasoner::{GenerationParams, Prompt, Reasoner};
use crate::strategy::Strategy;
use crate::transcript::{Phase, Role};

const PROSECUTION_GUIDE: &str = "When making arguments:
1. Cite specific statutes (DTSA, UTSA) and their relevant provisions
2. Reference case precedents with full citations
3. Connect facts directly to legal standards
4. Address burden of proof requirements
5. Propose specific remedies and damages";

const DEFENSE_GUIDE: &str = "When making defense arguments:
1. Challenge whether the information qualifies as a trade secret
2. Question whether reasonable secrecy measures were taken
3. Dispute misappropriation or improper acquisition
4. Highlight missing statutory elements
5. Cite precedents where similar claims failed
6. Offer alternative explanations for the defendant's conduct";

/// Prosecutor or defense counsel.
#[derive(Debug, Clone)]
pub struct Counsel {
    role: Role,
    strategy: Strategy,
    /// Arguments this counsel has made, oldest first.
    own: Vec<String>,
    /// Opposing arguments this counsel has answered, oldest first.
    opposing: Vec<String>,
}

impl Counsel {
    pub fn prosecutor(strategy: Strategy) -> Self {
        Self {
            role: Role::Prosecutor,
            strategy,
            own: Vec::new(),
            opposing: Vec::new(),
        }
    }

    pub fn defense(strategy: Strategy) -> Self {
        Self {
            role: Role::Defense,
            strategy,
            own: Vec::new(),
            opposing: Vec::new(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn own_arguments(&self) -> &[String] {
        &self.own
    }

    pub fn opposing_arguments(&self) -> &[String] {
        &self.opposing
    }

    pub fn instructions(&self) -> String {
        let framing = match (self.role, self.strategy) {
            (Role::Prosecutor, Strategy::Aggressive) => "You are an aggressive prosecutor arguing trade secret misappropriation. You press every piece of evidence, cite every supporting precedent, and seek the harshest remedies. Read the facts in the light most favorable to the plaintiff.",
            (Role::Prosecutor, Strategy::Moderate) => "You are a balanced prosecutor arguing trade secret misappropriation. Present the evidence fairly but firmly, cite precedents where they fit, and seek reasonable remedies.",
            (Role::Prosecutor, Strategy::Conservative) => "You are a cautious prosecutor arguing trade secret misappropriation. Rely only on the clearest evidence and the most directly relevant precedents, seek modest remedies, and acknowledge weaknesses.",
            (_, Strategy::Aggressive) => "You are an aggressive defense attorney fighting trade secret claims. Challenge every piece of evidence, distinguish every precedent, and argue for complete dismissal.",
            (_, Strategy::Moderate) => "You are a balanced defense attorney answering trade secret claims. Challenge weak evidence, distinguish unfavorable precedents where appropriate, and seek a fair outcome.",
            (_, Strategy::Conservative) => "You are a measured defense attorney handling trade secret claims. Concede strong evidence while exposing gaps, and seek to narrow the claims rather than dismiss them.",
        };
        let guide = if self.role == Role::Prosecutor {
            PROSECUTION_GUIDE
        } else {
            DEFENSE_GUIDE
        };
        format!("{}\n\n{}", framing, guide)
    }

    fn params(&self) -> GenerationParams {
        GenerationParams {
            temperature: 0.3,
            ..GenerationParams::default()
        }
    }

    fn evidence_summary(&self, evidence: &EvidencePacket) -> String {
        let mut out = case_factors_block(evidence);
        if self.role == Role::Prosecutor {
            let statutes: Vec<String> = evidence
                .statutes
                .iter()
                .map(|s| format!("{}: {}", s.citation, s.title))
                .collect();
            bullet_section(&mut out, "APPLICABLE STATUTES", &statutes, 3);
            let precedents: Vec<String> = evidence
                .precedents
                .iter()
                .map(|p| match p.year {
                    Some(year) => format!("{} ({}): {}", p.case_name, year, p.relevance),
                    None => format!("{}: {}", p.case_name, p.relevance),
                })
                .collect();
            bullet_section(&mut out, "RELEVANT PRECEDENTS", &precedents, 3);
            bullet_section(&mut out, "KEY FACTS", &evidence.facts, 5);
            bullet_section(&mut out, "PLAINTIFF CLAIMS", &evidence.plaintiff_claims, usize::MAX);
        } else {
            let mut weaknesses = Vec::new();
            if !evidence.has_nda {
                weaknesses.push("No confidentiality agreement was signed".to_string());
            }
            if evidence.evidence_strength != EvidenceStrength::Strong {
                weaknesses.push(format!(
                    "Evidence is {} and may not carry the burden of proof",
                    evidence.evidence_strength
                ));
            }
            bullet_section(&mut out, "FAVORABLE DEFENSE FACTORS", &weaknesses, usize::MAX);
            let precedents: Vec<String> = evidence
                .precedents
                .iter()
                .filter(|p| {
                    let r = p.relevance.to_lowercase();
                    r.contains("dismiss") || r.contains("fail")
                })
                .map(|p| format!("{}: {}", p.case_name, p.relevance))
                .collect();
            bullet_section(&mut out, "DEFENSIVE PRECEDENTS", &precedents, usize::MAX);
            bullet_section(&mut out, "DEFENDANT'S POSITION", &evidence.defendant_claims, usize::MAX);
            bullet_section(&mut out, "DISPUTED FACTS", &evidence.disputed_facts, usize::MAX);
        }
        out
    }

    async fn ask(&mut self, reasoner: &dyn Reasoner, phase: Phase, context: String) -> TurnOutcome {
        let prompt = Prompt {
            role: self.role,
            phase,
            instructions: self.instructions(),
            context,
            params: self.params(),
        };
        match reasoner.generate(&prompt).await {
            Ok(text) => {
                self.own.push(text.clone());
                TurnOutcome::ok(text)
            }
            Err(e) => TurnOutcome::degraded(Degradation::Reasoner(e)),
        }
    }

    pub async fn produce_opening(&mut self, reasoner: &dyn Reasoner, evidence: &EvidencePacket) -> TurnOutcome {
        let ask = if self.role == Role::Prosecutor {
            "Make the opening argument for trade secret misappropriation. State the plaintiff's core claims, cite the DTSA/UTSA provisions and supporting precedents, highlight the key evidence, and preview the remedies sought."
        } else {
            "Make the opening argument for the defense. Challenge the plaintiff's ability to prove each element, highlight weaknesses in the record, cite precedents where similar claims failed, and offer alternative explanations."
        };
        let context = format!("{}\n\n{}", self.evidence_summary(evidence), ask);
        self.ask(reasoner, Phase::Opening, context).await
    }

    pub async fn produce_rebuttal(
        &mut self,
        reasoner: &dyn Reasoner,
        evidence: &EvidencePacket,
        opponent_text: &str,
    ) -> TurnOutcome {
        let mut context = self.evidence_summary(evidence);
        for (heading, args) in [("YOUR EARLIER ARGUMENTS", &self.own), ("OPPOSING ARGUMENTS ALREADY ANSWERED", &self.opposing)] {
            if args.is_empty() {
                continue;
            }
            context.push_str("\n\n");
            context.push_str(heading);
            context.push(':');
            for (i, arg) in args.iter().enumerate() {
                context.push_str(&format!("\n[{}] {}", i + 1, arg));
            }
        }
        let opponent = if self.role == Role::Prosecutor { "defense" } else { "prosecution" };
        context.push_str(&format!(
            "\n\nThe {} has argued:\n{}\n\nRebut it directly: address each claim, distinguish their authorities, and reinforce your strongest points. Keep it concise.",
            opponent, opponent_text
        ));
        self.opposing.push(opponent_text.to_string());
        self.ask(reasoner, Phase::Rebuttal, context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReasonerError;
    use crate::reasoner::{ScriptedReasoner, ScriptedReply};

    #[test]
    fn test_framing_depends_only_on_strategy() {
        let a = Counsel::prosecutor(Strategy::Aggressive).instructions();
        let b = Counsel::prosecutor(Strategy::Aggressive).instructions();
        let c = Counsel::prosecutor(Strategy::Conservative).instructions();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.contains("aggressive"));
        assert!(Counsel::defense(Strategy::Conservative).instructions().contains("measured"));
    }

    #[tokio::test]
    async fn test_opening_records_history() {
        let reasoner = ScriptedReasoner::with_verdict("plaintiff", 0.7);
        let packet = EvidencePacket::builder("case").build();
        let mut counsel = Counsel::prosecutor(Strategy::Moderate);
        let turn = counsel.produce_opening(&reasoner, &packet).await;
        assert!(!turn.is_degraded());
        assert_eq!(counsel.own_arguments().len(), 1);
        assert!(counsel.opposing_arguments().is_empty());
    }

    #[tokio::test]
    async fn test_rebuttal_sees_opponent() {
        let reasoner = ScriptedReasoner::from_fn(|p| ScriptedReply::Text(p.context.clone()));
        let packet = EvidencePacket::builder("case").build();
        let mut counsel = Counsel::defense(Strategy::Moderate);
        let turn = counsel.produce_rebuttal(&reasoner, &packet, "the secrets were taken").await;
        assert!(turn.content.contains("The prosecution has argued:\nthe secrets were taken"));
        assert_eq!(counsel.own_arguments().len(), 1);
        assert_eq!(counsel.opposing_arguments(), ["the secrets were taken"]);
    }

    #[tokio::test]
    async fn test_rebuttal_separates_own_and_opposing_history() {
        let reasoner = ScriptedReasoner::from_fn(|p| match p.phase {
            Phase::Opening => ScriptedReply::Text("defense opening".to_string()),
            _ if p.context.contains("second prosecution point") => ScriptedReply::Text(p.context.clone()),
            _ => ScriptedReply::Text("defense rebuttal".to_string()),
        });
        let packet = EvidencePacket::builder("case").build();
        let mut counsel = Counsel::defense(Strategy::Moderate);
        counsel.produce_opening(&reasoner, &packet).await;
        counsel.produce_rebuttal(&reasoner, &packet, "first prosecution point").await;
        let turn = counsel.produce_rebuttal(&reasoner, &packet, "second prosecution point").await;
        let own = turn.content.find("YOUR EARLIER ARGUMENTS:\n[1] defense opening").unwrap();
        let heard = turn.content.find("OPPOSING ARGUMENTS ALREADY ANSWERED:\n[1] first prosecution point").unwrap();
        assert!(own < heard);
        let own_section = &turn.content[own..heard];
        assert!(own_section.contains("[2] defense rebuttal"));
        assert!(!own_section.contains("prosecution point"));
    }

    #[tokio::test]
    async fn test_failure_is_degraded_not_raised() {
        let reasoner = ScriptedReasoner::from_fn(|_| ScriptedReply::Fail(ReasonerError::Unavailable("down".into())));
        let packet = EvidencePacket::builder("case").build();
        let mut counsel = Counsel::prosecutor(Strategy::Aggressive);
        let turn = counsel.produce_opening(&reasoner, &packet).await;
        assert!(turn.is_degraded());
        assert!(turn.content.is_empty());
        assert!(counsel.own_arguments().is_empty());
    }
}
