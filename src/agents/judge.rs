use serde_json::Value;

use crate::agents::{case_factors_block, bullet_section, Degradation, TurnOutcome};
use crate::evidence::EvidencePacket;
use crate::extract::{extract_authorities, extract_json_object, extract_labelled_list, extract_number_after};
use crate::reasoner::{GenerationParams, Prompt, Reasoner};
use crate::strategy::Temperament;
use crate::transcript::{ArgumentTurn, Phase, Role};
use crate::verdict::{Outcome, Verdict};

const BENCH_GUIDE: &str = "When evaluating the case:
1. Apply the preponderance of the evidence standard
2. Work through the statutory elements in order
3. Weigh precedent by how closely it fits
4. Assess the credibility and strength of the evidence
5. Give clear reasons for the decision";

const RULING_FORMAT: &str = "Respond with a JSON object:
{\"winner\": \"plaintiff\" or \"defendant\", \"confidence\": number between 0 and 1, \"key_factors\": [..], \"cited_authorities\": [..], \"rationale\": \"two or three paragraphs\"}";

const DEFAULT_KEY_FACTORS: [&str; 2] = ["Evidence strength", "Legal precedent"];

const PLAINTIFF_PHRASES: &[&str] = &[
    "plaintiff wins",
    "plaintiff win",
    "plaintiff prevails",
    "find for the plaintiff",
    "finds for the plaintiff",
    "judgment for the plaintiff",
];

const DEFENDANT_PHRASES: &[&str] = &[
    "defendant wins",
    "defendant win",
    "defendant prevails",
    "defense prevails",
    "find for the defendant",
    "finds for the defendant",
    "judgment for the defendant",
];

// Leaning phrases; only consulted when no decisive phrase is present.
const PLAINTIFF_LEANS: &[&str] = &["in favor of the plaintiff", "rules for the plaintiff"];
const DEFENDANT_LEANS: &[&str] = &["in favor of the defendant", "in favor of the defense", "rules for the defendant"];

#[derive(Debug, Clone)]
pub struct JudgeAgent {
    temperament: Temperament,
    fallback_confidence: f64,
    history: Vec<String>,
}

/// The judge's turn plus the verdict it yields. A degraded ruling carries a failed verdict.
#[derive(Debug, Clone)]
pub struct Ruling {
    pub turn: TurnOutcome,
    pub verdict: Verdict,
}

impl JudgeAgent {
    pub fn new(temperament: Temperament, fallback_confidence: f64) -> Self {
        Self {
            temperament,
            fallback_confidence,
            history: Vec::new(),
        }
    }

    pub fn temperament(&self) -> Temperament {
        self.temperament
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn instructions(&self) -> String {
        let framing = match self.temperament {
            Temperament::Strict => "You are a strict federal judge who applies the law rigorously. You require strong evidence and a clear statutory violation, and you rely heavily on precedent and statutory text.",
            Temperament::Balanced => "You are a fair and even-handed judge who weighs every argument carefully, applying the statute consistently to the specific circumstances of the case.",
            Temperament::Lenient => "You are a judge who weighs broader equitable factors. You apply the law but also consider fairness, good faith and proportionality, and you may show flexibility in close cases.",
        };
        format!("{}\n\n{}", framing, BENCH_GUIDE)
    }

    fn case_summary(evidence: &EvidencePacket, arguments: &[&ArgumentTurn]) -> String {
        let mut out = case_factors_block(evidence);
        for (label, role) in [("PROSECUTION ARGUMENTS", Role::Prosecutor), ("DEFENSE ARGUMENTS", Role::Defense)] {
            out.push_str("\n\n");
            out.push_str(label);
            out.push(':');
            for turn in arguments.iter().filter(|t| t.role == role) {
                out.push_str(&format!("\n\n{}:\n{}", turn.phase.as_str().to_uppercase(), turn.content));
                if !turn.cited_authorities.is_empty() {
                    let cited: Vec<&str> = turn.cited_authorities.iter().take(3).map(String::as_str).collect();
                    out.push_str(&format!("\nAuthorities cited: {}", cited.join(", ")));
                }
            }
        }
        let law: Vec<String> = evidence
            .statutes
            .iter()
            .map(|s| format!("{}: {}", s.citation, s.title))
            .collect();
        bullet_section(&mut out, "APPLICABLE LAW", &law, 2);
        let precedents: Vec<String> = evidence
            .precedents
            .iter()
            .map(|p| format!("{}: {}", p.case_name, p.relevance))
            .collect();
        bullet_section(&mut out, "KEY PRECEDENTS", &precedents, 2);
        out
    }

    /// Rule on the arguments heard. Never raises: reasoner failures and
    /// replies without a determinable winner yield a failed verdict.
    pub async fn produce_verdict(
        &mut self,
        reasoner: &dyn Reasoner,
        evidence: &EvidencePacket,
        arguments: &[&ArgumentTurn],
    ) -> Ruling {
        self.history.extend(arguments.iter().map(|t| t.content.clone()));
        let context = format!(
            "{}\n\nDecide whether the plaintiff proved every element by a preponderance of the evidence.\n{}",
            Self::case_summary(evidence, arguments),
            RULING_FORMAT
        );
        let prompt = Prompt {
            role: Role::Judge,
            phase: Phase::Verdict,
            instructions: self.instructions(),
            context,
            params: GenerationParams {
                temperature: 0.2,
                ..GenerationParams::default()
            },
        };
        let text = match reasoner.generate(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                let reason = Degradation::Reasoner(e);
                return Ruling {
                    verdict: Verdict::failed(format!("verdict degraded: {}", reason)),
                    turn: TurnOutcome::degraded(reason),
                };
            }
        };
        match parse_verdict(&text, self.fallback_confidence) {
            Ok(verdict) => Ruling {
                turn: TurnOutcome::ok(text),
                verdict,
            },
            Err(reason) => Ruling {
                verdict: Verdict::failed(format!("verdict degraded: {}", reason)),
                turn: TurnOutcome::degraded(reason),
            },
        }
    }
}

/// Interpret a ruling: structured JSON first, keyword scan otherwise.
///
/// Numeric confidence is clamped into [0, 1]; a string ending in '%' is divided
/// by 100 first. A missing confidence takes `fallback_confidence`.
pub fn parse_verdict(text: &str, fallback_confidence: f64) -> Result<Verdict, Degradation> {
    if let Some(json) = extract_json_object(text) {
        if let Some(outcome) = json.get("winner").and_then(Value::as_str).and_then(outcome_from_label) {
            let confidence = json
                .get("confidence")
                .and_then(confidence_from_json)
                .filter(|c| c.is_finite())
                .unwrap_or(fallback_confidence);
            let key_factors = string_list(json.get("key_factors"));
            let mut cited = string_list(json.get("cited_authorities"));
            if cited.is_empty() {
                cited = extract_authorities(text);
            }
            let rationale = json
                .get("rationale")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| rationale_from_text(text));
            return Ok(Verdict::new(outcome, rationale, or_default_factors(key_factors), cited, confidence));
        }
    }

    let lower = text.to_lowercase();
    let outcome = match outcome_from_phrases(&lower, PLAINTIFF_PHRASES, DEFENDANT_PHRASES)? {
        Some(outcome) => outcome,
        None => outcome_from_phrases(&lower, PLAINTIFF_LEANS, DEFENDANT_LEANS)?
            .ok_or_else(|| Degradation::Unparseable("no winner found".into()))?,
    };
    let confidence = extract_number_after(text, "confidence")
        .filter(|c| c.is_finite())
        .unwrap_or(fallback_confidence);
    let mut key_factors = extract_labelled_list(text, "key factor", 5);
    key_factors.retain(|f| !f.is_empty());
    let mut cited = extract_authorities(text);
    cited.truncate(5);
    Ok(Verdict::new(
        outcome,
        rationale_from_text(text),
        or_default_factors(key_factors),
        cited,
        confidence,
    ))
}

fn outcome_from_phrases(
    lower: &str,
    plaintiff: &[&str],
    defendant: &[&str],
) -> Result<Option<Outcome>, Degradation> {
    let p = plaintiff.iter().any(|phrase| lower.contains(phrase));
    let d = defendant.iter().any(|phrase| lower.contains(phrase));
    match (p, d) {
        (true, false) => Ok(Some(Outcome::PlaintiffWin)),
        (false, true) => Ok(Some(Outcome::DefenseWin)),
        (true, true) => Err(Degradation::Unparseable("ruling names both parties as winner".into())),
        (false, false) => Ok(None),
    }
}

fn outcome_from_label(label: &str) -> Option<Outcome> {
    let l = label.trim().to_lowercase();
    if l.contains("plaintiff") || l.contains("prosecut") || l == "plaintiff_win" {
        Some(Outcome::PlaintiffWin)
    } else if l.contains("defen") {
        Some(Outcome::DefenseWin)
    } else {
        None
    }
}

fn confidence_from_json(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            match s.strip_suffix('%') {
                Some(pct) => pct.trim().parse::<f64>().ok().map(|p| p / 100.0),
                None => s.parse().ok(),
            }
        }
        _ => None,
    }
}

fn string_list(v: Option<&Value>) -> Vec<String> {
    match v {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

fn or_default_factors(factors: Vec<String>) -> Vec<String> {
    if factors.is_empty() {
        DEFAULT_KEY_FACTORS.iter().map(|s| s.to_string()).collect()
    } else {
        factors
    }
}

// First substantial paragraph, else the first 500 characters.
fn rationale_from_text(text: &str) -> String {
    text.split("\n\n")
        .map(str::trim)
        .find(|p| p.len() > 100)
        .map(str::to_string)
        .unwrap_or_else(|| text.trim().chars().take(500).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReasonerError;
    use crate::reasoner::{ScriptedReasoner, ScriptedReply};

    #[test]
    fn test_parse_json_verdict() {
        let text = r#"Having weighed the record:
{"winner": "plaintiff", "confidence": 0.82, "key_factors": ["NDA signed"], "cited_authorities": ["18 U.S.C. § 1836"], "rationale": "Secrets were taken."}"#;
        let v = parse_verdict(text, 0.5).unwrap();
        assert_eq!(v.outcome, Some(Outcome::PlaintiffWin));
        assert_eq!(v.confidence_score, 0.82);
        assert_eq!(v.key_factors, vec!["NDA signed"]);
        assert_eq!(v.rationale, "Secrets were taken.");
    }

    #[test]
    fn test_out_of_range_confidence_is_clamped() {
        let high = parse_verdict(r#"{"winner": "defendant", "confidence": 1.5}"#, 0.5).unwrap();
        assert_eq!(high.confidence_score, 1.0);
        assert_eq!(high.outcome, Some(Outcome::DefenseWin));
        let low = parse_verdict(r#"{"winner": "plaintiff", "confidence": -0.2}"#, 0.5).unwrap();
        assert_eq!(low.confidence_score, 0.0);
    }

    #[test]
    fn test_percent_string_confidence() {
        let v = parse_verdict(r#"{"winner": "plaintiff", "confidence": "85%"}"#, 0.5).unwrap();
        assert!((v.confidence_score - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_missing_confidence_uses_fallback() {
        let v = parse_verdict(r#"{"winner": "plaintiff"}"#, 0.5).unwrap();
        assert_eq!(v.confidence_score, 0.5);
        assert_eq!(v.key_factors, vec!["Evidence strength", "Legal precedent"]);
        let v = parse_verdict("The court finds for the defendant.", 0.6).unwrap();
        assert_eq!(v.confidence_score, 0.6);
    }

    #[test]
    fn test_keyword_fallback() {
        let text = "After review, the court finds for the plaintiff.\nConfidence: 75%\nKey factors:\n- Signed NDA\n- Download logs\n\nSee Kewanee v. Bicron.";
        let v = parse_verdict(text, 0.5).unwrap();
        assert_eq!(v.outcome, Some(Outcome::PlaintiffWin));
        assert!((v.confidence_score - 0.75).abs() < 1e-9);
        assert_eq!(v.key_factors, vec!["Signed NDA", "Download logs"]);
        assert!(v.cited_authorities.iter().any(|a| a == "Kewanee v. Bicron"));
    }

    #[test]
    fn test_no_winner_is_unparseable() {
        assert!(matches!(
            parse_verdict("The matter is complex.", 0.5),
            Err(Degradation::Unparseable(_))
        ));
        assert!(parse_verdict("plaintiff prevails; defendant prevails", 0.5).is_err());
    }

    #[test]
    fn test_decisive_phrase_outranks_leaning_phrase() {
        let text = "Although the access logs weigh in favor of the plaintiff, the court finds for the defendant.";
        let v = parse_verdict(text, 0.5).unwrap();
        assert_eq!(v.outcome, Some(Outcome::DefenseWin));
        let v = parse_verdict("On balance the record is in favor of the plaintiff.", 0.5).unwrap();
        assert_eq!(v.outcome, Some(Outcome::PlaintiffWin));
        assert!(parse_verdict("Some facts are in favor of the plaintiff, others in favor of the defendant.", 0.5).is_err());
    }

    #[test]
    fn test_non_finite_confidence_uses_fallback() {
        let v = parse_verdict(r#"{"winner": "plaintiff", "confidence": "NaN"}"#, 0.6).unwrap();
        assert_eq!(v.confidence_score, 0.6);
        let v = parse_verdict(r#"{"winner": "defendant", "confidence": "inf"}"#, 0.55).unwrap();
        assert_eq!(v.confidence_score, 0.55);
    }

    #[tokio::test]
    async fn test_reasoner_failure_yields_failed_verdict() {
        let reasoner = ScriptedReasoner::from_fn(|_| ScriptedReply::Fail(ReasonerError::Timeout(100)));
        let packet = EvidencePacket::builder("case").build();
        let mut judge = JudgeAgent::new(Temperament::Strict, 0.5);
        let ruling = judge.produce_verdict(&reasoner, &packet, &[]).await;
        assert!(ruling.turn.is_degraded());
        assert!(ruling.verdict.is_failed());
        assert_eq!(ruling.verdict.confidence_score, 0.0);
    }

    #[test]
    fn test_temperament_framing() {
        assert!(JudgeAgent::new(Temperament::Strict, 0.5).instructions().contains("strict"));
        assert!(JudgeAgent::new(Temperament::Lenient, 0.5).instructions().contains("equitable"));
        let balanced = JudgeAgent::new(Temperament::Balanced, 0.5).instructions();
        assert!(!balanced.contains("strict") && !balanced.contains("equitable"));
    }
}
