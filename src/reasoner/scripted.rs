use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::ReasonerError;
use crate::reasoner::{Prompt, Reasoner};
use crate::transcript::{Phase, Role};

/// What a scripted backend answers for one prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedReply {
    Text(String),
    Fail(ReasonerError),
}

type Responder = Box<dyn Fn(&Prompt) -> ScriptedReply + Send + Sync>;

/// Deterministic backend driven by a closure. Records every call it receives.
pub struct ScriptedReasoner {
    responder: Responder,
    calls: Mutex<Vec<(Role, Phase)>>,
}

impl ScriptedReasoner {
    pub fn from_fn<F>(responder: F) -> Self
    where
        F: Fn(&Prompt) -> ScriptedReply + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Advocates answer with a numbered argument derived from the prompt; the judge
    /// always returns a JSON verdict for `winner` with `confidence`.
    pub fn with_verdict(winner: &'static str, confidence: f64) -> Self {
        Self::from_fn(move |prompt| match prompt.role {
            Role::Judge => ScriptedReply::Text(verdict_json(winner, confidence)),
            _ => ScriptedReply::Text(canned_argument(prompt)),
        })
    }

    /// Like `with_verdict`, but every call for `role` in `phase` fails with `error`.
    pub fn failing(role: Role, phase: Phase, error: ReasonerError, winner: &'static str) -> Self {
        Self::from_fn(move |prompt| {
            if prompt.role == role && prompt.phase == phase {
                ScriptedReply::Fail(error.clone())
            } else if prompt.role == Role::Judge {
                ScriptedReply::Text(verdict_json(winner, 0.8))
            } else {
                ScriptedReply::Text(canned_argument(prompt))
            }
        })
    }

    pub fn calls(&self) -> Vec<(Role, Phase)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls().len()
    }

    pub fn count(&self, role: Role, phase: Phase) -> usize {
        self.calls()
            .iter()
            .filter(|(r, p)| *r == role && *p == phase)
            .count()
    }
}

pub fn verdict_json(winner: &str, confidence: f64) -> String {
    serde_json::json!({
        "winner": winner,
        "confidence": confidence,
        "key_factors": ["NDA coverage", "Access logs"],
        "cited_authorities": ["18 U.S.C. § 1836"],
        "rationale": format!("The court finds for the {}.", winner),
    })
    .to_string()
}

fn canned_argument(prompt: &Prompt) -> String {
    let framing = prompt.instructions.lines().next().unwrap_or_default().trim();
    format!(
        "{} {} argument.\n{}\n1. The DTSA elements are addressed.\n2. Context length {}.",
        prompt.role,
        prompt.phase,
        framing,
        prompt.context.len()
    )
}

#[async_trait]
impl Reasoner for ScriptedReasoner {
    async fn generate(&self, prompt: &Prompt) -> Result<String, ReasonerError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((prompt.role, prompt.phase));
        }
        match (self.responder)(prompt) {
            ScriptedReply::Text(text) => Ok(text),
            ScriptedReply::Fail(err) => Err(err),
        }
    }
}
