use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::ReasonerConfig;
use crate::error::ReasonerError;
use crate::transcript::{Phase, Role};

mod http;
mod offline;
mod scripted;

pub use http::HttpReasoner;
pub use offline::OfflineReasoner;
pub use scripted::{verdict_json, ScriptedReasoner, ScriptedReply};

/// Sampling parameters requested by a role policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerationParams {
    pub temperature: f64,
    pub max_output_tokens: u32,
    /// Per-trial sampling seed; backends that support one use it for reproducible output.
    pub seed: Option<u64>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_output_tokens: 2048,
            seed: None,
        }
    }
}

/// One request to the reasoning backend.
#[derive(Debug, Clone, Serialize)]
pub struct Prompt {
    pub role: Role,
    pub phase: Phase,
    /// Role framing (system instructions).
    pub instructions: String,
    /// Conversation context: evidence summary, history and the concrete ask.
    pub context: String,
    pub params: GenerationParams,
}

#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn generate(&self, prompt: &Prompt) -> Result<String, ReasonerError>;
}

/// Forwards to another backend with a fixed sampling seed stamped on every prompt.
pub struct SeededReasoner<'a> {
    inner: &'a dyn Reasoner,
    seed: u64,
}

impl<'a> SeededReasoner<'a> {
    pub fn new(inner: &'a dyn Reasoner, seed: u64) -> Self {
        Self { inner, seed }
    }
}

#[async_trait]
impl Reasoner for SeededReasoner<'_> {
    async fn generate(&self, prompt: &Prompt) -> Result<String, ReasonerError> {
        let mut seeded = prompt.clone();
        seeded.params.seed = Some(self.seed);
        self.inner.generate(&seeded).await
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReasonerKind {
    Http,
    Offline,
}

impl ReasonerKind {
    /// HTTP when an endpoint is configured, otherwise the offline backend.
    pub fn from_config(cfg: &ReasonerConfig) -> Self {
        if cfg.endpoint.is_some() {
            ReasonerKind::Http
        } else {
            ReasonerKind::Offline
        }
    }

    pub fn build(self, cfg: ReasonerConfig) -> anyhow::Result<Arc<dyn Reasoner>> {
        match self {
            ReasonerKind::Http => Ok(Arc::new(HttpReasoner::new(cfg)?)),
            ReasonerKind::Offline => Ok(Arc::new(OfflineReasoner::new(cfg.offline_seed))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_seeded_reasoner_stamps_seed() {
        let inner = ScriptedReasoner::from_fn(|p| ScriptedReply::Text(format!("{:?}", p.params.seed)));
        let seeded = SeededReasoner::new(&inner, 42);
        let prompt = Prompt {
            role: Role::Judge,
            phase: Phase::Verdict,
            instructions: String::new(),
            context: String::new(),
            params: GenerationParams::default(),
        };
        assert_eq!(seeded.generate(&prompt).await.unwrap(), "Some(42)");
        assert_eq!(inner.generate(&prompt).await.unwrap(), "None");
    }
}
