//! Single-trial state machine.
//!
//! RESEARCH (description input only) -> OPENING -> REBUTTAL (optional) -> VERDICT,
//! ending in COMPLETE, FAILED or CANCELLED. Phases run strictly in order; a
//! cancellation request is honoured at the next phase boundary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::agents::{CaseAnalysis, Clerk, Degradation, RoleAgent, Ruling, TurnOutcome};
use crate::config::Config;
use crate::error::{SimError, SimWarning};
use crate::evidence::{EvidencePacket, Jurisdiction};
use crate::logging::{
    log, log_audit, log_degraded_turn, log_phase, log_trial_failed, log_verdict, obj, v_str, Domain, Level,
    ProfileScope,
};
use crate::reasoner::{Reasoner, ReasonerKind, SeededReasoner};
use crate::research::{EvidencePreparer, HttpResearcher, Researcher, StaticResearcher};
use crate::strategy::{StrategyAssignment, StrategyRequestSet};
use crate::transcript::{ArgumentTurn, Phase, Role, Transcript};
use crate::verdict::Verdict;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TrialState {
    Research,
    Opening,
    Rebuttal,
    Verdict,
    Complete,
    Failed { phase: Phase, reason: String },
    Cancelled { phase: Phase },
}

impl TrialState {
    pub fn label(&self) -> &'static str {
        match self {
            TrialState::Research => "RESEARCH",
            TrialState::Opening => "OPENING",
            TrialState::Rebuttal => "REBUTTAL",
            TrialState::Verdict => "VERDICT",
            TrialState::Complete => "COMPLETE",
            TrialState::Failed { .. } => "FAILED",
            TrialState::Cancelled { .. } => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TrialState::Complete | TrialState::Failed { .. } | TrialState::Cancelled { .. }
        )
    }

    fn phase(&self) -> Option<Phase> {
        match self {
            TrialState::Research => Some(Phase::Research),
            TrialState::Opening => Some(Phase::Opening),
            TrialState::Rebuttal => Some(Phase::Rebuttal),
            TrialState::Verdict => Some(Phase::Verdict),
            _ => None,
        }
    }
}

/// Shared cancellation flag for a trial or a batch.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Trial input: a prepared packet (evidence injection) or a description to research.
#[derive(Debug, Clone)]
pub enum EvidenceSource {
    Packet(Arc<EvidencePacket>),
    Description { text: String, jurisdiction: Jurisdiction },
}

impl EvidenceSource {
    pub fn packet(packet: EvidencePacket) -> Self {
        EvidenceSource::Packet(Arc::new(packet))
    }

    pub fn description(text: impl Into<String>, jurisdiction: impl Into<Jurisdiction>) -> Self {
        EvidenceSource::Description {
            text: text.into(),
            jurisdiction: jurisdiction.into(),
        }
    }

    /// Command-line form: `@path.json` loads a packet, anything else is a description.
    pub fn from_arg(arg: &str, jurisdiction: &str) -> anyhow::Result<Self> {
        match arg.strip_prefix('@') {
            Some(path) => {
                let raw = std::fs::read_to_string(path).with_context(|| format!("reading packet {}", path))?;
                let packet: EvidencePacket =
                    serde_json::from_str(&raw).with_context(|| format!("parsing packet {}", path))?;
                Ok(Self::packet(packet))
            }
            None => Ok(Self::description(arg, jurisdiction)),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), SimError> {
        let text = match self {
            EvidenceSource::Packet(p) => &p.case_description,
            EvidenceSource::Description { text, .. } => text,
        };
        if text.trim().is_empty() {
            Err(SimError::EmptyCase)
        } else {
            Ok(())
        }
    }
}

/// Output of the research phase.
#[derive(Debug, Clone)]
pub struct PreparedCase {
    pub packet: EvidencePacket,
    pub analysis: CaseAnalysis,
    /// The researcher's analysis turn; absent when the reasoner failed.
    pub research_turn: Option<ArgumentTurn>,
    pub warnings: Vec<SimWarning>,
}

/// Fully resolved result of one trial.
#[derive(Debug, Clone)]
pub struct TrialOutcome {
    pub trial_id: String,
    pub assignment: StrategyAssignment,
    pub state: TrialState,
    pub verdict: Verdict,
    pub transcript: Transcript,
    pub evidence: Arc<EvidencePacket>,
    pub evidence_digest: String,
    pub transcript_digest: String,
    pub warnings: Vec<SimWarning>,
}

impl TrialOutcome {
    pub fn is_complete(&self) -> bool {
        self.state == TrialState::Complete
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.state, TrialState::Cancelled { .. })
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "trial_id": self.trial_id,
            "assignment": self.assignment,
            "state": self.state,
            "verdict": self.verdict,
            "transcript": self.transcript,
            "evidence": self.evidence.as_ref(),
            "evidence_digest": self.evidence_digest,
            "transcript_digest": self.transcript_digest,
            "warnings": self.warnings,
        })
    }
}

/// An orchestration session: backends plus the configuration they were built from.
pub struct Simulator {
    reasoner: Arc<dyn Reasoner>,
    researcher: Arc<dyn Researcher>,
    config: Config,
}

impl Simulator {
    pub fn new(reasoner: Arc<dyn Reasoner>, researcher: Arc<dyn Researcher>, config: Config) -> Self {
        Self {
            reasoner,
            researcher,
            config,
        }
    }

    /// Build backends from configuration: HTTP where an endpoint is set, offline otherwise.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        config.validate()?;
        let kind = ReasonerKind::from_config(&config.reasoner);
        let reasoner = kind.build(config.reasoner.clone())?;
        let researcher: Arc<dyn Researcher> = match &config.research.endpoint {
            Some(_) => Arc::new(HttpResearcher::new(&config.research)?),
            None => Arc::new(StaticResearcher::trade_secret_defaults()),
        };
        log(
            Level::Info,
            Domain::System,
            "simulator_ready",
            obj(&[
                ("reasoner", v_str(if kind == ReasonerKind::Http { "http" } else { "offline" })),
                (
                    "researcher",
                    v_str(if config.research.endpoint.is_some() { "http" } else { "static" }),
                ),
            ]),
        );
        Ok(Self::new(reasoner, researcher, config))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn reasoner(&self) -> &dyn Reasoner {
        self.reasoner.as_ref()
    }

    /// Research phase: analyse the description, then gather authorities.
    pub async fn prepare_case(&self, description: &str, jurisdiction: &Jurisdiction) -> PreparedCase {
        let (turn, analysis) = Clerk.analyse(self.reasoner(), description, jurisdiction).await;
        let research_turn = match &turn.degraded {
            None => Some(ArgumentTurn::new(Role::Researcher, Phase::Research, turn.content)),
            Some(reason) => {
                log_degraded_turn("-", Role::Researcher.as_str(), Phase::Research.as_str(), &reason.to_string(), false);
                None
            }
        };
        let prepared = EvidencePreparer::new(self.researcher.as_ref(), &self.config.research)
            .prepare(description, jurisdiction, &analysis)
            .await;
        PreparedCase {
            packet: prepared.packet,
            analysis,
            research_turn,
            warnings: prepared.warnings,
        }
    }

    /// Run one trial. Random requests are resolved here, once, from entropy.
    pub async fn run_trial(
        &self,
        source: EvidenceSource,
        requests: StrategyRequestSet,
        include_rebuttals: bool,
    ) -> Result<TrialOutcome, SimError> {
        source.validate()?;
        let mut rng = StdRng::from_entropy();
        let assignment = requests.resolve(&mut rng);
        let trial_id = format!("trial-{:08x}", rng.gen::<u32>());
        Ok(self.execute(trial_id, source, assignment, include_rebuttals, None, None).await)
    }

    /// Drive one trial with a concrete assignment to a terminal state.
    pub(crate) async fn execute(
        &self,
        trial_id: String,
        source: EvidenceSource,
        assignment: StrategyAssignment,
        include_rebuttals: bool,
        sampling_seed: Option<u64>,
        cancel: Option<&CancelHandle>,
    ) -> TrialOutcome {
        let _scope = ProfileScope::with_context("trial.execute", &[("trial_id", v_str(&trial_id))]);
        let mut run = TrialRun::new(trial_id, assignment);
        let seeded;
        let reasoner: &dyn Reasoner = match sampling_seed {
            Some(seed) => {
                seeded = SeededReasoner::new(self.reasoner(), seed);
                &seeded
            }
            None => self.reasoner(),
        };

        let evidence = match source {
            EvidenceSource::Packet(packet) => packet,
            EvidenceSource::Description { text, jurisdiction } => {
                run.enter(TrialState::Research);
                let prepared = self.prepare_case(&text, &jurisdiction).await;
                run.warnings.extend(prepared.warnings);
                if let Some(turn) = prepared.research_turn {
                    run.transcript.push(turn);
                }
                Arc::new(prepared.packet)
            }
        };

        let [mut prosecutor, mut defense, mut judge] =
            RoleAgent::cast(&assignment, self.config.trial.fallback_confidence);

        if run.cancelled(cancel, Phase::Opening) {
            return run.finish(evidence);
        }
        run.enter(TrialState::Opening);
        for agent in [&mut prosecutor, &mut defense] {
            let outcome = Self::argue(reasoner, agent, Phase::Opening, &evidence, &run.transcript).await;
            if !run.record(agent.role(), Phase::Opening, outcome) {
                return run.finish(evidence);
            }
        }

        if include_rebuttals {
            if run.cancelled(cancel, Phase::Rebuttal) {
                return run.finish(evidence);
            }
            run.enter(TrialState::Rebuttal);
            for agent in [&mut prosecutor, &mut defense] {
                let outcome = Self::argue(reasoner, agent, Phase::Rebuttal, &evidence, &run.transcript).await;
                run.record(agent.role(), Phase::Rebuttal, outcome);
            }
        }

        if run.cancelled(cancel, Phase::Verdict) {
            return run.finish(evidence);
        }
        run.enter(TrialState::Verdict);
        let ruling = match &mut judge {
            RoleAgent::Judge(j) => {
                let arguments: Vec<&ArgumentTurn> = run.transcript.arguments().collect();
                j.produce_verdict(reasoner, &evidence, &arguments).await
            }
            other => {
                let reason = Degradation::OutOfTurn {
                    role: other.role(),
                    phase: Phase::Verdict,
                };
                Ruling {
                    verdict: Verdict::failed(reason.to_string()),
                    turn: TurnOutcome::degraded(reason),
                }
            }
        };
        run.rule(ruling);
        run.finish(evidence)
    }

    /// Advocate dispatch over the role variants.
    async fn argue(
        reasoner: &dyn Reasoner,
        agent: &mut RoleAgent,
        phase: Phase,
        evidence: &EvidencePacket,
        transcript: &Transcript,
    ) -> TurnOutcome {
        let role = agent.role();
        match (agent, phase) {
            (RoleAgent::Prosecutor(c) | RoleAgent::Defense(c), Phase::Opening) => {
                c.produce_opening(reasoner, evidence).await
            }
            (RoleAgent::Prosecutor(c) | RoleAgent::Defense(c), Phase::Rebuttal) => {
                let opponent = match role {
                    Role::Prosecutor => Role::Defense,
                    _ => Role::Prosecutor,
                };
                let opponent_text = transcript
                    .arguments()
                    .filter(|t| t.role == opponent)
                    .last()
                    .map(|t| t.content.as_str())
                    .unwrap_or_default();
                c.produce_rebuttal(reasoner, evidence, opponent_text).await
            }
            _ => TurnOutcome::degraded(Degradation::OutOfTurn { role, phase }),
        }
    }
}

/// Mutable bookkeeping of one trial while it runs.
struct TrialRun {
    trial_id: String,
    assignment: StrategyAssignment,
    state: TrialState,
    transcript: Transcript,
    verdict: Option<Verdict>,
    warnings: Vec<SimWarning>,
}

impl TrialRun {
    fn new(trial_id: String, assignment: StrategyAssignment) -> Self {
        log(
            Level::Info,
            Domain::Trial,
            "trial_start",
            obj(&[
                ("trial_id", v_str(&trial_id)),
                ("assignment", v_str(&assignment.to_string())),
            ]),
        );
        Self {
            trial_id,
            assignment,
            state: TrialState::Research,
            transcript: Transcript::new(),
            verdict: None,
            warnings: Vec::new(),
        }
    }

    fn enter(&mut self, state: TrialState) {
        self.state = state;
        let phase = self.state.phase().map(|p| p.as_str()).unwrap_or("-");
        log_phase(&self.trial_id, phase, self.state.label());
    }

    fn cancelled(&mut self, cancel: Option<&CancelHandle>, next: Phase) -> bool {
        if cancel.map(CancelHandle::is_cancelled).unwrap_or(false) {
            self.state = TrialState::Cancelled { phase: next };
            self.verdict = Some(Verdict::failed(format!("cancelled before {}", next)));
            log(
                Level::Info,
                Domain::Trial,
                "trial_cancelled",
                obj(&[("trial_id", v_str(&self.trial_id)), ("phase", v_str(next.as_str()))]),
            );
            true
        } else {
            false
        }
    }

    /// Append a successful turn; returns false when the trial has failed.
    fn record(&mut self, role: Role, phase: Phase, outcome: TurnOutcome) -> bool {
        match outcome.degraded {
            None => {
                self.transcript.push(ArgumentTurn::new(role, phase, outcome.content));
                true
            }
            Some(reason) => {
                let fatal = phase.is_required();
                log_degraded_turn(&self.trial_id, role.as_str(), phase.as_str(), &reason.to_string(), fatal);
                if fatal {
                    self.fail(phase, format!("{} {} degraded: {}", role, phase, reason));
                }
                !fatal
            }
        }
    }

    fn rule(&mut self, ruling: Ruling) {
        match ruling.turn.degraded {
            None => {
                self.transcript
                    .push(ArgumentTurn::new(Role::Judge, Phase::Verdict, ruling.turn.content));
                log_verdict(
                    &self.trial_id,
                    &ruling.verdict.winner,
                    ruling.verdict.confidence_score,
                    self.transcript.len(),
                );
                self.verdict = Some(ruling.verdict);
                self.state = TrialState::Complete;
            }
            Some(reason) => {
                log_degraded_turn(&self.trial_id, Role::Judge.as_str(), Phase::Verdict.as_str(), &reason.to_string(), true);
                self.fail(Phase::Verdict, format!("judge verdict degraded: {}", reason));
            }
        }
    }

    fn fail(&mut self, phase: Phase, reason: String) {
        log_trial_failed(&self.trial_id, phase.as_str(), &reason);
        self.verdict = Some(Verdict::failed(reason.clone()));
        self.state = TrialState::Failed { phase, reason };
    }

    fn finish(self, evidence: Arc<EvidencePacket>) -> TrialOutcome {
        let evidence_digest = evidence.digest();
        let transcript_digest = self.transcript.digest();
        log_audit(&self.trial_id, &evidence_digest, &transcript_digest);
        log_phase(&self.trial_id, "-", self.state.label());
        let verdict = self
            .verdict
            .unwrap_or_else(|| Verdict::failed("trial ended without a verdict"));
        TrialOutcome {
            trial_id: self.trial_id,
            assignment: self.assignment,
            state: self.state,
            verdict,
            transcript: self.transcript,
            evidence,
            evidence_digest,
            transcript_digest,
            warnings: self.warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReasonerError;
    use crate::reasoner::ScriptedReasoner;
    use crate::research::NullResearcher;
    use crate::strategy::{Strategy, Temperament};

    fn sim(reasoner: Arc<ScriptedReasoner>) -> Simulator {
        Simulator::new(reasoner, Arc::new(NullResearcher), Config::default())
    }

    fn packet() -> EvidenceSource {
        EvidenceSource::packet(EvidencePacket::builder("Engineer took design files").has_nda(true).build())
    }

    #[test]
    fn test_state_labels() {
        assert_eq!(TrialState::Complete.label(), "COMPLETE");
        assert!(TrialState::Cancelled { phase: Phase::Opening }.is_terminal());
        assert!(!TrialState::Rebuttal.is_terminal());
    }

    #[tokio::test]
    async fn test_empty_description_rejected() {
        let s = sim(Arc::new(ScriptedReasoner::with_verdict("plaintiff", 0.8)));
        let err = s
            .run_trial(EvidenceSource::description("  ", "Federal"), StrategyRequestSet::default(), true)
            .await
            .unwrap_err();
        assert!(matches!(err, SimError::EmptyCase));
    }

    #[tokio::test]
    async fn test_degraded_rebuttal_is_omitted() {
        let reasoner = Arc::new(ScriptedReasoner::failing(
            Role::Prosecutor,
            Phase::Rebuttal,
            ReasonerError::Timeout(10),
            "defendant",
        ));
        let s = sim(reasoner.clone());
        let out = s.run_trial(packet(), StrategyRequestSet::default(), true).await.unwrap();
        assert!(out.is_complete());
        assert_eq!(
            out.transcript.roles(),
            vec![Role::Prosecutor, Role::Defense, Role::Defense, Role::Judge]
        );
        assert_eq!(reasoner.count(Role::Prosecutor, Phase::Rebuttal), 1);
    }

    #[tokio::test]
    async fn test_degraded_opening_fails_trial() {
        let reasoner = Arc::new(ScriptedReasoner::failing(
            Role::Defense,
            Phase::Opening,
            ReasonerError::Unavailable("down".into()),
            "plaintiff",
        ));
        let s = sim(reasoner.clone());
        let out = s.run_trial(packet(), StrategyRequestSet::default(), true).await.unwrap();
        assert!(matches!(out.state, TrialState::Failed { phase: Phase::Opening, .. }));
        assert!(out.verdict.is_failed());
        assert_eq!(reasoner.count(Role::Judge, Phase::Verdict), 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_opening() {
        let reasoner = Arc::new(ScriptedReasoner::with_verdict("plaintiff", 0.8));
        let s = sim(reasoner.clone());
        let cancel = CancelHandle::new();
        cancel.cancel();
        let a = StrategyAssignment {
            prosecutor_strategy: Strategy::Moderate,
            defense_strategy: Strategy::Moderate,
            judge_temperament: Temperament::Balanced,
        };
        let out = s.execute("t".into(), packet(), a, true, None, Some(&cancel)).await;
        assert!(out.is_cancelled());
        assert_eq!(reasoner.call_count(), 0);
    }

    #[tokio::test]
    async fn test_description_runs_research_phase() {
        let reasoner = Arc::new(ScriptedReasoner::with_verdict("plaintiff", 0.8));
        let s = sim(reasoner.clone());
        let out = s
            .run_trial(
                EvidenceSource::description("Engineer under NDA downloaded files", "Federal"),
                StrategyRequestSet::default(),
                false,
            )
            .await
            .unwrap();
        assert!(out.is_complete());
        assert_eq!(out.transcript.turns()[0].role, Role::Researcher);
        assert_eq!(reasoner.count(Role::Researcher, Phase::Research), 1);
        assert!(matches!(out.warnings[0], SimWarning::EvidenceIncomplete { .. }));
    }
}
