//! Monte Carlo batches: many independent trials over one case.
//!
//! Each run owns its RNG (seeded from `seed + run_id` when a seed is given) and
//! its agents; the evidence packet is the only thing runs share, read-only.
//! Runs execute on a bounded pool and are re-ordered by run id before
//! aggregation, so a seeded batch is reproducible regardless of scheduling.

use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::aggregate::{aggregate, MonteCarloResult, RunRecord};
use crate::case_factors::CaseFactors;
use crate::config::{Config, SamplingPlan};
use crate::error::SimError;
use crate::evidence::EvidencePacket;
use crate::logging::{log, log_batch_summary, obj, v_str, Domain, Level, ProfileScope};
use crate::strategy::{StrategyAssignment, StrategyRequestSet};
use crate::trial::{CancelHandle, EvidenceSource, Simulator};
use serde_json::json;

#[derive(Debug, Clone)]
pub struct MonteCarloConfig {
    pub run_count: usize,
    pub requests: StrategyRequestSet,
    /// Upper bound on concurrently running trials.
    pub parallelism: usize,
    pub seed: Option<u64>,
    /// Failed-run fraction above which the batch is flagged degraded.
    pub failure_warn_fraction: f64,
    pub plan: SamplingPlan,
    pub include_rebuttals: bool,
    pub vary_case_factors: bool,
}

impl MonteCarloConfig {
    /// Batch settings from the session configuration.
    pub fn from_config(config: &Config, requests: StrategyRequestSet) -> Self {
        Self {
            run_count: config.batch.runs,
            requests,
            parallelism: config.batch.parallelism,
            seed: config.batch.seed,
            failure_warn_fraction: config.batch.failure_warn_fraction,
            plan: config.batch.plan,
            include_rebuttals: config.trial.include_rebuttals,
            vary_case_factors: config.batch.vary_case_factors,
        }
    }

    pub fn new(run_count: usize, requests: StrategyRequestSet) -> Self {
        Self {
            run_count,
            ..Self::from_config(&Config::default(), requests)
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn with_plan(mut self, plan: SamplingPlan) -> Self {
        self.plan = plan;
        self
    }

    pub fn with_rebuttals(mut self, include: bool) -> Self {
        self.include_rebuttals = include;
        self
    }

    pub fn with_case_factors(mut self, vary: bool) -> Self {
        self.vary_case_factors = vary;
        self
    }

    fn validate(&self) -> Result<(), SimError> {
        if self.run_count == 0 {
            return Err(SimError::InvalidBatch("run_count must be at least 1".into()));
        }
        if self.parallelism == 0 {
            return Err(SimError::InvalidBatch("parallelism must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.failure_warn_fraction) {
            return Err(SimError::InvalidBatch(format!(
                "failure_warn_fraction {} outside [0, 1]",
                self.failure_warn_fraction
            )));
        }
        Ok(())
    }

    fn rng_for(&self, run_id: usize) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(run_id as u64)),
            None => StdRng::from_entropy(),
        }
    }
}

impl Simulator {
    pub async fn run_monte_carlo(
        &self,
        source: EvidenceSource,
        mc: &MonteCarloConfig,
    ) -> Result<MonteCarloResult, SimError> {
        self.run_monte_carlo_cancellable(source, mc, &CancelHandle::new()).await
    }

    /// Like `run_monte_carlo`, stopping early once `cancel` fires. Runs not yet
    /// started are skipped, in-flight runs stop at their next phase boundary,
    /// and completed runs are kept.
    pub async fn run_monte_carlo_cancellable(
        &self,
        source: EvidenceSource,
        mc: &MonteCarloConfig,
        cancel: &CancelHandle,
    ) -> Result<MonteCarloResult, SimError> {
        mc.validate()?;
        source.validate()?;
        let batch_id = format!("batch-{:08x}", rand::thread_rng().gen::<u32>());
        let _scope = ProfileScope::with_context("batch.run", &[("batch_id", v_str(&batch_id))]);
        log(
            Level::Info,
            Domain::Batch,
            "batch_start",
            obj(&[
                ("batch_id", v_str(&batch_id)),
                ("run_count", json!(mc.run_count)),
                ("parallelism", json!(mc.parallelism)),
                ("plan", v_str(mc.plan.as_str())),
                ("seed", json!(mc.seed)),
            ]),
        );

        // Research happens once; every run argues over the same packet.
        let mut warnings = Vec::new();
        let base = match source {
            EvidenceSource::Packet(packet) => packet,
            EvidenceSource::Description { text, jurisdiction } => {
                let prepared = self.prepare_case(&text, &jurisdiction).await;
                warnings.extend(prepared.warnings);
                Arc::new(prepared.packet)
            }
        };

        let grid = match mc.plan {
            SamplingPlan::Exhaustive => mc.requests.enumerate(),
            SamplingPlan::Random => Vec::new(),
        };

        let outcomes: Vec<Option<RunRecord>> = stream::iter(0..mc.run_count)
            .map(|run_id| {
                let base = Arc::clone(&base);
                let grid = &grid;
                let batch_id = &batch_id;
                async move { self.run_one(batch_id, run_id, base, grid, mc, cancel).await }
            })
            .buffer_unordered(mc.parallelism)
            .collect()
            .await;

        let cancelled = outcomes.iter().filter(|o| o.is_none()).count();
        let runs: Vec<RunRecord> = outcomes.into_iter().flatten().collect();
        let result = aggregate(&batch_id, runs, cancelled, mc.failure_warn_fraction, warnings);

        log_batch_summary(
            &batch_id,
            result.total_runs,
            result.failed_runs,
            result.plaintiff_win_rate,
            result.confidence_distribution.mean,
            result.is_degraded(),
        );
        if cancelled > 0 {
            log(
                Level::Info,
                Domain::Batch,
                "batch_cancelled",
                obj(&[("batch_id", v_str(&batch_id)), ("cancelled_runs", json!(cancelled))]),
            );
        }
        Ok(result)
    }

    /// One run; `None` when it was cancelled before reaching a verdict.
    async fn run_one(
        &self,
        batch_id: &str,
        run_id: usize,
        base: Arc<EvidencePacket>,
        grid: &[StrategyAssignment],
        mc: &MonteCarloConfig,
        cancel: &CancelHandle,
    ) -> Option<RunRecord> {
        if cancel.is_cancelled() {
            return None;
        }
        let mut rng = mc.rng_for(run_id);
        let assignment = if grid.is_empty() {
            mc.requests.resolve(&mut rng)
        } else {
            grid[run_id % grid.len()]
        };
        let case_factors = mc.vary_case_factors.then(|| CaseFactors::sample(&mut rng));
        let sampling_seed = mc.seed.map(|_| rng.gen::<u64>());
        let evidence = match &case_factors {
            Some(factors) => Arc::new(factors.apply(&base)),
            None => base,
        };

        let trial_id = format!("{}-{:04}", batch_id, run_id);
        let outcome = self
            .execute(
                trial_id,
                EvidenceSource::Packet(evidence),
                assignment,
                mc.include_rebuttals,
                sampling_seed,
                Some(cancel),
            )
            .await;
        if outcome.is_cancelled() {
            return None;
        }
        Some(RunRecord {
            run_id,
            trial_id: outcome.trial_id,
            assignment: outcome.assignment,
            turns: outcome.transcript.len(),
            verdict: outcome.verdict,
            state: outcome.state,
            case_factors,
        })
    }
}
