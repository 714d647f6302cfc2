//! Monte Carlo batch tests: reproducibility, randomisation scope, failure
//! accounting and export.

use std::sync::Arc;

use trialsim::error::ReasonerError;
use trialsim::evidence::EvidenceStrength;
use trialsim::reasoner::{OfflineReasoner, ScriptedReasoner, ScriptedReply};
use trialsim::research::NullResearcher;
use trialsim::transcript::{Phase, Role};
use trialsim::{
    CancelHandle, Config, EvidencePacket, EvidenceSource, MonteCarloConfig, MonteCarloResult, SamplingPlan, SimError,
    SimWarning, Simulator, Strategy, StrategyRequest, StrategyRequestSet, Temperament,
};

fn packet() -> EvidencePacket {
    EvidencePacket::builder("Sales lead exported the customer database before resigning to a competitor.")
        .has_nda(true)
        .evidence_strength(EvidenceStrength::Moderate)
        .build()
}

fn offline_sim(seed: u64) -> Simulator {
    Simulator::new(Arc::new(OfflineReasoner::new(seed)), Arc::new(NullResearcher), Config::default())
}

fn scripted_sim(reasoner: Arc<ScriptedReasoner>) -> Simulator {
    Simulator::new(reasoner, Arc::new(NullResearcher), Config::default())
}

/// Everything in a result except the per-invocation batch id.
fn fingerprint(r: &MonteCarloResult) -> serde_json::Value {
    let mut v = serde_json::to_value(r).unwrap();
    let obj = v.as_object_mut().unwrap();
    obj.remove("batch_id");
    for run in obj["runs"].as_array_mut().unwrap() {
        run.as_object_mut().unwrap().remove("trial_id");
    }
    v
}

#[tokio::test]
async fn seeded_batches_are_reproducible() {
    let mc = MonteCarloConfig::new(24, StrategyRequestSet::all_random())
        .with_seed(2024)
        .with_parallelism(6)
        .with_case_factors(true);
    let a = offline_sim(1).run_monte_carlo(EvidenceSource::packet(packet()), &mc).await.unwrap();
    let b = offline_sim(1)
        .run_monte_carlo(EvidenceSource::packet(packet()), &mc.clone().with_parallelism(1))
        .await
        .unwrap();
    assert_eq!(fingerprint(&a), fingerprint(&b));
    assert_ne!(a.batch_id, b.batch_id);
}

#[tokio::test]
async fn rates_sum_to_one_over_completed_runs() {
    let mc = MonteCarloConfig::new(30, StrategyRequestSet::all_random()).with_seed(5);
    let r = offline_sim(7).run_monte_carlo(EvidenceSource::packet(packet()), &mc).await.unwrap();
    assert_eq!(r.total_runs, 30);
    assert_eq!(r.failed_runs, 0);
    assert!((r.plaintiff_win_rate + r.defense_win_rate - 1.0).abs() < 1e-9);
    assert_eq!(r.confidence_distribution.count, 30);
    assert!(r.confidence_distribution.min <= r.confidence_distribution.mean);
    assert!(r.confidence_distribution.mean <= r.confidence_distribution.max);
    let ids: Vec<usize> = r.runs.iter().map(|run| run.run_id).collect();
    assert_eq!(ids, (0..30).collect::<Vec<_>>());
}

#[tokio::test]
async fn only_requested_fields_are_randomised() {
    let requests = StrategyRequestSet {
        prosecutor: StrategyRequest::Random,
        ..StrategyRequestSet::default()
    };
    let mc = MonteCarloConfig::new(20, requests).with_seed(11).with_rebuttals(false);
    let r = scripted_sim(Arc::new(ScriptedReasoner::with_verdict("plaintiff", 0.7)))
        .run_monte_carlo(EvidenceSource::packet(packet()), &mc)
        .await
        .unwrap();
    for run in &r.runs {
        assert_eq!(run.assignment.defense_strategy, Strategy::Moderate);
        assert_eq!(run.assignment.judge_temperament, Temperament::Balanced);
    }
    assert_eq!(r.win_rate_by_strategy.defense.len(), 1);
    assert!(r.win_rate_by_strategy.prosecutor.len() > 1);
}

#[tokio::test]
async fn failed_runs_are_excluded_from_rates() {
    let reasoner = Arc::new(ScriptedReasoner::failing(
        Role::Judge,
        Phase::Verdict,
        ReasonerError::Unavailable("503".into()),
        "plaintiff",
    ));
    let mc = MonteCarloConfig::new(4, StrategyRequestSet::default()).with_seed(1);
    let r = scripted_sim(reasoner)
        .run_monte_carlo(EvidenceSource::packet(packet()), &mc)
        .await
        .unwrap();

    assert_eq!(r.total_runs, 4);
    assert_eq!(r.failed_runs, 4);
    assert_eq!(r.completed_runs, 0);
    assert!(r.runs.iter().all(|run| run.verdict.winner == "FAILED"));
    assert_eq!(r.plaintiff_win_rate, 0.0);
    assert_eq!(r.confidence_distribution.count, 0);
    assert!(r.warnings.iter().any(|w| matches!(w, SimWarning::BatchDegraded { failed: 4, total: 4, .. })));
}

#[tokio::test]
async fn partial_failures_below_threshold_are_not_degraded() {
    // Only the judge of runs whose context mentions "aggressive" fails.
    let reasoner = Arc::new(ScriptedReasoner::from_fn(|p| match p.role {
        Role::Judge if p.context.contains("aggressive") => ScriptedReply::Fail(ReasonerError::Timeout(1)),
        Role::Judge => ScriptedReply::Text(trialsim::reasoner::verdict_json("defendant", 0.9)),
        _ => ScriptedReply::Text(p.instructions.lines().next().unwrap_or_default().to_string()),
    }));
    let requests = StrategyRequestSet {
        prosecutor: StrategyRequest::Random,
        ..StrategyRequestSet::default()
    };
    let mut mc = MonteCarloConfig::new(6, requests)
        .with_plan(SamplingPlan::Exhaustive)
        .with_rebuttals(false);
    mc.failure_warn_fraction = 0.5;
    let r = scripted_sim(reasoner)
        .run_monte_carlo(EvidenceSource::packet(packet()), &mc)
        .await
        .unwrap();

    assert_eq!(r.failed_runs, 2);
    assert_eq!(r.completed_runs, 4);
    assert_eq!(r.defense_win_rate, 1.0);
    assert!(!r.is_degraded());
    assert!(!r.win_rate_by_strategy.prosecutor.contains_key(&Strategy::Aggressive));
}

#[tokio::test]
async fn exhaustive_plan_covers_the_grid() {
    let mc = MonteCarloConfig::new(27, StrategyRequestSet::all_random())
        .with_plan(SamplingPlan::Exhaustive)
        .with_rebuttals(false);
    let r = scripted_sim(Arc::new(ScriptedReasoner::with_verdict("plaintiff", 0.6)))
        .run_monte_carlo(EvidenceSource::packet(packet()), &mc)
        .await
        .unwrap();
    let mut seen: Vec<_> = r.runs.iter().map(|run| run.assignment).collect();
    seen.dedup();
    assert_eq!(seen.len(), 27);
    assert_eq!(r.win_rate_by_strategy.judge.len(), 3);
}

#[tokio::test]
async fn description_batch_researches_once() {
    let reasoner = Arc::new(ScriptedReasoner::with_verdict("plaintiff", 0.7));
    let mc = MonteCarloConfig::new(5, StrategyRequestSet::default()).with_rebuttals(false);
    let r = scripted_sim(reasoner.clone())
        .run_monte_carlo(EvidenceSource::description("Engineer copied firmware under NDA", "federal"), &mc)
        .await
        .unwrap();
    assert_eq!(reasoner.count(Role::Researcher, Phase::Research), 1);
    assert_eq!(reasoner.count(Role::Judge, Phase::Verdict), 5);
    assert!(r.warnings.iter().any(|w| matches!(w, SimWarning::EvidenceIncomplete { .. })));
}

#[tokio::test]
async fn invalid_batch_is_rejected_before_work() {
    let reasoner = Arc::new(ScriptedReasoner::with_verdict("plaintiff", 0.7));
    let mc = MonteCarloConfig::new(0, StrategyRequestSet::default());
    let err = scripted_sim(reasoner.clone())
        .run_monte_carlo(EvidenceSource::packet(packet()), &mc)
        .await
        .unwrap_err();
    assert!(matches!(err, SimError::InvalidBatch(_)));
    assert_eq!(reasoner.call_count(), 0);
}

#[tokio::test]
async fn cancellation_keeps_completed_runs() {
    let cancel = CancelHandle::new();
    let trigger = cancel.clone();
    // Cancel once the third verdict has been requested; runs execute one at a time.
    let verdicts = std::sync::atomic::AtomicUsize::new(0);
    let reasoner = Arc::new(ScriptedReasoner::from_fn(move |p| match p.role {
        Role::Judge => {
            if verdicts.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1 == 3 {
                trigger.cancel();
            }
            ScriptedReply::Text(trialsim::reasoner::verdict_json("plaintiff", 0.8))
        }
        _ => ScriptedReply::Text("Argument.".to_string()),
    }));
    let mc = MonteCarloConfig::new(10, StrategyRequestSet::default())
        .with_parallelism(1)
        .with_rebuttals(false);
    let r = scripted_sim(reasoner)
        .run_monte_carlo_cancellable(EvidenceSource::packet(packet()), &mc, &cancel)
        .await
        .unwrap();
    assert_eq!(r.completed_runs, 3);
    assert_eq!(r.cancelled_runs, 7);
    assert_eq!(r.plaintiff_win_rate, 1.0);
}

#[tokio::test]
async fn result_exports_to_json_file() {
    let mc = MonteCarloConfig::new(3, StrategyRequestSet::default())
        .with_seed(3)
        .with_rebuttals(false);
    let r = scripted_sim(Arc::new(ScriptedReasoner::with_verdict("defendant", 0.66)))
        .run_monte_carlo(EvidenceSource::packet(packet()), &mc)
        .await
        .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("batch.json");
    r.write_json(&path).unwrap();

    let v: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(v["total_runs"], 3);
    assert_eq!(v["defense_win_rate"], 1.0);
    assert_eq!(v["best_defense_strategy"]["strategy"], "moderate");
    assert_eq!(v["runs"].as_array().unwrap().len(), 3);
}
