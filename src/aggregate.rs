//! Reduction of per-run verdicts into batch statistics.
//!
//! Everything here is a pure function of the run records. Records are sorted by
//! run id first, so the completion order of concurrent runs never shows in the
//! result. Failed runs stay in `runs` but are excluded from every rate.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use serde::Serialize;

use crate::case_factors::{CaseFactors, CompetitorRelationship, Cooperation, LONG_GAP_MONTHS, SHORT_GAP_MONTHS};
use crate::error::SimWarning;
use crate::evidence::{EvidenceStrength, VenueBias};
use crate::strategy::{Strategy, StrategyAssignment, Temperament};
use crate::trial::TrialState;
use crate::verdict::{Outcome, Verdict};

const TIE_EPSILON: f64 = 1e-12;

/// One Monte Carlo run: the assignment used and the verdict it produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub run_id: usize,
    pub trial_id: String,
    pub assignment: StrategyAssignment,
    pub verdict: Verdict,
    pub state: TrialState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_factors: Option<CaseFactors>,
    pub turns: usize,
}

impl RunRecord {
    pub fn is_failed(&self) -> bool {
        self.verdict.is_failed()
    }

    fn outcome(&self) -> Option<Outcome> {
        self.verdict.outcome
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupStats {
    pub runs: usize,
    pub wins: usize,
    pub win_rate: f64,
    pub avg_confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemperamentStats {
    pub runs: usize,
    pub plaintiff_wins: usize,
    pub defense_wins: usize,
    pub plaintiff_rate: f64,
    pub defense_rate: f64,
}

/// Win rates grouped by the value each role used. Prosecutor groups count
/// plaintiff wins, defense groups count defense wins.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WinRatesByStrategy {
    pub prosecutor: BTreeMap<Strategy, GroupStats>,
    pub defense: BTreeMap<Strategy, GroupStats>,
    pub judge: BTreeMap<Temperament, TemperamentStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BestStrategy {
    pub strategy: Strategy,
    pub win_rate: f64,
    /// Other values with the same win rate; the reported one comes first in declaration order.
    pub tied_with: Vec<Strategy>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfidenceDistribution {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImpactStats {
    pub runs: usize,
    pub plaintiff_wins: usize,
    pub plaintiff_win_rate: f64,
    pub defense_win_rate: f64,
    pub avg_confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NdaImpact {
    pub with_nda_win_rate: Option<f64>,
    pub without_nda_win_rate: Option<f64>,
    pub delta: Option<f64>,
}

/// Outcome breakdowns by case factor; present only when factors varied per run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseFactorImpact {
    pub venue: BTreeMap<VenueBias, ImpactStats>,
    pub evidence: BTreeMap<EvidenceStrength, ImpactStats>,
    pub nda: NdaImpact,
    /// Plaintiff win rate within each factor slice (departure gap, competition, cooperation).
    pub plaintiff_rate_by_factor: BTreeMap<String, f64>,
}

/// The highest-confidence win for one side.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StandoutRun {
    pub run_id: usize,
    pub assignment: StrategyAssignment,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_factors: Option<CaseFactors>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonteCarloResult {
    pub batch_id: String,
    pub runs: Vec<RunRecord>,
    pub total_runs: usize,
    pub completed_runs: usize,
    pub failed_runs: usize,
    pub cancelled_runs: usize,
    pub plaintiff_win_rate: f64,
    pub defense_win_rate: f64,
    pub win_rate_by_strategy: WinRatesByStrategy,
    pub best_prosecutor_strategy: Option<BestStrategy>,
    pub best_defense_strategy: Option<BestStrategy>,
    pub confidence_distribution: ConfidenceDistribution,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_factor_impact: Option<CaseFactorImpact>,
    pub strongest_plaintiff_run: Option<StandoutRun>,
    pub strongest_defense_run: Option<StandoutRun>,
    pub warnings: Vec<SimWarning>,
}

impl MonteCarloResult {
    pub fn is_degraded(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, SimWarning::BatchDegraded { .. }))
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let json = self.to_json()?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))
    }
}

fn rate(n: usize, d: usize) -> f64 {
    if d == 0 {
        0.0
    } else {
        n as f64 / d as f64
    }
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        0.0
    } else {
        xs.iter().sum::<f64>() / xs.len() as f64
    }
}

/// Reduce run records into a batch result.
///
/// `cancelled_runs` counts runs dropped by cancellation; they are not in `runs`.
/// `warnings` carries earlier non-fatal conditions (e.g. incomplete evidence).
pub fn aggregate(
    batch_id: &str,
    mut runs: Vec<RunRecord>,
    cancelled_runs: usize,
    failure_warn_fraction: f64,
    mut warnings: Vec<SimWarning>,
) -> MonteCarloResult {
    runs.sort_by_key(|r| r.run_id);
    let ok: Vec<&RunRecord> = runs.iter().filter(|r| !r.is_failed()).collect();
    let total = runs.len();
    let failed = total - ok.len();

    let plaintiff_wins = ok.iter().filter(|r| r.outcome() == Some(Outcome::PlaintiffWin)).count();
    let defense_wins = ok.len() - plaintiff_wins;

    let win_rate_by_strategy = WinRatesByStrategy {
        prosecutor: group_by(&ok, |r| r.assignment.prosecutor_strategy, Outcome::PlaintiffWin),
        defense: group_by(&ok, |r| r.assignment.defense_strategy, Outcome::DefenseWin),
        judge: by_temperament(&ok),
    };
    let best_prosecutor_strategy = best_of(&win_rate_by_strategy.prosecutor);
    let best_defense_strategy = best_of(&win_rate_by_strategy.defense);

    if total > 0 && rate(failed, total) > failure_warn_fraction {
        warnings.push(SimWarning::BatchDegraded {
            failed,
            total,
            threshold: failure_warn_fraction,
        });
    }

    MonteCarloResult {
        batch_id: batch_id.to_string(),
        total_runs: total,
        completed_runs: ok.len(),
        failed_runs: failed,
        cancelled_runs,
        plaintiff_win_rate: rate(plaintiff_wins, ok.len()),
        defense_win_rate: rate(defense_wins, ok.len()),
        best_prosecutor_strategy,
        best_defense_strategy,
        confidence_distribution: confidence_distribution(&ok),
        case_factor_impact: case_factor_impact(&ok),
        strongest_plaintiff_run: standout(&ok, Outcome::PlaintiffWin),
        strongest_defense_run: standout(&ok, Outcome::DefenseWin),
        win_rate_by_strategy,
        warnings,
        runs,
    }
}

fn group_by<F>(ok: &[&RunRecord], key: F, winning: Outcome) -> BTreeMap<Strategy, GroupStats>
where
    F: Fn(&RunRecord) -> Strategy,
{
    let mut buckets: BTreeMap<Strategy, (usize, Vec<f64>)> = BTreeMap::new();
    for &r in ok {
        let entry = buckets.entry(key(r)).or_default();
        if r.outcome() == Some(winning) {
            entry.0 += 1;
        }
        entry.1.push(r.verdict.confidence_score);
    }
    buckets
        .into_iter()
        .map(|(k, (wins, confs))| {
            (
                k,
                GroupStats {
                    runs: confs.len(),
                    wins,
                    win_rate: rate(wins, confs.len()),
                    avg_confidence: mean(&confs),
                },
            )
        })
        .collect()
}

fn by_temperament(ok: &[&RunRecord]) -> BTreeMap<Temperament, TemperamentStats> {
    let mut out: BTreeMap<Temperament, TemperamentStats> = BTreeMap::new();
    for r in ok {
        let s = out.entry(r.assignment.judge_temperament).or_insert(TemperamentStats {
            runs: 0,
            plaintiff_wins: 0,
            defense_wins: 0,
            plaintiff_rate: 0.0,
            defense_rate: 0.0,
        });
        s.runs += 1;
        match r.outcome() {
            Some(Outcome::PlaintiffWin) => s.plaintiff_wins += 1,
            _ => s.defense_wins += 1,
        }
    }
    for s in out.values_mut() {
        s.plaintiff_rate = rate(s.plaintiff_wins, s.runs);
        s.defense_rate = rate(s.defense_wins, s.runs);
    }
    out
}

// Map iteration is declaration order, so the first maximum wins ties.
fn best_of(groups: &BTreeMap<Strategy, GroupStats>) -> Option<BestStrategy> {
    let (&strategy, best) = groups
        .iter()
        .fold(None::<(&Strategy, &GroupStats)>, |acc, (k, v)| match acc {
            Some((_, b)) if v.win_rate <= b.win_rate + TIE_EPSILON => acc,
            _ => Some((k, v)),
        })?;
    let tied_with = groups
        .iter()
        .filter(|(k, v)| **k != strategy && (v.win_rate - best.win_rate).abs() <= TIE_EPSILON)
        .map(|(k, _)| *k)
        .collect();
    Some(BestStrategy {
        strategy,
        win_rate: best.win_rate,
        tied_with,
    })
}

fn confidence_distribution(ok: &[&RunRecord]) -> ConfidenceDistribution {
    let confs: Vec<f64> = ok.iter().map(|r| r.verdict.confidence_score).collect();
    if confs.is_empty() {
        return ConfidenceDistribution {
            count: 0,
            mean: 0.0,
            min: 0.0,
            max: 0.0,
            std_dev: 0.0,
        };
    }
    let m = mean(&confs);
    let var = confs.iter().map(|c| (c - m).powi(2)).sum::<f64>() / confs.len() as f64;
    ConfidenceDistribution {
        count: confs.len(),
        mean: m,
        min: confs.iter().cloned().fold(f64::INFINITY, f64::min),
        max: confs.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        std_dev: var.sqrt(),
    }
}

fn impact<'a, I>(runs: I) -> ImpactStats
where
    I: IntoIterator<Item = &'a RunRecord>,
{
    let mut n = 0;
    let mut wins = 0;
    let mut confs = Vec::new();
    for r in runs {
        n += 1;
        if r.outcome() == Some(Outcome::PlaintiffWin) {
            wins += 1;
        }
        confs.push(r.verdict.confidence_score);
    }
    let p = rate(wins, n);
    ImpactStats {
        runs: n,
        plaintiff_wins: wins,
        plaintiff_win_rate: p,
        defense_win_rate: if n == 0 { 0.0 } else { 1.0 - p },
        avg_confidence: mean(&confs),
    }
}

fn plaintiff_rate<'a, I>(runs: I) -> Option<f64>
where
    I: IntoIterator<Item = &'a RunRecord>,
{
    let stats = impact(runs);
    (stats.runs > 0).then_some(stats.plaintiff_win_rate)
}

fn case_factor_impact(ok: &[&RunRecord]) -> Option<CaseFactorImpact> {
    let varied: Vec<(&RunRecord, &CaseFactors)> = ok
        .iter()
        .filter_map(|r| r.case_factors.as_ref().map(|f| (*r, f)))
        .collect();
    if varied.is_empty() {
        return None;
    }

    let mut venue = BTreeMap::new();
    for v in VenueBias::ALL {
        let slice = varied.iter().filter(|(_, f)| f.venue_bias == v).map(|(r, _)| *r);
        let stats = impact(slice);
        if stats.runs > 0 {
            venue.insert(v, stats);
        }
    }
    let mut evidence = BTreeMap::new();
    for s in EvidenceStrength::ALL {
        let slice = varied.iter().filter(|(_, f)| f.evidence_strength == s).map(|(r, _)| *r);
        let stats = impact(slice);
        if stats.runs > 0 {
            evidence.insert(s, stats);
        }
    }

    let with_nda = plaintiff_rate(varied.iter().filter(|(_, f)| f.has_nda).map(|(r, _)| *r));
    let without_nda = plaintiff_rate(varied.iter().filter(|(_, f)| !f.has_nda).map(|(r, _)| *r));
    let nda = NdaImpact {
        with_nda_win_rate: with_nda,
        without_nda_win_rate: without_nda,
        delta: with_nda.zip(without_nda).map(|(w, wo)| w - wo),
    };

    let slices: [(&str, fn(&CaseFactors) -> bool); 6] = [
        ("short_departure_time", |f| f.months_since_departure <= SHORT_GAP_MONTHS),
        ("long_departure_time", |f| f.months_since_departure > LONG_GAP_MONTHS),
        ("direct_competitor", |f| f.competitor_relationship == CompetitorRelationship::Direct),
        ("no_competition", |f| f.competitor_relationship == CompetitorRelationship::Unrelated),
        ("hostile_defendant", |f| f.defendant_cooperation == Cooperation::Hostile),
        ("cooperative_defendant", |f| f.defendant_cooperation == Cooperation::Cooperative),
    ];
    let mut plaintiff_rate_by_factor = BTreeMap::new();
    for (name, pred) in slices {
        if let Some(r) = plaintiff_rate(varied.iter().filter(|(_, f)| pred(f)).map(|(r, _)| *r)) {
            plaintiff_rate_by_factor.insert(name.to_string(), r);
        }
    }

    Some(CaseFactorImpact {
        venue,
        evidence,
        nda,
        plaintiff_rate_by_factor,
    })
}

fn standout(ok: &[&RunRecord], side: Outcome) -> Option<StandoutRun> {
    ok.iter()
        .copied()
        .filter(|r| r.outcome() == Some(side))
        .fold(None::<&RunRecord>, |best, r| match best {
            Some(b) if r.verdict.confidence_score <= b.verdict.confidence_score => Some(b),
            _ => Some(r),
        })
        .map(|r| StandoutRun {
            run_id: r.run_id,
            assignment: r.assignment,
            confidence: r.verdict.confidence_score,
            case_factors: r.case_factors,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(run_id: usize, p: Strategy, d: Strategy, j: Temperament, outcome: Option<Outcome>, conf: f64) -> RunRecord {
        let verdict = match outcome {
            Some(o) => Verdict::new(o, "r".into(), vec![], vec![], conf),
            None => Verdict::failed("judge timed out"),
        };
        RunRecord {
            run_id,
            trial_id: format!("t{}", run_id),
            assignment: StrategyAssignment {
                prosecutor_strategy: p,
                defense_strategy: d,
                judge_temperament: j,
            },
            state: if outcome.is_some() {
                TrialState::Complete
            } else {
                TrialState::Failed {
                    phase: crate::transcript::Phase::Verdict,
                    reason: "x".into(),
                }
            },
            verdict,
            case_factors: None,
            turns: 5,
        }
    }

    use Outcome::*;
    use Strategy::*;
    use Temperament::*;

    #[test]
    fn test_rates_sum_to_one_without_failures() {
        let runs = vec![
            record(0, Aggressive, Moderate, Strict, Some(PlaintiffWin), 0.8),
            record(1, Moderate, Moderate, Strict, Some(DefenseWin), 0.6),
            record(2, Conservative, Moderate, Lenient, Some(PlaintiffWin), 0.7),
        ];
        let r = aggregate("b", runs, 0, 0.25, vec![]);
        assert!((r.plaintiff_win_rate + r.defense_win_rate - 1.0).abs() < 1e-12);
        assert!((r.plaintiff_win_rate - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(r.confidence_distribution.count, 3);
        assert_eq!(r.confidence_distribution.min, 0.6);
        assert_eq!(r.confidence_distribution.max, 0.8);
        assert!(r.warnings.is_empty());
    }

    #[test]
    fn test_failed_runs_excluded_from_denominators() {
        let runs = vec![
            record(0, Aggressive, Moderate, Strict, Some(PlaintiffWin), 0.9),
            record(1, Aggressive, Moderate, Strict, None, 0.0),
        ];
        let r = aggregate("b", runs, 0, 0.25, vec![]);
        assert_eq!(r.failed_runs, 1);
        assert_eq!(r.runs.len(), 2);
        assert_eq!(r.plaintiff_win_rate, 1.0);
        assert_eq!(r.confidence_distribution.min, 0.9);
        assert!(r.is_degraded());
    }

    #[test]
    fn test_best_strategy_tie_break_in_declaration_order() {
        let runs = vec![
            record(0, Conservative, Aggressive, Balanced, Some(PlaintiffWin), 0.7),
            record(1, Moderate, Aggressive, Balanced, Some(PlaintiffWin), 0.7),
            record(2, Aggressive, Conservative, Balanced, Some(DefenseWin), 0.7),
        ];
        let r = aggregate("b", runs, 0, 0.25, vec![]);
        let best = r.best_prosecutor_strategy.unwrap();
        assert_eq!(best.strategy, Moderate);
        assert_eq!(best.tied_with, vec![Conservative]);
        assert_eq!(best.win_rate, 1.0);
        let best_d = r.best_defense_strategy.unwrap();
        assert_eq!(best_d.strategy, Conservative);
        assert!(best_d.tied_with.is_empty());
    }

    #[test]
    fn test_completion_order_does_not_matter() {
        let mk = || {
            vec![
                record(0, Aggressive, Moderate, Strict, Some(PlaintiffWin), 0.1),
                record(1, Moderate, Moderate, Strict, Some(DefenseWin), 0.2),
                record(2, Conservative, Moderate, Lenient, Some(PlaintiffWin), 0.3),
            ]
        };
        let mut shuffled = mk();
        shuffled.reverse();
        let a = aggregate("b", mk(), 0, 0.25, vec![]);
        let b = aggregate("b", shuffled, 0, 0.25, vec![]);
        assert_eq!(a.to_json().unwrap(), b.to_json().unwrap());
    }

    #[test]
    fn test_group_contributes_once_per_role() {
        let runs = vec![
            record(0, Aggressive, Conservative, Strict, Some(PlaintiffWin), 0.5),
            record(1, Aggressive, Conservative, Lenient, Some(DefenseWin), 0.5),
        ];
        let r = aggregate("b", runs, 0, 0.25, vec![]);
        let p = &r.win_rate_by_strategy.prosecutor[&Aggressive];
        assert_eq!(p.runs, 2);
        assert_eq!(p.win_rate, 0.5);
        let d = &r.win_rate_by_strategy.defense[&Conservative];
        assert_eq!(d.wins, 1);
        assert_eq!(r.win_rate_by_strategy.judge[&Strict].plaintiff_rate, 1.0);
        assert!(!r.win_rate_by_strategy.prosecutor.contains_key(&Moderate));
    }

    #[test]
    fn test_standout_runs() {
        let runs = vec![
            record(0, Aggressive, Moderate, Strict, Some(PlaintiffWin), 0.7),
            record(1, Moderate, Moderate, Strict, Some(PlaintiffWin), 0.95),
            record(2, Moderate, Aggressive, Strict, Some(DefenseWin), 0.6),
        ];
        let r = aggregate("b", runs, 0, 0.25, vec![]);
        assert_eq!(r.strongest_plaintiff_run.unwrap().run_id, 1);
        assert_eq!(r.strongest_defense_run.unwrap().run_id, 2);
        assert!(r.case_factor_impact.is_none());
    }

    #[test]
    fn test_all_failed_still_returns_result() {
        let runs = vec![record(0, Aggressive, Moderate, Strict, None, 0.0)];
        let r = aggregate("b", runs, 0, 0.25, vec![]);
        assert_eq!(r.completed_runs, 0);
        assert_eq!(r.plaintiff_win_rate, 0.0);
        assert!(r.best_prosecutor_strategy.is_none());
        assert!(r.is_degraded());
    }

    #[test]
    fn test_write_json() {
        let runs = vec![record(0, Aggressive, Moderate, Strict, Some(PlaintiffWin), 0.7)];
        let r = aggregate("b", runs, 0, 0.25, vec![]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.json");
        r.write_json(&path).unwrap();
        let v: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(v["plaintiff_win_rate"], 1.0);
        assert_eq!(v["runs"][0]["verdict"]["outcome"], "PLAINTIFF_WIN");
        assert_eq!(v["win_rate_by_strategy"]["prosecutor"]["aggressive"]["wins"], 1);
    }
}
