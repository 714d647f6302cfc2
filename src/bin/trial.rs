//! Run a single trial and print its outcome.
//!
//! Usage: trial <case description | @packet.json> [jurisdiction]
//!
//! Strategies default to moderate/moderate/balanced; override with
//! PROSECUTOR_STRATEGY, DEFENSE_STRATEGY, JUDGE_TEMPERAMENT (a value or `random`).

use anyhow::Result;
use trialsim::{Config, EvidenceSource, Simulator, StrategyRequestSet};

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let case = match args.next() {
        Some(c) => c,
        None => {
            eprintln!("usage: trial <case description | @packet.json> [jurisdiction]");
            std::process::exit(2);
        }
    };
    let jurisdiction = args.next().unwrap_or_else(|| "federal".to_string());

    let label = |key: &str, default: &str| std::env::var(key).unwrap_or_else(|_| default.to_string());
    let requests = StrategyRequestSet::from_labels(
        &label("PROSECUTOR_STRATEGY", "moderate"),
        &label("DEFENSE_STRATEGY", "moderate"),
        &label("JUDGE_TEMPERAMENT", "balanced"),
    )?;

    let cfg = Config::from_env();
    let include_rebuttals = cfg.trial.include_rebuttals;
    let sim = Simulator::from_config(cfg)?;
    let source = EvidenceSource::from_arg(&case, &jurisdiction)?;
    let outcome = sim.run_trial(source, requests, include_rebuttals).await?;

    println!("{}", serde_json::to_string_pretty(&outcome.to_json())?);
    if !outcome.is_complete() {
        std::process::exit(1);
    }
    Ok(())
}
