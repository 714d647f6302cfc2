//! Monte Carlo batch runner.
//!
//! Usage: trialsim <case description | @packet.json> [jurisdiction]
//!
//! Strategies come from PROSECUTOR_STRATEGY, DEFENSE_STRATEGY and JUDGE_TEMPERAMENT
//! (a value or `random`, default `random`). Batch and backend settings come from
//! the environment (see `Config::from_env`). The aggregate is printed to stdout
//! as JSON, or written to OUTPUT_PATH when set.

use anyhow::Result;
use trialsim::logging::{log, obj, v_num, v_str, Domain, Level};
use trialsim::{Config, EvidenceSource, MonteCarloConfig, Simulator, StrategyRequestSet};

fn label(key: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| "random".to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let case = match args.next() {
        Some(c) => c,
        None => {
            eprintln!("usage: trialsim <case description | @packet.json> [jurisdiction]");
            std::process::exit(2);
        }
    };
    let jurisdiction = args.next().unwrap_or_else(|| "federal".to_string());

    let cfg = Config::from_env();
    let requests = StrategyRequestSet::from_labels(
        &label("PROSECUTOR_STRATEGY"),
        &label("DEFENSE_STRATEGY"),
        &label("JUDGE_TEMPERAMENT"),
    )?;
    let source = EvidenceSource::from_arg(&case, &jurisdiction)?;
    let mc = MonteCarloConfig::from_config(&cfg, requests);
    let sim = Simulator::from_config(cfg)?;

    let result = sim.run_monte_carlo(source, &mc).await?;
    log(
        Level::Info,
        Domain::System,
        "batch_done",
        obj(&[
            ("batch_id", v_str(&result.batch_id)),
            ("plaintiff_win_rate", v_num(result.plaintiff_win_rate)),
            ("defense_win_rate", v_num(result.defense_win_rate)),
        ]),
    );

    match std::env::var("OUTPUT_PATH") {
        Ok(path) => result.write_json(&path)?,
        Err(_) => println!("{}", result.to_json()?),
    }
    Ok(())
}
