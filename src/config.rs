use anyhow::{bail, Context};
use url::Url;

/// Reasoning backend settings. No endpoint selects the offline backend.
#[derive(Clone, Debug)]
pub struct ReasonerConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub max_output_tokens: u32,
    pub offline_seed: u64,
}

impl Default for ReasonerConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            model: "default".to_string(),
            timeout_ms: 30_000,
            max_retries: 2,
            max_output_tokens: 2048,
            offline_seed: 0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ResearchConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
    /// Results requested per query.
    pub max_results: usize,
    pub max_statutes: usize,
    pub max_precedents: usize,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            timeout_ms: 15_000,
            max_results: 2,
            max_statutes: 5,
            max_precedents: 5,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TrialConfig {
    pub include_rebuttals: bool,
    /// Confidence used when the judge gives none.
    pub fallback_confidence: f64,
}

impl Default for TrialConfig {
    fn default() -> Self {
        Self {
            include_rebuttals: true,
            fallback_confidence: 0.5,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingPlan {
    Random,
    Exhaustive,
}

impl SamplingPlan {
    pub fn as_str(&self) -> &'static str {
        match self {
            SamplingPlan::Random => "random",
            SamplingPlan::Exhaustive => "exhaustive",
        }
    }
}

impl std::str::FromStr for SamplingPlan {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "random" => Ok(SamplingPlan::Random),
            "exhaustive" | "grid" => Ok(SamplingPlan::Exhaustive),
            other => bail!("unknown sampling plan {:?} (expected random or exhaustive)", other),
        }
    }
}

#[derive(Clone, Debug)]
pub struct BatchConfig {
    pub runs: usize,
    pub parallelism: usize,
    pub seed: Option<u64>,
    pub failure_warn_fraction: f64,
    pub plan: SamplingPlan,
    pub vary_case_factors: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            runs: 10,
            parallelism: num_cpus::get().max(1),
            seed: None,
            failure_warn_fraction: 0.25,
            plan: SamplingPlan::Random,
            vary_case_factors: false,
        }
    }
}

/// Session configuration, passed explicitly to the backends and the simulator.
#[derive(Clone, Debug, Default)]
pub struct Config {
    pub reasoner: ReasonerConfig,
    pub research: ResearchConfig,
    pub trial: TrialConfig,
    pub batch: BatchConfig,
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

impl Config {
    pub fn from_env() -> Self {
        let d = Config::default();
        Self {
            reasoner: ReasonerConfig {
                endpoint: std::env::var("REASONER_ENDPOINT").ok().filter(|s| !s.is_empty()),
                api_key: std::env::var("REASONER_API_KEY").ok(),
                model: std::env::var("REASONER_MODEL").unwrap_or(d.reasoner.model),
                timeout_ms: std::env::var("REASONER_TIMEOUT_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.reasoner.timeout_ms),
                max_retries: std::env::var("REASONER_MAX_RETRIES").ok().and_then(|v| v.parse().ok()).unwrap_or(d.reasoner.max_retries),
                max_output_tokens: std::env::var("REASONER_MAX_OUTPUT_TOKENS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.reasoner.max_output_tokens),
                offline_seed: std::env::var("OFFLINE_SEED").ok().and_then(|v| v.parse().ok()).unwrap_or(d.reasoner.offline_seed),
            },
            research: ResearchConfig {
                endpoint: std::env::var("RESEARCH_ENDPOINT").ok().filter(|s| !s.is_empty()),
                api_key: std::env::var("RESEARCH_API_KEY").ok(),
                timeout_ms: std::env::var("RESEARCH_TIMEOUT_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.research.timeout_ms),
                max_results: std::env::var("RESEARCH_MAX_RESULTS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.research.max_results),
                max_statutes: std::env::var("MAX_STATUTES").ok().and_then(|v| v.parse().ok()).unwrap_or(d.research.max_statutes),
                max_precedents: std::env::var("MAX_PRECEDENTS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.research.max_precedents),
            },
            trial: TrialConfig {
                include_rebuttals: env_bool("INCLUDE_REBUTTALS", d.trial.include_rebuttals),
                fallback_confidence: std::env::var("FALLBACK_CONFIDENCE").ok().and_then(|v| v.parse().ok()).unwrap_or(d.trial.fallback_confidence),
            },
            batch: BatchConfig {
                runs: std::env::var("MC_RUNS").ok().and_then(|v| v.parse().ok()).unwrap_or(d.batch.runs),
                parallelism: std::env::var("MC_PARALLELISM").ok().and_then(|v| v.parse().ok()).unwrap_or(d.batch.parallelism),
                seed: std::env::var("MC_SEED").ok().and_then(|v| v.parse().ok()),
                failure_warn_fraction: std::env::var("MC_FAILURE_WARN_FRACTION").ok().and_then(|v| v.parse().ok()).unwrap_or(d.batch.failure_warn_fraction),
                plan: std::env::var("MC_PLAN").ok().and_then(|v| v.parse().ok()).unwrap_or(d.batch.plan),
                vary_case_factors: env_bool("MC_VARY_CASE_FACTORS", d.batch.vary_case_factors),
            },
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(endpoint) = &self.reasoner.endpoint {
            Url::parse(endpoint).with_context(|| format!("REASONER_ENDPOINT is not a valid URL: {}", endpoint))?;
        }
        if let Some(endpoint) = &self.research.endpoint {
            Url::parse(endpoint).with_context(|| format!("RESEARCH_ENDPOINT is not a valid URL: {}", endpoint))?;
        }
        if self.reasoner.timeout_ms == 0 {
            bail!("REASONER_TIMEOUT_MS must be positive");
        }
        if !(0.0..=1.0).contains(&self.trial.fallback_confidence) {
            bail!("FALLBACK_CONFIDENCE must be within [0, 1], got {}", self.trial.fallback_confidence);
        }
        if !(0.0..=1.0).contains(&self.batch.failure_warn_fraction) {
            bail!(
                "MC_FAILURE_WARN_FRACTION must be within [0, 1], got {}",
                self.batch.failure_warn_fraction
            );
        }
        if self.batch.parallelism == 0 {
            bail!("MC_PARALLELISM must be at least 1");
        }
        if self.batch.runs == 0 {
            bail!("MC_RUNS must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.trial.fallback_confidence, 0.5);
        assert_eq!(cfg.batch.runs, 10);
        assert!(cfg.batch.parallelism >= 1);
    }

    #[test]
    fn test_rejects_out_of_range() {
        let mut cfg = Config::default();
        cfg.batch.failure_warn_fraction = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.batch.parallelism = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.trial.fallback_confidence = -0.1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_endpoint() {
        let mut cfg = Config::default();
        cfg.reasoner.endpoint = Some("not a url".into());
        assert!(cfg.validate().is_err());
        cfg.reasoner.endpoint = Some("https://reasoner.internal/v1/generate".into());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_sampling_plan_parse() {
        assert_eq!("Exhaustive".parse::<SamplingPlan>().unwrap(), SamplingPlan::Exhaustive);
        assert_eq!("random".parse::<SamplingPlan>().unwrap(), SamplingPlan::Random);
        assert!("sometimes".parse::<SamplingPlan>().is_err());
    }
}
