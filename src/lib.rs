//! Legal trial simulation with Monte Carlo outcome analysis.
//!
//! A trial runs advocate and judge agents over one evidence packet through a
//! fixed phase sequence. A batch runs many independent trials, varying
//! strategies (and optionally case facts), and aggregates the verdicts.

pub mod agents;
pub mod aggregate;
pub mod case_factors;
pub mod config;
pub mod error;
pub mod evidence;
pub mod extract;
pub mod logging;
pub mod monte_carlo;
pub mod reasoner;
pub mod research;
pub mod retry;
pub mod strategy;
pub mod transcript;
pub mod trial;
pub mod verdict;

pub use aggregate::{MonteCarloResult, RunRecord};
pub use config::{Config, SamplingPlan};
pub use error::{ReasonerError, SimError, SimWarning};
pub use evidence::{EvidencePacket, Jurisdiction};
pub use monte_carlo::MonteCarloConfig;
pub use strategy::{Strategy, StrategyAssignment, StrategyRequest, StrategyRequestSet, Temperament};
pub use trial::{CancelHandle, EvidenceSource, Simulator, TrialOutcome, TrialState};
pub use verdict::{Outcome, Verdict};
