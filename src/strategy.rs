//! Strategy and temperament enums, randomisation requests and their resolution.
//!
//! A `StrategyRequest` is either a concrete value or a request to sample
//! uniformly. Requests are resolved exactly once, at trial construction, into a
//! `StrategyAssignment` that holds concrete values only.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::StrategyResolutionError;

/// Advocacy strategy shared by prosecutor and defense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Aggressive,
    Moderate,
    Conservative,
}

impl Strategy {
    /// Declaration order; also the tie-break order for best-strategy reporting.
    pub const ALL: [Strategy; 3] = [Strategy::Aggressive, Strategy::Moderate, Strategy::Conservative];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Aggressive => "aggressive",
            Strategy::Moderate => "moderate",
            Strategy::Conservative => "conservative",
        }
    }
}

/// Judicial temperament.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Temperament {
    Strict,
    Balanced,
    Lenient,
}

impl Temperament {
    pub const ALL: [Temperament; 3] = [Temperament::Strict, Temperament::Balanced, Temperament::Lenient];

    pub fn as_str(&self) -> &'static str {
        match self {
            Temperament::Strict => "strict",
            Temperament::Balanced => "balanced",
            Temperament::Lenient => "lenient",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Temperament {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = StrategyResolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "aggressive" => Ok(Strategy::Aggressive),
            "moderate" => Ok(Strategy::Moderate),
            "conservative" => Ok(Strategy::Conservative),
            _ => Err(StrategyResolutionError {
                field: "strategy",
                value: s.to_string(),
                expected: "aggressive, moderate, conservative",
            }),
        }
    }
}

impl FromStr for Temperament {
    type Err = StrategyResolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Ok(Temperament::Strict),
            "balanced" => Ok(Temperament::Balanced),
            "lenient" => Ok(Temperament::Lenient),
            _ => Err(StrategyResolutionError {
                field: "temperament",
                value: s.to_string(),
                expected: "strict, balanced, lenient",
            }),
        }
    }
}

/// Enumerations that can be sampled uniformly.
pub trait Choice: Copy + 'static {
    const VALUES: &'static [Self];
}

impl Choice for Strategy {
    const VALUES: &'static [Self] = &Strategy::ALL;
}

impl Choice for Temperament {
    const VALUES: &'static [Self] = &Temperament::ALL;
}

/// A literal value or a request to draw one uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "value")]
pub enum StrategyRequest<T> {
    Fixed(T),
    Random,
}

impl<T: Choice> StrategyRequest<T> {
    pub fn resolve<R: Rng + ?Sized>(&self, rng: &mut R) -> T {
        match self {
            StrategyRequest::Fixed(v) => *v,
            StrategyRequest::Random => T::VALUES[rng.gen_range(0..T::VALUES.len())],
        }
    }

    pub fn is_random(&self) -> bool {
        matches!(self, StrategyRequest::Random)
    }
}

impl<T: FromStr<Err = StrategyResolutionError>> StrategyRequest<T> {
    /// Parse a literal value or the `random` sentinel.
    pub fn parse(field: &'static str, s: &str) -> Result<Self, StrategyResolutionError> {
        if s.trim().eq_ignore_ascii_case("random") {
            return Ok(StrategyRequest::Random);
        }
        s.parse::<T>()
            .map(StrategyRequest::Fixed)
            .map_err(|mut e| {
                e.field = field;
                e
            })
    }
}

/// Per-field requests for one trial (or one batch of trials).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyRequestSet {
    pub prosecutor: StrategyRequest<Strategy>,
    pub defense: StrategyRequest<Strategy>,
    pub judge: StrategyRequest<Temperament>,
}

impl Default for StrategyRequestSet {
    fn default() -> Self {
        Self {
            prosecutor: StrategyRequest::Fixed(Strategy::Moderate),
            defense: StrategyRequest::Fixed(Strategy::Moderate),
            judge: StrategyRequest::Fixed(Temperament::Balanced),
        }
    }
}

impl StrategyRequestSet {
    pub fn fixed(prosecutor: Strategy, defense: Strategy, judge: Temperament) -> Self {
        Self {
            prosecutor: StrategyRequest::Fixed(prosecutor),
            defense: StrategyRequest::Fixed(defense),
            judge: StrategyRequest::Fixed(judge),
        }
    }

    pub fn all_random() -> Self {
        Self {
            prosecutor: StrategyRequest::Random,
            defense: StrategyRequest::Random,
            judge: StrategyRequest::Random,
        }
    }

    /// Parse string labels (`aggressive`, ..., or `random`). Rejects before any work is done.
    pub fn from_labels(prosecutor: &str, defense: &str, judge: &str) -> Result<Self, StrategyResolutionError> {
        Ok(Self {
            prosecutor: StrategyRequest::parse("prosecutor_strategy", prosecutor)?,
            defense: StrategyRequest::parse("defense_strategy", defense)?,
            judge: StrategyRequest::parse("judge_temperament", judge)?,
        })
    }

    pub fn resolve<R: Rng + ?Sized>(&self, rng: &mut R) -> StrategyAssignment {
        StrategyAssignment {
            prosecutor_strategy: self.prosecutor.resolve(rng),
            defense_strategy: self.defense.resolve(rng),
            judge_temperament: self.judge.resolve(rng),
        }
    }

    /// Cartesian grid over the randomised fields, fixed fields held, in declaration order.
    pub fn enumerate(&self) -> Vec<StrategyAssignment> {
        let prosecutors = expand(&self.prosecutor);
        let defenses = expand(&self.defense);
        let judges = expand(&self.judge);
        let mut grid = Vec::with_capacity(prosecutors.len() * defenses.len() * judges.len());
        for &p in &prosecutors {
            for &d in &defenses {
                for &j in &judges {
                    grid.push(StrategyAssignment {
                        prosecutor_strategy: p,
                        defense_strategy: d,
                        judge_temperament: j,
                    });
                }
            }
        }
        grid
    }
}

fn expand<T: Choice>(req: &StrategyRequest<T>) -> Vec<T> {
    match req {
        StrategyRequest::Fixed(v) => vec![*v],
        StrategyRequest::Random => T::VALUES.to_vec(),
    }
}

/// Concrete strategy tuple actually used by a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StrategyAssignment {
    pub prosecutor_strategy: Strategy,
    pub defense_strategy: Strategy,
    pub judge_temperament: Temperament,
}

impl fmt::Display for StrategyAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "P={} D={} J={}",
            self.prosecutor_strategy, self.defense_strategy, self.judge_temperament
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};
    use std::collections::HashSet;

    #[test]
    fn test_fixed_resolves_to_itself() {
        let mut rng = StdRng::seed_from_u64(1);
        let set = StrategyRequestSet::fixed(Strategy::Aggressive, Strategy::Conservative, Temperament::Strict);
        let a = set.resolve(&mut rng);
        assert_eq!(a.prosecutor_strategy, Strategy::Aggressive);
        assert_eq!(a.defense_strategy, Strategy::Conservative);
        assert_eq!(a.judge_temperament, Temperament::Strict);
    }

    #[test]
    fn test_random_covers_enum() {
        let mut rng = StdRng::seed_from_u64(7);
        let req: StrategyRequest<Strategy> = StrategyRequest::Random;
        let seen: HashSet<Strategy> = (0..200).map(|_| req.resolve(&mut rng)).collect();
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_parse_labels() {
        let set = StrategyRequestSet::from_labels("Aggressive", "random", "lenient").unwrap();
        assert_eq!(set.prosecutor, StrategyRequest::Fixed(Strategy::Aggressive));
        assert!(set.defense.is_random());
        assert_eq!(set.judge, StrategyRequest::Fixed(Temperament::Lenient));
    }

    #[test]
    fn test_parse_rejects_unknown_value() {
        let err = StrategyRequestSet::from_labels("moderate", "sneaky", "strict").unwrap_err();
        assert_eq!(err.field, "defense_strategy");
        assert_eq!(err.value, "sneaky");
    }

    #[test]
    fn test_enumerate_grid() {
        let set = StrategyRequestSet {
            prosecutor: StrategyRequest::Random,
            defense: StrategyRequest::Fixed(Strategy::Moderate),
            judge: StrategyRequest::Random,
        };
        let grid = set.enumerate();
        assert_eq!(grid.len(), 9);
        assert_eq!(grid[0].prosecutor_strategy, Strategy::Aggressive);
        assert_eq!(grid[0].judge_temperament, Temperament::Strict);
        assert!(grid.iter().all(|a| a.defense_strategy == Strategy::Moderate));
        assert_eq!(StrategyRequestSet::all_random().enumerate().len(), 27);
    }
}
