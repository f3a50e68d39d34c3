//! Parallelization strategies.

use crate::error::OptimizeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How heuristic invocations are partitioned across the thread budget
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    /// Nearest-neighbor per vehicle, no concurrency (speedup baseline)
    Sequential,
    /// All heuristics concurrently, best route per vehicle kept
    ByHeuristic,
    /// One worker per latitude band
    ByGeographicZone,
    /// Seeded randomized-greedy candidates, non-overlapping selection
    ByCandidateRoutes,
    /// ByHeuristic and ByGeographicZone side by side, lower total distance wins
    HybridApproach,
}

impl Strategy {
    pub const ALL: [Strategy; 5] = [
        Strategy::Sequential,
        Strategy::ByHeuristic,
        Strategy::ByGeographicZone,
        Strategy::ByCandidateRoutes,
        Strategy::HybridApproach,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Sequential => "Sequential",
            Strategy::ByHeuristic => "ByHeuristic",
            Strategy::ByGeographicZone => "ByGeographicZone",
            Strategy::ByCandidateRoutes => "ByCandidateRoutes",
            Strategy::HybridApproach => "HybridApproach",
        }
    }

    /// Threads reported in a result for a requested budget
    pub fn threads_used(&self, max_threads: usize) -> usize {
        match self {
            Strategy::Sequential => 1,
            _ => max_threads,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Strategy {
    type Err = OptimizeError;

    /// Accepts the variant name in any case, with or without `-`/`_` separators
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_' && !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "sequential" => Ok(Strategy::Sequential),
            "byheuristic" | "heuristic" => Ok(Strategy::ByHeuristic),
            "bygeographiczone" | "zone" | "geographiczone" => Ok(Strategy::ByGeographicZone),
            "bycandidateroutes" | "candidates" | "candidateroutes" => Ok(Strategy::ByCandidateRoutes),
            "hybridapproach" | "hybrid" => Ok(Strategy::HybridApproach),
            _ => Err(OptimizeError::InvalidStrategy(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trips_names() {
        for strategy in Strategy::ALL {
            assert_eq!(strategy.name().parse::<Strategy>(), Ok(strategy));
        }
        assert_eq!("by-geographic-zone".parse::<Strategy>(), Ok(Strategy::ByGeographicZone));
        assert_eq!("hybrid".parse::<Strategy>(), Ok(Strategy::HybridApproach));
    }

    #[test]
    fn test_unknown_strategy_is_rejected() {
        let err = "simulated-annealing".parse::<Strategy>().unwrap_err();
        assert_eq!(err, OptimizeError::InvalidStrategy("simulated-annealing".to_string()));
    }

    #[test]
    fn test_threads_used() {
        assert_eq!(Strategy::Sequential.threads_used(8), 1);
        assert_eq!(Strategy::ByHeuristic.threads_used(8), 8);
    }
}
