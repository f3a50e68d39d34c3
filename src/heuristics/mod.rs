//! Route construction heuristics.
//!
//! Every heuristic builds one vehicle's route from a candidate set, claiming
//! stops through the shared run state so that concurrent heuristics never
//! commit the same stop twice.

pub mod construction;
pub mod genetic;

pub use construction::*;
pub use genetic::*;

use crate::config::GaConfig;
use crate::scenario::{DeliveryPoint, Vehicle};
use crate::shared::SharedRunState;
use crate::solution::Route;
use serde::{Deserialize, Serialize};

pub trait RouteHeuristic {
    /// Build a route of at most `vehicle.max_capacity` stops, each won via a claim
    fn build(&self, vehicle: &Vehicle, candidates: &[DeliveryPoint], state: &SharedRunState) -> Route;
    fn name(&self) -> &str;
}

/// The heuristics available to strategies
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HeuristicKind {
    NearestNeighbor,
    GreedyTime,
    PriorityBased,
    GeneticAlgorithm,
    RandomizedGreedy,
}

impl HeuristicKind {
    pub const ALL: [HeuristicKind; 5] = [
        HeuristicKind::NearestNeighbor,
        HeuristicKind::GreedyTime,
        HeuristicKind::PriorityBased,
        HeuristicKind::GeneticAlgorithm,
        HeuristicKind::RandomizedGreedy,
    ];

    /// Instantiate with the run's base seed
    pub fn create(&self, seed: u64, ga: &GaConfig) -> Box<dyn RouteHeuristic + Send + Sync> {
        match self {
            HeuristicKind::NearestNeighbor => Box::new(NearestNeighborHeuristic::new()),
            HeuristicKind::GreedyTime => Box::new(GreedyTimeHeuristic::new()),
            HeuristicKind::PriorityBased => Box::new(PriorityHeuristic::new()),
            HeuristicKind::GeneticAlgorithm => Box::new(GeneticAlgorithmHeuristic::new(ga.clone(), seed)),
            HeuristicKind::RandomizedGreedy => Box::new(NearestNeighborHeuristic::randomized(seed)),
        }
    }
}
