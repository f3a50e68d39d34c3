//! Genetic algorithm route builder.
//!
//! Individuals are stop sequences over a snapshot of the claimable
//! candidates, each no longer than the vehicle capacity. Evolution keeps the
//! best half of every generation and refills it with single-point crossover
//! and occasional mutation. Nothing is claimed until the winner is converted
//! into a route.

use crate::config::GaConfig;
use crate::heuristics::construction::vehicle_seed;
use crate::heuristics::RouteHeuristic;
use crate::scenario::{DeliveryPoint, Vehicle};
use crate::shared::SharedRunState;
use crate::solution::Route;
use ordered_float::OrderedFloat;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

/// Individual in the genetic algorithm population
#[derive(Debug, Clone)]
struct Individual {
    /// Indices into the candidate snapshot
    genes: Vec<usize>,
    fitness: f64,
}

impl Individual {
    fn new(genes: Vec<usize>, vehicle: &Vehicle, pool: &[DeliveryPoint], state: &SharedRunState) -> Self {
        let fitness = sequence_distance(vehicle, &genes, pool, state);
        Individual { genes, fitness }
    }
}

/// Route distance from the vehicle start; an empty sequence is the worst possible
fn sequence_distance(vehicle: &Vehicle, genes: &[usize], pool: &[DeliveryPoint], state: &SharedRunState) -> f64 {
    if genes.is_empty() {
        return f64::MAX;
    }

    let mut position = vehicle.coordinates();
    let mut total = 0.0;
    for &g in genes {
        let next = pool[g].coordinates();
        total += state.distance(position, next);
        position = next;
    }
    total
}

pub struct GeneticAlgorithmHeuristic {
    pub config: GaConfig,
    pub seed: u64,
}

impl GeneticAlgorithmHeuristic {
    pub fn new(config: GaConfig, seed: u64) -> Self {
        GeneticAlgorithmHeuristic { config, seed }
    }

    /// Prefix of `a` up to a random cut, then the stops of `b` not yet taken, in `b` order
    fn crossover<R: Rng>(&self, a: &[usize], b: &[usize], capacity: usize, rng: &mut R) -> Vec<usize> {
        let shortest = a.len().min(b.len());
        let cut = if shortest > 1 { rng.gen_range(1..shortest) } else { shortest };

        let mut child: Vec<usize> = a[..cut].to_vec();
        for &g in b {
            if !child.contains(&g) {
                child.push(g);
            }
        }
        child.truncate(capacity);
        child
    }

    fn mutate<R: Rng>(&self, genes: &mut Vec<usize>, pool_size: usize, capacity: usize, rng: &mut R) {
        if genes.len() > 1 && rng.gen::<f64>() < self.config.swap_prob {
            let i = rng.gen_range(0..genes.len());
            let j = rng.gen_range(0..genes.len());
            genes.swap(i, j);
        } else if genes.len() < capacity {
            let unused: Vec<usize> = (0..pool_size).filter(|g| !genes.contains(g)).collect();
            if let Some(&g) = unused.choose(rng) {
                genes.push(g);
            }
        }
    }

    /// Best individual's stops, in visiting order. Does not touch the claim ledger.
    fn evolve<R: Rng>(
        &self,
        vehicle: &Vehicle,
        pool: &[DeliveryPoint],
        state: &SharedRunState,
        rng: &mut R,
    ) -> Vec<usize> {
        let capacity = vehicle.max_capacity;
        let population_size = self.config.population_size.max(2);

        let mut population: Vec<Individual> = (0..population_size)
            .map(|_| {
                let mut genes: Vec<usize> = (0..pool.len()).collect();
                genes.shuffle(rng);
                genes.truncate(capacity);
                Individual::new(genes, vehicle, pool, state)
            })
            .collect();

        for _ in 0..self.config.generations {
            population.sort_by_key(|ind| OrderedFloat(ind.fitness));
            population.truncate(population_size / 2);
            let parents = population.len();

            while population.len() < population_size {
                let a = rng.gen_range(0..parents);
                let b = rng.gen_range(0..parents);
                let mut genes = self.crossover(&population[a].genes, &population[b].genes, capacity, rng);
                if rng.gen::<f64>() < self.config.mutation_prob {
                    self.mutate(&mut genes, pool.len(), capacity, rng);
                }
                population.push(Individual::new(genes, vehicle, pool, state));
            }
        }

        population
            .into_iter()
            .min_by_key(|ind| OrderedFloat(ind.fitness))
            .map(|ind| ind.genes)
            .unwrap_or_default()
    }

    /// Build with a caller-supplied random source
    pub fn build_with_rng<R: Rng>(
        &self,
        vehicle: &Vehicle,
        candidates: &[DeliveryPoint],
        state: &SharedRunState,
        rng: &mut R,
    ) -> Route {
        let mut pool = candidates.to_vec();
        state.retain_claimable(&mut pool);
        if pool.is_empty() || vehicle.max_capacity == 0 {
            return Route::empty(vehicle.id, self.name());
        }

        let best = self.evolve(vehicle, &pool, state, rng);

        // claim in order, skipping stops another worker took during evolution
        let mut position = vehicle.coordinates();
        let mut stops = Vec::with_capacity(best.len());
        let mut total_distance = 0.0;
        for g in best {
            if let Some(claimed) = state.claim(pool[g].id) {
                total_distance += state.distance(position, claimed.coordinates());
                position = claimed.coordinates();
                stops.push(claimed);
            }
        }

        log::trace!(
            "genetic algorithm: vehicle {} got {} stops ({:.2} km)",
            vehicle.id,
            stops.len(),
            total_distance
        );

        Route::from_sequence(vehicle, stops, total_distance, self.name(), state.config())
    }
}

impl RouteHeuristic for GeneticAlgorithmHeuristic {
    fn build(&self, vehicle: &Vehicle, candidates: &[DeliveryPoint], state: &SharedRunState) -> Route {
        let mut rng = ChaCha8Rng::seed_from_u64(vehicle_seed(self.seed, vehicle));
        self.build_with_rng(vehicle, candidates, state, &mut rng)
    }

    fn name(&self) -> &str {
        "GeneticAlgorithm"
    }
}
