//! Strategy orchestrator.
//!
//! [`Optimizer::optimize`] builds a fresh [`SharedRunState`] for every call,
//! fans heuristics out across a bounded [`WorkerPool`] according to the
//! chosen [`Strategy`] and merges the routes into one [`OptimizationResult`].

use crate::config::EngineConfig;
use crate::distance;
use crate::error::{OptimizeError, Result};
use crate::heuristics::{HeuristicKind, NearestNeighborHeuristic, RouteHeuristic};
use crate::pool::WorkerPool;
use crate::scenario::{validate_input, DeliveryPoint, Vehicle};
use crate::shared::{DistanceCache, SharedRunState};
use crate::solution::{OptimizationResult, Route};
use crate::strategy::Strategy;
use chrono::Local;
use ordered_float::OrderedFloat;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// Routes of one strategy run plus the concurrency it reached
struct Outcome {
    routes: Vec<Route>,
    peak_workers: usize,
}

impl Outcome {
    fn new(routes: Vec<Route>, state: &SharedRunState) -> Self {
        Outcome {
            routes,
            peak_workers: state.limiter().peak(),
        }
    }

    fn total_distance(&self) -> f64 {
        self.routes.iter().map(|r| r.total_distance).sum()
    }
}

pub struct Optimizer {
    config: Arc<EngineConfig>,
    cache: Arc<DistanceCache>,
}

impl Optimizer {
    pub fn new(config: EngineConfig) -> Self {
        Optimizer {
            config: Arc::new(config),
            cache: Arc::new(DistanceCache::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Distance cache kept across calls over the same coordinate set
    pub fn cache(&self) -> &DistanceCache {
        &self.cache
    }

    /// Assign and order stops for the available vehicles under `strategy`.
    ///
    /// At most `max_threads` heuristic bodies run at once. Vehicles with
    /// `is_available == false` get no route.
    pub fn optimize(
        &self,
        deliveries: &[DeliveryPoint],
        vehicles: &[Vehicle],
        strategy: Strategy,
        max_threads: usize,
    ) -> Result<OptimizationResult> {
        if max_threads == 0 {
            return Err(OptimizeError::InvalidInput("thread budget must be at least 1".to_string()));
        }
        self.config.validate()?;
        validate_input(deliveries, vehicles)?;

        let fleet: Vec<Vehicle> = vehicles.iter().filter(|v| v.is_available).cloned().collect();
        if fleet.is_empty() {
            log::warn!("no available vehicles, {} deliveries stay unassigned", deliveries.len());
        }

        let threads = strategy.threads_used(max_threads);
        log::info!(
            "optimizing {} deliveries for {} vehicles with {} ({} threads)",
            deliveries.len(),
            fleet.len(),
            strategy,
            threads
        );

        let (hits_before, misses_before) = (self.cache.hits(), self.cache.misses());
        let start = Instant::now();
        let state = SharedRunState::new(self.run_config(), Arc::clone(&self.cache), threads);
        state.reset(deliveries, &fleet);

        let outcome = match strategy {
            Strategy::Sequential => sequential(&state, deliveries, &fleet),
            Strategy::ByHeuristic => by_heuristic(&state, deliveries, &fleet, threads)?,
            Strategy::ByGeographicZone => by_zone(&state, deliveries, &fleet, threads)?,
            Strategy::ByCandidateRoutes => by_candidates(&state, deliveries, &fleet, threads)?,
            Strategy::HybridApproach => hybrid(&state, deliveries, &fleet, threads)?,
        };

        // cache counters live as long as the cache; report this run's share
        let mut metrics = state.metrics();
        metrics.cache_hits = metrics.cache_hits.saturating_sub(hits_before);
        metrics.cache_misses = metrics.cache_misses.saturating_sub(misses_before);
        metrics.peak_workers = outcome.peak_workers;

        let mut result = OptimizationResult::from_routes(outcome.routes);
        result.strategy = strategy.name().to_string();
        result.execution_time = start.elapsed();
        result.threads_used = threads;
        result.created_at = Local::now();
        result.metrics = metrics;

        log::info!(
            "{}: {} routes, {}/{} deliveries, {:.2} km in {:.3}s",
            strategy,
            result.routes.len(),
            result.total_deliveries,
            deliveries.len(),
            result.total_distance,
            result.execution_time.as_secs_f64()
        );
        Ok(result)
    }

    /// Per-call config: an unset departure is pinned to now so every heuristic shares one clock
    fn run_config(&self) -> Arc<EngineConfig> {
        if self.config.departure.is_some() {
            return Arc::clone(&self.config);
        }
        let mut config = (*self.config).clone();
        config.departure = Some(Local::now().time());
        Arc::new(config)
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

/// One nearest-neighbor pass per vehicle, in fleet order
fn sequential(state: &SharedRunState, deliveries: &[DeliveryPoint], fleet: &[Vehicle]) -> Outcome {
    let heuristic = NearestNeighborHeuristic::new();
    let _permit = state.limiter().acquire();

    let routes: Vec<Route> = fleet
        .iter()
        .map(|vehicle| {
            let route = heuristic.build(vehicle, deliveries, state);
            state.record_route(&route);
            route
        })
        .collect();

    Outcome::new(routes, state)
}

/// Every heuristic as one job looping over the fleet; best route per vehicle wins
fn by_heuristic(state: &SharedRunState, deliveries: &[DeliveryPoint], fleet: &[Vehicle], threads: usize) -> Result<Outcome> {
    let config = state.config();
    let heuristics: Vec<Box<dyn RouteHeuristic + Send + Sync>> = HeuristicKind::ALL
        .iter()
        .map(|kind| kind.create(config.seed, &config.ga))
        .collect();

    run_heuristics(state, heuristics, deliveries, fleet, threads)
}

/// One pool job per heuristic; a panicking job fails the whole run
fn run_heuristics(
    state: &SharedRunState,
    heuristics: Vec<Box<dyn RouteHeuristic + Send + Sync>>,
    deliveries: &[DeliveryPoint],
    fleet: &[Vehicle],
    threads: usize,
) -> Result<Outcome> {
    let pool = WorkerPool::new(threads)?;
    let per_heuristic = pool.run_all(heuristics, |heuristic| {
        let _permit = state.limiter().acquire();
        log::debug!("{} started on {} vehicles", heuristic.name(), fleet.len());
        fleet
            .iter()
            .map(|vehicle| {
                let route = heuristic.build(vehicle, deliveries, state);
                state.record_route(&route);
                route
            })
            .collect::<Vec<Route>>()
    })?;

    let routes = best_per_vehicle(per_heuristic.into_iter().flatten(), fleet);
    Ok(Outcome::new(routes, state))
}

/// `candidate` replaces `current` when it is non-empty and either `current` is empty or longer
fn is_better(candidate: &Route, current: &Route) -> bool {
    !candidate.is_empty() && (current.is_empty() || candidate.total_distance < current.total_distance)
}

/// Keep one route per vehicle, in fleet order; ties go to the earlier route
fn best_per_vehicle<I: IntoIterator<Item = Route>>(routes: I, fleet: &[Vehicle]) -> Vec<Route> {
    let mut best: HashMap<u32, Route> = HashMap::new();
    for route in routes {
        match best.get(&route.vehicle_id) {
            Some(current) if !is_better(&route, current) => {}
            _ => {
                best.insert(route.vehicle_id, route);
            }
        }
    }
    fleet.iter().filter_map(|v| best.remove(&v.id)).collect()
}

/// Split deliveries into `zone_count` latitude bands; the last band takes the remainder
pub(crate) fn geographic_zones(deliveries: &[DeliveryPoint], zone_count: usize) -> Vec<Vec<DeliveryPoint>> {
    let zone_count = zone_count.max(1);
    let mut sorted = deliveries.to_vec();
    sorted.sort_by_key(|d| (OrderedFloat(d.latitude), d.id));

    let per_zone = sorted.len() / zone_count;
    let mut zones = Vec::with_capacity(zone_count);
    for i in 0..zone_count {
        let start = (i * per_zone).min(sorted.len());
        let end = if i + 1 == zone_count { sorted.len() } else { (start + per_zone).min(sorted.len()) };
        zones.push(sorted[start..end].to_vec());
    }
    zones
}

/// The nearest quarter of the fleet (at least one vehicle) to the zone centroid
pub(crate) fn zone_vehicles(zone: &[DeliveryPoint], fleet: &[Vehicle]) -> Vec<Vehicle> {
    if zone.is_empty() || fleet.is_empty() {
        return Vec::new();
    }

    let n = zone.len() as f64;
    let lat = zone.iter().map(|d| d.latitude).sum::<f64>() / n;
    let lon = zone.iter().map(|d| d.longitude).sum::<f64>() / n;

    let mut ranked: Vec<&Vehicle> = fleet.iter().collect();
    ranked.sort_by_key(|v| (OrderedFloat(distance::distance(v.latitude, v.longitude, lat, lon)), v.id));
    ranked.into_iter().take((fleet.len() / 4).max(1)).cloned().collect()
}

/// Nearest-neighbor per latitude band, one job per band
fn by_zone(state: &SharedRunState, deliveries: &[DeliveryPoint], fleet: &[Vehicle], threads: usize) -> Result<Outcome> {
    let jobs: Vec<(Vec<DeliveryPoint>, Vec<Vehicle>)> = geographic_zones(deliveries, threads)
        .into_iter()
        .map(|zone| {
            let vehicles = zone_vehicles(&zone, fleet);
            (zone, vehicles)
        })
        .collect();

    let heuristic = NearestNeighborHeuristic::new();
    let pool = WorkerPool::new(threads)?;
    let per_zone = pool.run_all(jobs, |(zone, vehicles)| {
        let _permit = state.limiter().acquire();
        vehicles
            .iter()
            .map(|vehicle| {
                let route = heuristic.build(vehicle, &zone, state);
                state.record_route(&route);
                route
            })
            .collect::<Vec<Route>>()
    })?;

    Ok(Outcome::new(per_zone.into_iter().flatten().collect(), state))
}

/// Speculative randomized-greedy candidates per (vehicle, slot); the cheapest
/// non-overlapping ones are committed, one per vehicle
fn by_candidates(state: &SharedRunState, deliveries: &[DeliveryPoint], fleet: &[Vehicle], threads: usize) -> Result<Outcome> {
    let base_seed = state.config().seed;
    let jobs: Vec<(usize, &Vehicle)> = fleet
        .iter()
        .flat_map(|vehicle| (0..threads).map(move |slot| (slot, vehicle)))
        .collect();

    let pool = WorkerPool::new(threads)?;
    let candidates = pool.run_all(jobs, |(slot, vehicle)| {
        let _permit = state.limiter().acquire();
        let seed = candidate_seed(base_seed, vehicle.id, slot);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let fork = state.speculative_fork();
        NearestNeighborHeuristic::randomized(seed).build_with_rng(vehicle, deliveries, &fork, &mut rng)
    })?;

    let selected = select_non_overlapping(candidates, fleet.len());
    for route in &selected {
        state.commit(route);
    }
    log::debug!("committed {} of {} candidate vehicles", selected.len(), fleet.len());

    Ok(Outcome::new(selected, state))
}

/// Seed of one (vehicle, slot) candidate; vehicle id in the high half, slot in the low half
pub(crate) fn candidate_seed(base: u64, vehicle_id: u32, slot: usize) -> u64 {
    base ^ (((vehicle_id as u64) << 32) | (slot as u64 & 0xffff_ffff))
}

/// Greedy selection by distance per stop, skipping candidates that reuse a
/// stop or a vehicle already selected
pub(crate) fn select_non_overlapping(mut candidates: Vec<Route>, vehicle_count: usize) -> Vec<Route> {
    // stable sort keeps submission order among equal scores
    candidates.sort_by_key(|r| OrderedFloat(r.distance_per_stop()));

    let mut used_deliveries = HashSet::new();
    let mut used_vehicles = HashSet::new();
    let mut selected = Vec::new();

    for candidate in candidates {
        if selected.len() >= vehicle_count {
            break;
        }
        if used_vehicles.contains(&candidate.vehicle_id)
            || candidate.deliveries.iter().any(|d| used_deliveries.contains(&d.id))
        {
            continue;
        }
        used_vehicles.insert(candidate.vehicle_id);
        used_deliveries.extend(candidate.deliveries.iter().map(|d| d.id));
        selected.push(candidate);
    }
    selected
}

/// By-heuristic and by-zone on isolated branches; the shorter total wins
fn hybrid(state: &SharedRunState, deliveries: &[DeliveryPoint], fleet: &[Vehicle], threads: usize) -> Result<Outcome> {
    let (heuristic_budget, zone_budget) = if threads == 1 { (1, 1) } else { (threads - threads / 2, threads / 2) };
    let heuristic_state = state.branch(heuristic_budget);
    let zone_state = state.branch(zone_budget);

    let (by_heuristic_outcome, by_zone_outcome) = if threads == 1 {
        (
            by_heuristic(&heuristic_state, deliveries, fleet, heuristic_budget)?,
            by_zone(&zone_state, deliveries, fleet, zone_budget)?,
        )
    } else {
        thread::scope(|s| {
            let heuristic_branch = s.spawn(|| by_heuristic(&heuristic_state, deliveries, fleet, heuristic_budget));
            let zone_branch = s.spawn(|| by_zone(&zone_state, deliveries, fleet, zone_budget));
            let heuristic_outcome = join_branch(heuristic_branch.join());
            let zone_outcome = join_branch(zone_branch.join());
            Ok::<_, OptimizeError>((heuristic_outcome?, zone_outcome?))
        })?
    };

    // concurrent branches add up; sequential ones never overlap
    let peak_workers = if threads == 1 {
        by_heuristic_outcome.peak_workers.max(by_zone_outcome.peak_workers)
    } else {
        by_heuristic_outcome.peak_workers + by_zone_outcome.peak_workers
    };

    log::debug!(
        "hybrid: by-heuristic {:.2} km, by-zone {:.2} km",
        by_heuristic_outcome.total_distance(),
        by_zone_outcome.total_distance()
    );
    let winner = if by_zone_outcome.total_distance() < by_heuristic_outcome.total_distance() {
        by_zone_outcome
    } else {
        by_heuristic_outcome
    };

    for route in &winner.routes {
        state.commit(route);
    }
    Ok(Outcome {
        routes: winner.routes,
        peak_workers,
    })
}

fn join_branch(joined: thread::Result<Result<Outcome>>) -> Result<Outcome> {
    joined.unwrap_or_else(|_| Err(OptimizeError::WorkerFailure("hybrid branch panicked".to_string())))
}
