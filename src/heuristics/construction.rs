use crate::distance::estimate_time;
use crate::heuristics::RouteHeuristic;
use crate::scenario::{DeliveryPoint, Vehicle};
use crate::shared::SharedRunState;
use crate::solution::Route;
use ordered_float::OrderedFloat;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

/// Seed for one vehicle's run of a stochastic heuristic
pub(crate) fn vehicle_seed(seed: u64, vehicle: &Vehicle) -> u64 {
    seed.wrapping_add(vehicle.id as u64)
}

/// Nearest Neighbor Heuristic
///
/// Repeatedly visits the nearest stop that is still claimable. The
/// randomized variant (randomized greedy) picks uniformly among the
/// `top_k` nearest instead.
pub struct NearestNeighborHeuristic {
    pub randomized: bool,
    pub seed: u64,
    pub top_k: usize,
}

impl NearestNeighborHeuristic {
    pub fn new() -> Self {
        NearestNeighborHeuristic {
            randomized: false,
            seed: 42,
            top_k: 1,
        }
    }

    pub fn randomized(seed: u64) -> Self {
        NearestNeighborHeuristic {
            randomized: true,
            seed,
            top_k: 3,
        }
    }

    /// Index of the next stop among `unvisited`, which holds only claimable stops
    fn find_nearest<R: Rng>(
        &self,
        position: (f64, f64),
        unvisited: &[DeliveryPoint],
        state: &SharedRunState,
        rng: &mut R,
    ) -> Option<usize> {
        let mut candidates: Vec<(usize, f64)> = unvisited
            .iter()
            .enumerate()
            .map(|(i, d)| (i, state.distance(position, d.coordinates())))
            .collect();

        if candidates.is_empty() {
            return None;
        }

        // ties broken by id so the order never depends on input order
        candidates.sort_by_key(|&(i, d)| (OrderedFloat(d), unvisited[i].id));

        if self.randomized && candidates.len() > 1 {
            let top_k = candidates.len().min(self.top_k.max(1));
            let idx = rng.gen_range(0..top_k);
            Some(candidates[idx].0)
        } else {
            Some(candidates[0].0)
        }
    }

    /// Build with a caller-supplied random source
    pub fn build_with_rng<R: Rng>(
        &self,
        vehicle: &Vehicle,
        candidates: &[DeliveryPoint],
        state: &SharedRunState,
        rng: &mut R,
    ) -> Route {
        let mut unvisited = candidates.to_vec();
        let mut position = vehicle.coordinates();
        let mut stops = Vec::new();
        let mut total_distance = 0.0;

        while stops.len() < vehicle.max_capacity {
            state.retain_claimable(&mut unvisited);
            let Some(idx) = self.find_nearest(position, &unvisited, state, rng) else {
                break;
            };

            let next = unvisited.remove(idx);
            // another worker may have won it since the retain
            if let Some(claimed) = state.claim(next.id) {
                total_distance += state.distance(position, claimed.coordinates());
                position = claimed.coordinates();
                stops.push(claimed);
            }
        }

        Route::from_sequence(vehicle, stops, total_distance, self.name(), state.config())
    }
}

impl Default for NearestNeighborHeuristic {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteHeuristic for NearestNeighborHeuristic {
    fn build(&self, vehicle: &Vehicle, candidates: &[DeliveryPoint], state: &SharedRunState) -> Route {
        let mut rng = ChaCha8Rng::seed_from_u64(vehicle_seed(self.seed, vehicle));
        self.build_with_rng(vehicle, candidates, state, &mut rng)
    }

    fn name(&self) -> &str {
        if self.randomized {
            "RandomizedGreedy"
        } else {
            "NearestNeighbor"
        }
    }
}

/// Time-based greedy heuristic
///
/// Walks the stops in order of window opening and takes a stop only when the
/// simulated arrival is no later than the window end plus the tolerance.
pub struct GreedyTimeHeuristic;

impl GreedyTimeHeuristic {
    pub fn new() -> Self {
        GreedyTimeHeuristic
    }
}

impl Default for GreedyTimeHeuristic {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteHeuristic for GreedyTimeHeuristic {
    fn build(&self, vehicle: &Vehicle, candidates: &[DeliveryPoint], state: &SharedRunState) -> Route {
        let config = state.config();
        let mut ordered = candidates.to_vec();
        state.retain_claimable(&mut ordered);
        ordered.sort_by_key(|d| (d.window.start, d.id));

        let departure = config.departure_offset();
        let mut clock = departure;
        let mut position = vehicle.coordinates();
        let mut stops = Vec::new();
        let mut total_distance = 0.0;

        for delivery in ordered {
            if stops.len() >= vehicle.max_capacity {
                break;
            }

            let leg = state.distance(position, delivery.coordinates());
            let arrival = clock + estimate_time(leg, config.average_speed_kmh);
            if !delivery.window.accepts(arrival, config.window_tolerance) {
                continue;
            }

            if let Some(claimed) = state.claim(delivery.id) {
                total_distance += leg;
                clock = arrival + config.service_time;
                position = claimed.coordinates();
                stops.push(claimed);
            }
        }

        Route::with_schedule(vehicle, stops, total_distance, clock - departure, self.name(), config)
    }

    fn name(&self) -> &str {
        "GreedyTime"
    }
}

/// Priority-based greedy heuristic
///
/// Takes stops by (priority, window opening) with no feasibility check.
pub struct PriorityHeuristic;

impl PriorityHeuristic {
    pub fn new() -> Self {
        PriorityHeuristic
    }
}

impl Default for PriorityHeuristic {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteHeuristic for PriorityHeuristic {
    fn build(&self, vehicle: &Vehicle, candidates: &[DeliveryPoint], state: &SharedRunState) -> Route {
        let mut ordered = candidates.to_vec();
        state.retain_claimable(&mut ordered);
        ordered.sort_by_key(|d| (d.priority, d.window.start, d.id));

        let mut position = vehicle.coordinates();
        let mut stops = Vec::new();
        let mut total_distance = 0.0;

        for delivery in ordered {
            if stops.len() >= vehicle.max_capacity {
                break;
            }
            if let Some(claimed) = state.claim(delivery.id) {
                total_distance += state.distance(position, claimed.coordinates());
                position = claimed.coordinates();
                stops.push(claimed);
            }
        }

        Route::from_sequence(vehicle, stops, total_distance, self.name(), state.config())
    }

    fn name(&self) -> &str {
        "PriorityBased"
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::{EngineConfig, GaConfig};
    use crate::heuristics::GeneticAlgorithmHeuristic;
    use crate::scenario::TimeWindow;
    use crate::shared::DistanceCache;
    use chrono::NaiveTime;
    use std::sync::Arc;

    pub(crate) fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    /// Five stops east of the depot at 0.01 degree steps, ids 1..=5
    pub(crate) fn line_of_stops() -> Vec<DeliveryPoint> {
        (1..=5).map(|i| DeliveryPoint::new(i, 0.0, i as f64 * 0.01)).collect()
    }

    pub(crate) fn fresh_state(deliveries: &[DeliveryPoint], vehicles: &[Vehicle]) -> SharedRunState {
        let state = SharedRunState::new(
            Arc::new(EngineConfig::departing_at(at(8, 0))),
            Arc::new(DistanceCache::new()),
            1,
        );
        state.reset(deliveries, vehicles);
        state
    }

    #[test]
    fn test_nearest_neighbor_order() {
        let mut stops = line_of_stops();
        stops.reverse();
        let vehicle = Vehicle::new(1, 0.0, 0.0, 10);
        let state = fresh_state(&stops, &[vehicle.clone()]);

        let route = NearestNeighborHeuristic::new().build(&vehicle, &stops, &state);
        assert_eq!(route.delivery_ids(), vec![1, 2, 3, 4, 5]);
        assert_eq!(route.heuristic, "NearestNeighbor");
        assert!(route.deliveries.iter().all(|d| d.is_delivered));
        // 0.05 degrees of longitude on the equator
        assert!((route.total_distance - 5.5597).abs() < 1e-3);
        assert_eq!(state.claimed_count(), 5);
    }

    #[test]
    fn test_capacity_limits_every_heuristic() {
        let stops = line_of_stops();
        let vehicle = Vehicle::new(1, 0.0, 0.0, 1);
        let heuristics: Vec<Box<dyn RouteHeuristic + Send + Sync>> = vec![
            Box::new(NearestNeighborHeuristic::new()),
            Box::new(NearestNeighborHeuristic::randomized(3)),
            Box::new(GreedyTimeHeuristic::new()),
            Box::new(PriorityHeuristic::new()),
            Box::new(GeneticAlgorithmHeuristic::new(GaConfig::default(), 1)),
        ];

        for heuristic in heuristics {
            let state = fresh_state(&stops, &[vehicle.clone()]);
            let route = heuristic.build(&vehicle, &stops, &state);
            assert_eq!(route.len(), 1, "{}", heuristic.name());
            assert_eq!(state.claimed_count(), 1);
        }
    }

    #[test]
    fn test_claimed_stops_are_skipped() {
        let stops = line_of_stops();
        let vehicle = Vehicle::new(1, 0.0, 0.0, 10);
        let state = fresh_state(&stops, &[vehicle.clone()]);
        assert!(state.try_claim(1));
        assert!(state.try_claim(3));

        let route = NearestNeighborHeuristic::new().build(&vehicle, &stops, &state);
        assert_eq!(route.delivery_ids(), vec![2, 4, 5]);

        let second = PriorityHeuristic::new().build(&vehicle, &stops, &state);
        assert!(second.is_empty());
    }

    #[test]
    fn test_randomized_greedy_is_seeded() {
        let stops: Vec<DeliveryPoint> =
            (1..=12).map(|i| DeliveryPoint::new(i, (i % 4) as f64 * 0.01, (i / 4) as f64 * 0.01)).collect();
        let vehicle = Vehicle::new(1, 0.0, 0.0, 12);

        let run = |seed: u64| {
            let state = fresh_state(&stops, &[vehicle.clone()]);
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            NearestNeighborHeuristic::randomized(0)
                .build_with_rng(&vehicle, &stops, &state, &mut rng)
                .delivery_ids()
        };

        assert_eq!(run(11), run(11));
        assert_eq!(run(11).len(), 12);
    }

    #[test]
    fn test_greedy_time_respects_windows() {
        let vehicle = Vehicle::new(1, 0.0, 0.0, 10);
        let stops = vec![
            DeliveryPoint::new(1, 0.0, 0.02).with_window(TimeWindow::new(at(10, 0), at(11, 0))),
            DeliveryPoint::new(2, 0.0, 0.01).with_window(TimeWindow::new(at(8, 0), at(9, 0))),
            // closed two hours before departure, beyond the tolerance
            DeliveryPoint::new(3, 0.0, 0.03).with_window(TimeWindow::new(at(5, 0), at(6, 0))),
        ];
        let state = fresh_state(&stops, &[vehicle.clone()]);

        let route = GreedyTimeHeuristic::new().build(&vehicle, &stops, &state);
        assert_eq!(route.delivery_ids(), vec![2, 1]);
        assert!(state.is_claimable(3));
        assert_eq!(route.deliveries_on_time, 2);
        // two service stops plus a few minutes of driving
        assert!(route.estimated_time >= std::time::Duration::from_secs(600));
        assert!(route.estimated_time < std::time::Duration::from_secs(900));
    }

    #[test]
    fn test_priority_order() {
        let vehicle = Vehicle::new(1, 0.0, 0.0, 10);
        let stops = vec![
            DeliveryPoint::new(1, 0.0, 0.01).with_priority(3),
            DeliveryPoint::new(2, 0.0, 0.02).with_priority(1).with_window(TimeWindow::new(at(12, 0), at(13, 0))),
            DeliveryPoint::new(3, 0.0, 0.03).with_priority(1).with_window(TimeWindow::new(at(9, 0), at(10, 0))),
            DeliveryPoint::new(4, 0.0, 0.04).with_priority(2),
        ];
        let state = fresh_state(&stops, &[vehicle.clone()]);

        let route = PriorityHeuristic::new().build(&vehicle, &stops, &state);
        assert_eq!(route.delivery_ids(), vec![3, 2, 4, 1]);
    }
}
