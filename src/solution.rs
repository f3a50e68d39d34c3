//! Routes and optimization results.
//!
//! A [`Route`] is one vehicle's ordered stop sequence with its aggregate
//! cost figures. An [`OptimizationResult`] merges the routes of one run.

use crate::config::EngineConfig;
use crate::distance::{self, estimate_fuel_cost, estimate_time};
use crate::scenario::{DeliveryPoint, Vehicle};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// One vehicle's route
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub vehicle_id: u32,
    /// Stops in visiting order, no duplicates, at most the vehicle capacity
    pub deliveries: Vec<DeliveryPoint>,
    /// Kilometres from the vehicle start through every stop
    pub total_distance: f64,
    pub estimated_time: Duration,
    pub fuel_cost: f64,
    pub deliveries_on_time: usize,
    /// Heuristic that produced the route
    pub heuristic: String,
    pub created_at: DateTime<Local>,
}

impl Route {
    /// Empty route for a vehicle
    pub fn empty(vehicle_id: u32, heuristic: &str) -> Self {
        Route {
            vehicle_id,
            deliveries: Vec::new(),
            total_distance: 0.0,
            estimated_time: Duration::ZERO,
            fuel_cost: 0.0,
            deliveries_on_time: 0,
            heuristic: heuristic.to_string(),
            created_at: Local::now(),
        }
    }

    /// Build a route from a committed stop sequence.
    ///
    /// `total_distance` is the distance already accumulated by the heuristic;
    /// estimated time derives from it at the configured speed.
    pub fn from_sequence(
        vehicle: &Vehicle,
        deliveries: Vec<DeliveryPoint>,
        total_distance: f64,
        heuristic: &str,
        config: &EngineConfig,
    ) -> Self {
        let estimated_time = estimate_time(total_distance, config.average_speed_kmh);
        Self::with_schedule(vehicle, deliveries, total_distance, estimated_time, heuristic, config)
    }

    /// Like [`Route::from_sequence`], with an explicit schedule duration
    pub fn with_schedule(
        vehicle: &Vehicle,
        deliveries: Vec<DeliveryPoint>,
        total_distance: f64,
        estimated_time: Duration,
        heuristic: &str,
        config: &EngineConfig,
    ) -> Self {
        let deliveries_on_time = count_on_time(vehicle, &deliveries, config);
        Route {
            vehicle_id: vehicle.id,
            deliveries,
            total_distance,
            estimated_time,
            fuel_cost: estimate_fuel_cost(
                total_distance,
                config.fuel_efficiency_km_per_unit,
                config.fuel_price_per_unit,
            ),
            deliveries_on_time,
            heuristic: heuristic.to_string(),
            created_at: Local::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.deliveries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deliveries.is_empty()
    }

    pub fn delivery_ids(&self) -> Vec<u32> {
        self.deliveries.iter().map(|d| d.id).collect()
    }

    /// Distance per stop, used to rank candidate routes (an empty route counts as one stop)
    pub fn distance_per_stop(&self) -> f64 {
        self.total_distance / self.deliveries.len().max(1) as f64
    }
}

/// Count stops whose service finishes no later than window end plus tolerance.
///
/// The simulated clock starts at the configured departure and advances by
/// travel time plus service time for each stop before the window check.
pub fn count_on_time(vehicle: &Vehicle, deliveries: &[DeliveryPoint], config: &EngineConfig) -> usize {
    let mut clock = config.departure_offset();
    let (mut lat, mut lon) = vehicle.coordinates();
    let mut on_time = 0;

    for delivery in deliveries {
        let leg = distance::distance(lat, lon, delivery.latitude, delivery.longitude);
        clock = clock
            .saturating_add(estimate_time(leg, config.average_speed_kmh))
            .saturating_add(config.service_time);
        if delivery.window.accepts(clock, config.window_tolerance) {
            on_time += 1;
        }
        lat = delivery.latitude;
        lon = delivery.longitude;
    }

    on_time
}

/// Live aggregate metrics of one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetrics {
    /// Claims that committed a stop
    pub claims_won: usize,
    /// Claims that found the stop already taken
    pub claims_contended: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    /// Most heuristic bodies observed executing at once
    pub peak_workers: usize,
}

/// Merged result of one optimization run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub routes: Vec<Route>,
    pub total_distance: f64,
    pub total_fuel_cost: f64,
    pub total_time: Duration,
    pub total_deliveries: usize,
    pub on_time_deliveries: usize,
    pub strategy: String,
    pub execution_time: Duration,
    pub threads_used: usize,
    pub created_at: DateTime<Local>,
    #[serde(default)]
    pub metrics: RunMetrics,
}

impl OptimizationResult {
    /// Aggregate a set of routes; run bookkeeping fields are filled by the orchestrator
    pub fn from_routes(routes: Vec<Route>) -> Self {
        let mut result = OptimizationResult {
            routes: Vec::new(),
            total_distance: 0.0,
            total_fuel_cost: 0.0,
            total_time: Duration::ZERO,
            total_deliveries: 0,
            on_time_deliveries: 0,
            strategy: String::new(),
            execution_time: Duration::ZERO,
            threads_used: 0,
            created_at: Local::now(),
            metrics: RunMetrics::default(),
        };
        for route in routes {
            result.push(route);
        }
        result
    }

    pub fn push(&mut self, route: Route) {
        self.total_distance += route.total_distance;
        self.total_fuel_cost += route.fuel_cost;
        self.total_time += route.estimated_time;
        self.total_deliveries += route.deliveries.len();
        self.on_time_deliveries += route.deliveries_on_time;
        self.routes.push(route);
    }

    /// On-time percentage in [0, 100], 0 when nothing was delivered
    pub fn success_rate(&self) -> f64 {
        if self.total_deliveries == 0 {
            0.0
        } else {
            self.on_time_deliveries as f64 / self.total_deliveries as f64 * 100.0
        }
    }

    /// Ids of every stop in every route, in route order
    pub fn assigned_ids(&self) -> Vec<u32> {
        self.routes.iter().flat_map(|r| r.deliveries.iter().map(|d| d.id)).collect()
    }

    /// No stop appears in two routes (or twice in one)
    pub fn is_disjoint(&self) -> bool {
        let ids = self.assigned_ids();
        let unique: HashSet<u32> = ids.iter().copied().collect();
        unique.len() == ids.len()
    }
}

impl std::fmt::Display for OptimizationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Optimization ({})", self.strategy)?;
        writeln!(f, "  Threads: {}", self.threads_used)?;
        writeln!(f, "  Routes: {}", self.routes.len())?;
        writeln!(f, "  Deliveries: {} ({} on time, {:.1}%)",
            self.total_deliveries, self.on_time_deliveries, self.success_rate())?;
        writeln!(f, "  Distance: {:.2} km", self.total_distance)?;
        writeln!(f, "  Fuel cost: {:.2}", self.total_fuel_cost)?;
        writeln!(f, "  Time: {:.4}s", self.execution_time.as_secs_f64())?;
        for route in &self.routes {
            writeln!(f, "  Vehicle {} [{}]: {:?} ({:.2} km)",
                route.vehicle_id, route.heuristic, route.delivery_ids(), route.total_distance)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::TimeWindow;
    use chrono::NaiveTime;

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_success_rate_bounds() {
        let empty = OptimizationResult::from_routes(Vec::new());
        assert_eq!(empty.total_deliveries, 0);
        assert_eq!(empty.success_rate(), 0.0);

        let config = EngineConfig::departing_at(at(8, 0));
        let vehicle = Vehicle::new(1, 0.0, 0.0, 5);
        let stops = vec![
            DeliveryPoint::new(1, 0.01, 0.0).with_window(TimeWindow::new(at(8, 0), at(9, 0))),
            DeliveryPoint::new(2, 0.02, 0.0).with_window(TimeWindow::new(at(5, 0), at(6, 0))),
        ];
        let route = Route::from_sequence(&vehicle, stops, 2.2, "test", &config);
        let result = OptimizationResult::from_routes(vec![route]);
        assert_eq!(result.total_deliveries, 2);
        assert_eq!(result.on_time_deliveries, 1);
        assert!((result.success_rate() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_on_time_uses_vehicle_start() {
        // depot to stop is ~111 km: 2h13m at 50 km/h
        let config = EngineConfig::departing_at(at(8, 0));
        let vehicle = Vehicle::new(1, 0.0, 0.0, 5);
        let stop = DeliveryPoint::new(1, 1.0, 0.0).with_window(TimeWindow::new(at(8, 0), at(9, 0)));
        assert_eq!(count_on_time(&vehicle, &[stop.clone()], &config), 0);

        let stop = stop.with_window(TimeWindow::new(at(8, 0), at(9, 30)));
        assert_eq!(count_on_time(&vehicle, &[stop], &config), 1);
    }

    #[test]
    fn test_on_time_counts_service_completion() {
        // ~1.1 km at 50 km/h is about 80 s of driving, then 5 min of service
        let config = EngineConfig::departing_at(at(7, 0));
        let vehicle = Vehicle::new(1, 0.0, 0.0, 5);

        // reached at 07:01 but served until 07:06, past 06:02 + 1 h
        let stop = DeliveryPoint::new(1, 0.01, 0.0).with_window(TimeWindow::new(at(5, 0), at(6, 2)));
        assert_eq!(count_on_time(&vehicle, &[stop.clone()], &config), 0);

        let stop = stop.with_window(TimeWindow::new(at(5, 0), at(6, 10)));
        assert_eq!(count_on_time(&vehicle, &[stop], &config), 1);
    }

    #[test]
    fn test_disjoint_detection() {
        let config = EngineConfig::default();
        let vehicle = Vehicle::new(1, 0.0, 0.0, 5);
        let a = Route::from_sequence(&vehicle, vec![DeliveryPoint::new(1, 0.0, 0.1)], 1.0, "a", &config);
        let b = Route::from_sequence(&vehicle, vec![DeliveryPoint::new(1, 0.0, 0.1)], 1.0, "b", &config);
        assert!(OptimizationResult::from_routes(vec![a.clone()]).is_disjoint());
        assert!(!OptimizationResult::from_routes(vec![a, b]).is_disjoint());
    }
}
