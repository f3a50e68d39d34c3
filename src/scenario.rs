//! Delivery stops, vehicles and the scenarios that bundle them.
//!
//! Scenarios are read from JSON files or generated from a seed around a
//! city centre. Coordinates are WGS84 degrees.

use crate::error::{OptimizeError, Result};
use chrono::{DateTime, Local, NaiveTime, Timelike};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Default centre for generated scenarios (Santo Domingo)
pub const DEFAULT_CENTER: (f64, f64) = (18.4861, -69.9312);

/// Time-of-day interval in which a stop should be served
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        TimeWindow { start, end }
    }

    /// Window start as an offset from midnight
    pub fn start_offset(&self) -> Duration {
        Duration::from_secs(self.start.num_seconds_from_midnight() as u64)
    }

    /// Window end as an offset from midnight
    pub fn end_offset(&self) -> Duration {
        Duration::from_secs(self.end.num_seconds_from_midnight() as u64)
    }

    /// Whether an arrival offset (from midnight, not wrapped) is at most `tolerance` late
    pub fn accepts(&self, arrival: Duration, tolerance: Duration) -> bool {
        arrival <= self.end_offset() + tolerance
    }
}

impl Default for TimeWindow {
    /// The whole day
    fn default() -> Self {
        TimeWindow {
            start: NaiveTime::MIN,
            end: NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN),
        }
    }
}

/// A stop to be delivered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryPoint {
    pub id: u32,
    #[serde(default)]
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub window: TimeWindow,
    /// 1 = high, larger = lower
    pub priority: u32,
    #[serde(default)]
    pub package_weight: f64,
    #[serde(default)]
    pub is_delivered: bool,
    #[serde(default)]
    pub delivered_at: Option<DateTime<Local>>,
}

impl DeliveryPoint {
    pub fn new(id: u32, latitude: f64, longitude: f64) -> Self {
        DeliveryPoint {
            id,
            address: String::new(),
            latitude,
            longitude,
            window: TimeWindow::default(),
            priority: 2,
            package_weight: 0.0,
            is_delivered: false,
            delivered_at: None,
        }
    }

    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.window = window;
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_weight(mut self, package_weight: f64) -> Self {
        self.package_weight = package_weight;
        self
    }

    #[inline]
    pub fn coordinates(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }

    /// Clear the delivered flag and timestamp
    pub fn reset(&mut self) {
        self.is_delivered = false;
        self.delivered_at = None;
    }
}

/// A vehicle and its driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: u32,
    #[serde(default)]
    pub driver_name: String,
    /// Start position latitude
    pub latitude: f64,
    /// Start position longitude
    pub longitude: f64,
    /// Maximum number of stops per route
    pub max_capacity: usize,
    #[serde(default)]
    pub current_load: f64,
    #[serde(default = "available_by_default")]
    pub is_available: bool,
    /// Stops assigned by the route construction currently running
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assigned_deliveries: Vec<u32>,
}

fn available_by_default() -> bool {
    true
}

impl Vehicle {
    pub fn new(id: u32, latitude: f64, longitude: f64, max_capacity: usize) -> Self {
        Vehicle {
            id,
            driver_name: String::new(),
            latitude,
            longitude,
            max_capacity,
            current_load: 0.0,
            is_available: true,
            assigned_deliveries: Vec::new(),
        }
    }

    #[inline]
    pub fn coordinates(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }
}

/// A full input set: deliveries plus fleet
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: String,
    pub deliveries: Vec<DeliveryPoint>,
    pub vehicles: Vec<Vehicle>,
}

impl Scenario {
    /// Parse a scenario from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(&path)?;
        let mut scenario: Scenario = serde_json::from_str(&text)?;
        if scenario.name.is_empty() {
            scenario.name = path
                .as_ref()
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
        }
        Ok(scenario)
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Seeded random scenario scattered within `radius_deg` of `center`.
    ///
    /// Windows open between 08:00 and 15:00 and last two to four hours.
    /// Depots sit close to the centre.
    pub fn random(
        seed: u64,
        num_deliveries: usize,
        num_vehicles: usize,
        center: (f64, f64),
        radius_deg: f64,
    ) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let (lat0, lon0) = center;

        let deliveries = (0..num_deliveries)
            .map(|i| {
                let open_hour = rng.gen_range(8..=15);
                let length = rng.gen_range(2..=4);
                let start = NaiveTime::from_hms_opt(open_hour, 0, 0).unwrap_or(NaiveTime::MIN);
                let end = NaiveTime::from_hms_opt((open_hour + length).min(23), 0, 0).unwrap_or(start);

                let mut point = DeliveryPoint::new(
                    i as u32 + 1,
                    lat0 + rng.gen_range(-radius_deg..=radius_deg),
                    lon0 + rng.gen_range(-radius_deg..=radius_deg),
                )
                .with_window(TimeWindow::new(start, end))
                .with_priority(rng.gen_range(1..=3))
                .with_weight(rng.gen_range(0.5..25.0));
                point.address = format!("Stop {}", i + 1);
                point
            })
            .collect();

        let vehicles = (0..num_vehicles)
            .map(|i| {
                let mut vehicle = Vehicle::new(
                    i as u32 + 1,
                    lat0 + rng.gen_range(-radius_deg..=radius_deg) * 0.1,
                    lon0 + rng.gen_range(-radius_deg..=radius_deg) * 0.1,
                    rng.gen_range(5..=15),
                );
                vehicle.driver_name = format!("Driver {}", i + 1);
                vehicle
            })
            .collect();

        Scenario {
            name: format!("random-{}x{}-s{}", num_deliveries, num_vehicles, seed),
            deliveries,
            vehicles,
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_input(&self.deliveries, &self.vehicles)
    }
}

/// Reject inputs no strategy can work with: duplicate ids or non-finite coordinates
pub fn validate_input(deliveries: &[DeliveryPoint], vehicles: &[Vehicle]) -> Result<()> {
    let mut seen = HashSet::with_capacity(deliveries.len());
    for d in deliveries {
        if !d.latitude.is_finite() || !d.longitude.is_finite() {
            return Err(OptimizeError::InvalidInput(format!(
                "delivery {} has non-finite coordinates",
                d.id
            )));
        }
        if !seen.insert(d.id) {
            return Err(OptimizeError::InvalidInput(format!("duplicate delivery id {}", d.id)));
        }
    }

    let mut seen = HashSet::with_capacity(vehicles.len());
    for v in vehicles {
        if !v.latitude.is_finite() || !v.longitude.is_finite() {
            return Err(OptimizeError::InvalidInput(format!(
                "vehicle {} has non-finite coordinates",
                v.id
            )));
        }
        if !seen.insert(v.id) {
            return Err(OptimizeError::InvalidInput(format!("duplicate vehicle id {}", v.id)));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_scenario_is_seeded() {
        let a = Scenario::random(7, 20, 3, DEFAULT_CENTER, 0.05);
        let b = Scenario::random(7, 20, 3, DEFAULT_CENTER, 0.05);
        assert_eq!(a.deliveries, b.deliveries);
        assert_eq!(a.vehicles, b.vehicles);
        assert_eq!(a.deliveries.len(), 20);
        assert_eq!(a.vehicles.len(), 3);
        assert!(a.validate().is_ok());
        assert!(a.deliveries.iter().all(|d| d.window.start < d.window.end));
    }

    #[test]
    fn test_window_tolerance() {
        let window = TimeWindow::new(
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        );
        let hour = Duration::from_secs(3600);
        assert!(window.accepts(Duration::from_secs(10 * 3600 + 59 * 60), hour));
        assert!(window.accepts(Duration::from_secs(11 * 3600), hour));
        assert!(!window.accepts(Duration::from_secs(11 * 3600 + 1), hour));
        // past midnight is late, not early
        assert!(!window.accepts(Duration::from_secs(25 * 3600), hour));
    }

    #[test]
    fn test_validate_rejects_bad_input() {
        let deliveries = vec![DeliveryPoint::new(1, 0.0, 0.0), DeliveryPoint::new(1, 1.0, 1.0)];
        assert!(matches!(
            validate_input(&deliveries, &[]),
            Err(OptimizeError::InvalidInput(_))
        ));

        let vehicles = vec![Vehicle::new(1, f64::NAN, 0.0, 3)];
        assert!(matches!(
            validate_input(&[], &vehicles),
            Err(OptimizeError::InvalidInput(_))
        ));

        assert!(validate_input(&[], &[]).is_ok());
    }

    #[test]
    fn test_scenario_json_defaults() {
        let json = r#"{
            "deliveries": [{"id": 1, "latitude": 18.5, "longitude": -69.9, "priority": 1}],
            "vehicles": [{"id": 1, "latitude": 18.48, "longitude": -69.93, "max_capacity": 4}]
        }"#;
        let scenario: Scenario = serde_json::from_str(json).unwrap();
        assert!(scenario.vehicles[0].is_available);
        assert!(!scenario.deliveries[0].is_delivered);
        assert_eq!(scenario.deliveries[0].window, TimeWindow::default());
    }
}
