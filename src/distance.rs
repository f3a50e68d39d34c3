//! Straight-line distance and cost estimation.
//!
//! Every function here is pure: no shared state, safe to call from any worker.

use std::time::Duration;

/// Mean Earth radius in kilometres
pub const EARTH_RADIUS_KM: f64 = 6371.0;

pub const DEFAULT_AVERAGE_SPEED_KMH: f64 = 50.0;
pub const DEFAULT_FUEL_EFFICIENCY: f64 = 10.0;
pub const DEFAULT_FUEL_PRICE: f64 = 1.50;

/// Great-circle distance in kilometres between two (lat, lon) points, haversine formula.
pub fn distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Travel time for a distance at a constant average speed.
///
/// `average_speed_kmh` must be positive. A zero speed saturates to
/// `Duration::MAX` in release builds.
pub fn estimate_time(distance_km: f64, average_speed_kmh: f64) -> Duration {
    debug_assert!(average_speed_kmh > 0.0, "average speed must be positive");
    let seconds = (distance_km / average_speed_kmh * 3600.0).max(0.0);
    Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
}

/// Fuel cost: `distance / efficiency * price`.
pub fn estimate_fuel_cost(distance_km: f64, efficiency_km_per_unit: f64, price_per_unit: f64) -> f64 {
    distance_km / efficiency_km_per_unit * price_per_unit
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_is_symmetric() {
        let pairs = [
            ((18.4861, -69.9312), (18.5001, -69.8800)),
            ((0.0, 0.0), (0.0, 180.0)),
            ((-33.9, 151.2), (51.5, -0.12)),
        ];
        for ((a_lat, a_lon), (b_lat, b_lon)) in pairs {
            let ab = distance(a_lat, a_lon, b_lat, b_lon);
            let ba = distance(b_lat, b_lon, a_lat, a_lon);
            assert!((ab - ba).abs() < 1e-9);
        }
    }

    #[test]
    fn test_known_distances() {
        assert_eq!(distance(10.0, 20.0, 10.0, 20.0), 0.0);
        // one degree of latitude
        let one_degree = distance(0.0, 0.0, 1.0, 0.0);
        assert!((one_degree - 111.19).abs() < 0.01);
        // half the circumference
        let antipode = distance(0.0, 0.0, 0.0, 180.0);
        assert!((antipode - std::f64::consts::PI * EARTH_RADIUS_KM).abs() < 1e-6);
    }

    #[test]
    fn test_time_and_fuel_are_linear() {
        assert_eq!(estimate_time(50.0, DEFAULT_AVERAGE_SPEED_KMH), Duration::from_secs(3600));
        assert_eq!(estimate_time(25.0, 50.0), Duration::from_secs(1800));
        assert_eq!(estimate_time(0.0, 50.0), Duration::ZERO);

        let cost = estimate_fuel_cost(100.0, DEFAULT_FUEL_EFFICIENCY, DEFAULT_FUEL_PRICE);
        assert!((cost - 15.0).abs() < 1e-12);
        assert!((estimate_fuel_cost(200.0, 10.0, 1.5) - 2.0 * cost).abs() < 1e-12);
    }
}
