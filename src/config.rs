//! Engine, genetic algorithm and benchmark configuration.

use crate::distance::{DEFAULT_AVERAGE_SPEED_KMH, DEFAULT_FUEL_EFFICIENCY, DEFAULT_FUEL_PRICE};
use crate::strategy::Strategy;
use crate::error::{OptimizeError, Result};
use chrono::{Local, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Genetic Algorithm configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaConfig {
    /// Population size
    pub population_size: usize,
    /// Number of generations
    pub generations: usize,
    /// Probability that an offspring is mutated
    pub mutation_prob: f64,
    /// Probability that a mutation swaps two positions (otherwise it appends an unused stop)
    pub swap_prob: f64,
}

impl Default for GaConfig {
    fn default() -> Self {
        GaConfig {
            population_size: 50,
            generations: 100,
            mutation_prob: 0.1,
            swap_prob: 0.5,
        }
    }
}

/// Parameters shared by every heuristic of one optimization run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Average travel speed used for time estimates
    pub average_speed_kmh: f64,
    /// Kilometres per fuel unit
    pub fuel_efficiency_km_per_unit: f64,
    /// Price of one fuel unit
    pub fuel_price_per_unit: f64,
    /// Time spent at each stop
    pub service_time: Duration,
    /// Lateness accepted past a window end
    pub window_tolerance: Duration,
    /// Time of day the simulated clock starts at (None = wall clock at run start)
    pub departure: Option<NaiveTime>,
    /// Base seed for stochastic heuristics
    pub seed: u64,
    /// Genetic algorithm parameters
    pub ga: GaConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            average_speed_kmh: DEFAULT_AVERAGE_SPEED_KMH,
            fuel_efficiency_km_per_unit: DEFAULT_FUEL_EFFICIENCY,
            fuel_price_per_unit: DEFAULT_FUEL_PRICE,
            service_time: Duration::from_secs(5 * 60),
            window_tolerance: Duration::from_secs(60 * 60),
            departure: None,
            seed: 42,
            ga: GaConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Config with a pinned departure time, for reproducible schedules
    pub fn departing_at(departure: NaiveTime) -> Self {
        EngineConfig {
            departure: Some(departure),
            ..Default::default()
        }
    }

    /// Departure as an offset from midnight
    pub fn departure_offset(&self) -> Duration {
        let time = self.departure.unwrap_or_else(|| Local::now().time());
        Duration::from_secs(time.num_seconds_from_midnight() as u64)
    }

    /// Reject rates that would stall the simulated clock or divide by zero
    pub fn validate(&self) -> Result<()> {
        if !self.average_speed_kmh.is_finite() || self.average_speed_kmh <= 0.0 {
            return Err(OptimizeError::InvalidInput(format!(
                "average speed must be a positive number of km/h, got {}",
                self.average_speed_kmh
            )));
        }
        if !self.fuel_efficiency_km_per_unit.is_finite() || self.fuel_efficiency_km_per_unit <= 0.0 {
            return Err(OptimizeError::InvalidInput(format!(
                "fuel efficiency must be a positive number of km per unit, got {}",
                self.fuel_efficiency_km_per_unit
            )));
        }
        if !self.fuel_price_per_unit.is_finite() || self.fuel_price_per_unit < 0.0 {
            return Err(OptimizeError::InvalidInput(format!(
                "fuel price must be a non-negative number, got {}",
                self.fuel_price_per_unit
            )));
        }
        Ok(())
    }

    /// Load and validate a config from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }
}

/// Benchmark configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    /// Highest thread count to sweep to (None = host available parallelism)
    pub max_threads: Option<usize>,
    /// Strategies to measure; Sequential should come first as it is the baseline
    pub strategies: Vec<Strategy>,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        BenchmarkConfig {
            max_threads: None,
            strategies: Strategy::ALL.to_vec(),
        }
    }
}

impl BenchmarkConfig {
    pub fn thread_limit(&self) -> usize {
        self.max_threads
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
            .max(1)
    }

    /// Thread counts 1, 2, 4, ... up to the limit
    pub fn thread_counts(&self) -> Vec<usize> {
        let limit = self.thread_limit();
        std::iter::successors(Some(1usize), |&t| t.checked_mul(2))
            .take_while(|&t| t <= limit)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.average_speed_kmh, 50.0);
        assert_eq!(config.service_time, Duration::from_secs(300));
        assert_eq!(config.window_tolerance, Duration::from_secs(3600));
        assert_eq!(config.ga.population_size, 50);
        assert_eq!(config.ga.generations, 100);
    }

    #[test]
    fn test_departure_offset() {
        let config = EngineConfig::departing_at(NaiveTime::from_hms_opt(8, 30, 0).unwrap());
        assert_eq!(config.departure_offset(), Duration::from_secs(8 * 3600 + 30 * 60));
    }

    #[test]
    fn test_validate_rejects_bad_rates() {
        assert!(EngineConfig::default().validate().is_ok());

        let cases: [(&str, fn(&mut EngineConfig)); 7] = [
            ("zero speed", |c| c.average_speed_kmh = 0.0),
            ("negative speed", |c| c.average_speed_kmh = -30.0),
            ("infinite speed", |c| c.average_speed_kmh = f64::INFINITY),
            ("nan speed", |c| c.average_speed_kmh = f64::NAN),
            ("zero efficiency", |c| c.fuel_efficiency_km_per_unit = 0.0),
            ("nan efficiency", |c| c.fuel_efficiency_km_per_unit = f64::NAN),
            ("negative price", |c| c.fuel_price_per_unit = -1.0),
        ];
        for (label, tweak) in cases {
            let mut config = EngineConfig::default();
            tweak(&mut config);
            assert!(matches!(config.validate(), Err(OptimizeError::InvalidInput(_))), "{}", label);
        }
    }

    #[test]
    fn test_from_file_validates() {
        let mut config = EngineConfig::default();
        config.average_speed_kmh = 0.0;
        let path = std::env::temp_dir().join(format!("route-optimizer-config-{}.json", std::process::id()));
        std::fs::write(&path, serde_json::to_string(&config).unwrap()).unwrap();

        let loaded = EngineConfig::from_file(&path);
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(loaded, Err(OptimizeError::InvalidInput(_))));
    }

    #[test]
    fn test_thread_counts() {
        let config = BenchmarkConfig { max_threads: Some(6), ..Default::default() };
        assert_eq!(config.thread_counts(), vec![1, 2, 4]);

        let config = BenchmarkConfig { max_threads: Some(1), ..Default::default() };
        assert_eq!(config.thread_counts(), vec![1]);

        assert_eq!(BenchmarkConfig::default().strategies[0], Strategy::Sequential);
    }
}
