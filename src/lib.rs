//! Parallel Delivery Route Optimizer Library
//!
//! Assigns delivery stops to vehicles and orders each vehicle's route with
//! interchangeable heuristics, run under several parallelization strategies
//! so their throughput and solution quality can be compared.
//!
//! # Features
//!
//! - Haversine distance, travel time and fuel cost estimates
//! - Shared run state with atomic stop claims, a memoized distance cache and a concurrency limiter
//! - Five route heuristics (Nearest Neighbor, Greedy Time, Priority, Genetic Algorithm, Randomized Greedy)
//! - Five strategies (Sequential, By Heuristic, By Geographic Zone, By Candidate Routes, Hybrid)
//! - A benchmark harness measuring speedup and efficiency across thread counts
//!
//! # Example
//!
//! ```no_run
//! use route_optimizer::{Optimizer, Scenario, Strategy};
//!
//! let scenario = Scenario::from_file("scenario.json").unwrap();
//! let optimizer = Optimizer::default();
//!
//! let result = optimizer
//!     .optimize(&scenario.deliveries, &scenario.vehicles, Strategy::ByHeuristic, 4)
//!     .unwrap();
//!
//! println!("Total distance: {:.2} km", result.total_distance);
//! ```

pub mod benchmark;
pub mod config;
pub mod distance;
pub mod error;
pub mod heuristics;
pub mod optimizer;
pub mod pool;
pub mod scenario;
pub mod shared;
pub mod solution;
pub mod strategy;

pub use benchmark::{benchmark, Benchmark, PerformanceMetrics};
pub use config::{BenchmarkConfig, EngineConfig, GaConfig};
pub use error::{OptimizeError, Result};
pub use optimizer::Optimizer;
pub use scenario::{DeliveryPoint, Scenario, TimeWindow, Vehicle};
pub use shared::SharedRunState;
pub use solution::{OptimizationResult, Route};
pub use strategy::Strategy;
