//! Benchmark harness.
//!
//! Sweeps strategies across thread counts on one scenario, timing each
//! optimization and deriving speedup and efficiency against the sequential
//! baseline.

use crate::config::BenchmarkConfig;
use crate::error::Result;
use crate::optimizer::Optimizer;
use crate::scenario::{DeliveryPoint, Vehicle};
use crate::solution::OptimizationResult;
use crate::strategy::Strategy;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::time::Instant;

/// Shortest elapsed time a run is credited with, in seconds
const MIN_ELAPSED_SECS: f64 = 1e-6;

/// One benchmark sample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub strategy: String,
    pub threads: usize,
    pub execution_time_ms: f64,
    /// Sequential baseline time over this run's time
    pub speedup: f64,
    /// Speedup per thread
    pub efficiency: f64,
    /// Scenarios per second, a scenario being one (delivery, vehicle) pair
    pub throughput: f64,
    pub scenarios_processed: usize,
    /// Resident set growth over the run in KiB (0 where the platform does not report it)
    pub memory_delta_kb: i64,
    /// Simulated CPU estimate in percent
    pub cpu_usage: f64,
    pub total_distance: f64,
    pub total_deliveries: usize,
    pub timestamp: DateTime<Local>,
}

/// Aggregated statistics for one strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyStatistics {
    pub strategy: String,
    pub runs: usize,
    pub mean_time_ms: f64,
    pub std_time_ms: f64,
    pub mean_speedup: f64,
    pub max_speedup: f64,
    pub mean_efficiency: f64,
    pub best_distance: f64,
}

/// A timed optimize call
#[derive(Debug, Clone)]
struct Run {
    result: OptimizationResult,
    elapsed_secs: f64,
    memory_delta_kb: i64,
}

/// Resident set size of this process in KiB
fn resident_kb() -> Option<i64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    status
        .lines()
        .find(|line| line.starts_with("VmRSS:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse().ok())
}

/// Benchmarking engine
pub struct Benchmark {
    config: BenchmarkConfig,
    results: Vec<PerformanceMetrics>,
}

impl Benchmark {
    pub fn new(config: BenchmarkConfig) -> Self {
        Benchmark {
            config,
            results: Vec::new(),
        }
    }

    pub fn config(&self) -> &BenchmarkConfig {
        &self.config
    }

    /// Number of samples [`Benchmark::run`] records
    pub fn planned_runs(&self) -> usize {
        self.config.strategies.len() * self.config.thread_counts().len()
    }

    pub fn run(
        &mut self,
        optimizer: &Optimizer,
        deliveries: &[DeliveryPoint],
        vehicles: &[Vehicle],
    ) -> Result<&[PerformanceMetrics]> {
        self.run_with(optimizer, deliveries, vehicles, |_| {})
    }

    /// Like [`Benchmark::run`], calling `on_sample` after every recorded sample
    pub fn run_with<F: FnMut(&PerformanceMetrics)>(
        &mut self,
        optimizer: &Optimizer,
        deliveries: &[DeliveryPoint],
        vehicles: &[Vehicle],
        mut on_sample: F,
    ) -> Result<&[PerformanceMetrics]> {
        let thread_counts = self.config.thread_counts();
        let scenarios = deliveries.len() * vehicles.len();
        log::info!(
            "benchmark: {} strategies x threads {:?} on {} deliveries, {} vehicles",
            self.config.strategies.len(),
            thread_counts,
            deliveries.len(),
            vehicles.len()
        );

        let baseline = Self::measure(optimizer, deliveries, vehicles, Strategy::Sequential, 1)?;

        for strategy in self.config.strategies.clone() {
            for &threads in &thread_counts {
                let run = if strategy == Strategy::Sequential && threads == 1 {
                    baseline.clone()
                } else {
                    Self::measure(optimizer, deliveries, vehicles, strategy, threads)?
                };

                let speedup = if strategy == Strategy::Sequential {
                    1.0
                } else {
                    baseline.elapsed_secs / run.elapsed_secs
                };
                let sample = PerformanceMetrics {
                    strategy: strategy.name().to_string(),
                    threads,
                    execution_time_ms: run.elapsed_secs * 1000.0,
                    speedup,
                    efficiency: speedup / threads as f64,
                    throughput: scenarios as f64 / run.elapsed_secs,
                    scenarios_processed: scenarios,
                    memory_delta_kb: run.memory_delta_kb,
                    cpu_usage: (threads as f64 * 25.0).min(100.0),
                    total_distance: run.result.total_distance,
                    total_deliveries: run.result.total_deliveries,
                    timestamp: Local::now(),
                };

                log::info!(
                    "  {:<18} x{:<3} {:>10.3} ms  speedup {:.2}  efficiency {:.2}",
                    sample.strategy,
                    threads,
                    sample.execution_time_ms,
                    sample.speedup,
                    sample.efficiency
                );
                on_sample(&sample);
                self.results.push(sample);
            }
        }

        Ok(&self.results)
    }

    fn measure(
        optimizer: &Optimizer,
        deliveries: &[DeliveryPoint],
        vehicles: &[Vehicle],
        strategy: Strategy,
        threads: usize,
    ) -> Result<Run> {
        let memory_before = resident_kb();
        let start = Instant::now();
        let result = optimizer.optimize(deliveries, vehicles, strategy, threads)?;
        let elapsed_secs = start.elapsed().as_secs_f64().max(MIN_ELAPSED_SECS);
        let memory_delta_kb = match (memory_before, resident_kb()) {
            (Some(before), Some(after)) => after - before,
            _ => 0,
        };

        Ok(Run {
            result,
            elapsed_secs,
            memory_delta_kb,
        })
    }

    /// Compute statistics for each strategy, in the order strategies were first measured
    pub fn compute_statistics(&self) -> Vec<StrategyStatistics> {
        let mut order: Vec<&str> = Vec::new();
        for sample in &self.results {
            if !order.contains(&sample.strategy.as_str()) {
                order.push(&sample.strategy);
            }
        }

        order
            .into_iter()
            .map(|strategy| {
                let samples: Vec<&PerformanceMetrics> =
                    self.results.iter().filter(|s| s.strategy == strategy).collect();
                let times: Vec<f64> = samples.iter().map(|s| s.execution_time_ms).collect();
                let speedups: Vec<f64> = samples.iter().map(|s| s.speedup).collect();
                let efficiencies: Vec<f64> = samples.iter().map(|s| s.efficiency).collect();

                let std_time_ms = if times.len() > 1 { times.iter().std_dev() } else { 0.0 };

                StrategyStatistics {
                    strategy: strategy.to_string(),
                    runs: samples.len(),
                    mean_time_ms: times.iter().mean(),
                    std_time_ms,
                    mean_speedup: speedups.iter().mean(),
                    max_speedup: speedups.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                    mean_efficiency: efficiencies.iter().mean(),
                    best_distance: samples.iter().map(|s| s.total_distance).fold(f64::INFINITY, f64::min),
                }
            })
            .collect()
    }

    /// Write every sample as CSV
    pub fn write_csv<W: Write>(&self, writer: W) -> io::Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        for sample in &self.results {
            writer.serialize(sample)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Write per-strategy statistics as CSV
    pub fn write_statistics_csv<W: Write>(&self, writer: W) -> io::Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        for stat in self.compute_statistics() {
            writer.serialize(stat)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Export results to CSV
    pub fn export_to_csv<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        self.write_csv(File::create(path)?)
    }

    /// Export statistics to CSV
    pub fn export_statistics_csv<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        self.write_statistics_csv(File::create(path)?)
    }

    /// Generate summary report
    pub fn generate_report(&self) -> String {
        let mut report = String::new();

        report.push_str("========================================\n");
        report.push_str("     Route Optimizer Benchmark Report\n");
        report.push_str("========================================\n\n");

        report.push_str("Samples:\n");
        report.push_str("-".repeat(88).as_str());
        report.push('\n');
        report.push_str(&format!(
            "{:<18} {:>7} {:>12} {:>9} {:>10} {:>14} {:>12}\n",
            "Strategy", "Threads", "Time (ms)", "Speedup", "Efficiency", "Throughput/s", "Distance"
        ));
        report.push_str("-".repeat(88).as_str());
        report.push('\n');

        for sample in &self.results {
            report.push_str(&format!(
                "{:<18} {:>7} {:>12.3} {:>9.2} {:>10.2} {:>14.1} {:>12.2}\n",
                sample.strategy,
                sample.threads,
                sample.execution_time_ms,
                sample.speedup,
                sample.efficiency,
                sample.throughput,
                sample.total_distance
            ));
        }
        report.push_str("-".repeat(88).as_str());
        report.push('\n');

        report.push_str("\nPer strategy:\n");
        for stat in self.compute_statistics() {
            report.push_str(&format!(
                "  {:<18} mean {:.3} ms (sd {:.3}), best speedup {:.2}, mean efficiency {:.2}, best distance {:.2} km\n",
                stat.strategy, stat.mean_time_ms, stat.std_time_ms, stat.max_speedup, stat.mean_efficiency, stat.best_distance
            ));
        }

        report
    }

    /// Get all results
    pub fn results(&self) -> &[PerformanceMetrics] {
        &self.results
    }
}

/// Sweep every strategy up to the host's available parallelism
pub fn benchmark(
    optimizer: &Optimizer,
    deliveries: &[DeliveryPoint],
    vehicles: &[Vehicle],
) -> Result<Vec<PerformanceMetrics>> {
    let mut bench = Benchmark::new(BenchmarkConfig::default());
    bench.run(optimizer, deliveries, vehicles)?;
    Ok(bench.results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::scenario::{Scenario, DEFAULT_CENTER};
    use chrono::NaiveTime;

    fn small_run(strategies: Vec<Strategy>) -> Benchmark {
        let scenario = Scenario::random(21, 15, 3, DEFAULT_CENTER, 0.04);
        let mut config = EngineConfig::departing_at(NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        config.ga.population_size = 10;
        config.ga.generations = 5;
        let optimizer = Optimizer::new(config);

        let mut bench = Benchmark::new(BenchmarkConfig { max_threads: Some(2), strategies });
        bench.run(&optimizer, &scenario.deliveries, &scenario.vehicles).unwrap();
        bench
    }

    #[test]
    fn test_sweep_shape() {
        let bench = small_run(Strategy::ALL.to_vec());
        assert_eq!(bench.results().len(), bench.planned_runs());
        assert_eq!(bench.results().len(), 10);

        for sample in bench.results() {
            if sample.strategy == "Sequential" {
                assert_eq!(sample.speedup, 1.0);
            }
            assert!(sample.execution_time_ms > 0.0);
            assert!(sample.speedup.is_finite() && sample.speedup > 0.0);
            assert!((sample.efficiency - sample.speedup / sample.threads as f64).abs() < 1e-12);
            assert_eq!(sample.scenarios_processed, 45);
            assert!(sample.cpu_usage <= 100.0);
            // every run starts from a fresh claim ledger
            assert!(sample.total_deliveries > 0);
        }
    }

    #[test]
    fn test_statistics_per_strategy() {
        let bench = small_run(vec![Strategy::Sequential, Strategy::ByGeographicZone]);
        let stats = bench.compute_statistics();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].strategy, "Sequential");
        assert_eq!(stats[0].runs, 2);
        assert_eq!(stats[0].mean_speedup, 1.0);
        assert!(stats[1].max_speedup >= stats[1].mean_speedup);
        assert!(stats[1].std_time_ms >= 0.0);
    }

    #[test]
    fn test_csv_export() {
        let bench = small_run(vec![Strategy::Sequential]);
        let mut buffer = Vec::new();
        bench.write_csv(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();

        let mut lines = text.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("strategy,threads,execution_time_ms,speedup"));
        assert_eq!(lines.count(), 2);

        let mut buffer = Vec::new();
        bench.write_statistics_csv(&mut buffer).unwrap();
        assert_eq!(String::from_utf8(buffer).unwrap().lines().count(), 2);
    }

    #[test]
    fn test_report_lists_strategies() {
        let bench = small_run(vec![Strategy::Sequential, Strategy::ByCandidateRoutes]);
        let report = bench.generate_report();
        assert!(report.contains("Sequential"));
        assert!(report.contains("ByCandidateRoutes"));
    }
}
