//! Route Optimizer - Command Line Interface
//!
//! Optimize delivery routes, benchmark the parallelization strategies and
//! generate random scenarios.

use chrono::NaiveTime;
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use route_optimizer::benchmark::Benchmark;
use route_optimizer::config::{BenchmarkConfig, EngineConfig};
use route_optimizer::optimizer::Optimizer;
use route_optimizer::scenario::{Scenario, DEFAULT_CENTER};
use route_optimizer::strategy::Strategy;

use std::path::{Path, PathBuf};
use std::time::Instant;

/// Spread of generated stops around the centre, in degrees
const RANDOM_RADIUS_DEG: f64 = 0.05;

#[derive(Parser)]
#[command(name = "route-optimizer")]
#[command(version = "1.0")]
#[command(about = "Parallel delivery route optimizer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Optimize one scenario with one strategy
    Optimize {
        /// Scenario JSON file
        #[arg(short = 'i', long, conflicts_with = "random")]
        scenario: Option<PathBuf>,

        /// Random scenario as <deliveries>x<vehicles>, e.g. 50x5
        #[arg(short, long)]
        random: Option<String>,

        /// Parallelization strategy
        #[arg(short = 'S', long, value_enum, default_value = "by-heuristic")]
        strategy: StrategyArg,

        /// Thread budget
        #[arg(short, long, default_value = "4")]
        threads: usize,

        /// Random seed (heuristics and generated scenarios)
        #[arg(short, long, default_value = "42")]
        seed: u64,

        /// Departure time as HH:MM (defaults to now)
        #[arg(short, long)]
        departure: Option<String>,

        /// Engine config JSON file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write the result as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Sweep every strategy across thread counts
    Benchmark {
        /// Scenario JSON file
        #[arg(short = 'i', long, conflicts_with = "random")]
        scenario: Option<PathBuf>,

        /// Random scenario as <deliveries>x<vehicles>
        #[arg(short, long)]
        random: Option<String>,

        /// Highest thread count (defaults to available parallelism)
        #[arg(short, long)]
        max_threads: Option<usize>,

        /// Random seed
        #[arg(short, long, default_value = "42")]
        seed: u64,

        /// Output directory for results
        #[arg(short, long, default_value = "results")]
        output: PathBuf,
    },

    /// Write a seeded random scenario
    Generate {
        #[arg(short, long, default_value = "50")]
        deliveries: usize,

        #[arg(short, long, default_value = "5")]
        vehicles: usize,

        #[arg(short, long, default_value = "42")]
        seed: u64,

        /// Output JSON file
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
enum StrategyArg {
    /// Nearest neighbor per vehicle, single thread
    Sequential,
    /// All heuristics concurrently
    ByHeuristic,
    /// One worker per latitude band
    ByZone,
    /// Randomized candidate routes
    ByCandidates,
    /// By-heuristic and by-zone side by side
    Hybrid,
}

impl From<StrategyArg> for Strategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Sequential => Strategy::Sequential,
            StrategyArg::ByHeuristic => Strategy::ByHeuristic,
            StrategyArg::ByZone => Strategy::ByGeographicZone,
            StrategyArg::ByCandidates => Strategy::ByCandidateRoutes,
            StrategyArg::Hybrid => Strategy::HybridApproach,
        }
    }
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Optimize { scenario, random, strategy, threads, seed, departure, config, output } => {
            optimize(scenario, random, strategy.into(), threads, seed, departure, config, output);
        }

        Commands::Benchmark { scenario, random, max_threads, seed, output } => {
            run_benchmark(scenario, random, max_threads, seed, &output);
        }

        Commands::Generate { deliveries, vehicles, seed, output } => {
            generate(deliveries, vehicles, seed, &output);
        }
    }
}

fn fail(message: String) -> ! {
    eprintln!("Error: {}", message);
    std::process::exit(1);
}

/// Parse `<deliveries>x<vehicles>`
fn parse_dimensions(dims: &str) -> Option<(usize, usize)> {
    let (deliveries, vehicles) = dims.split_once(|c: char| c == 'x' || c == 'X')?;
    Some((deliveries.trim().parse().ok()?, vehicles.trim().parse().ok()?))
}

fn load_scenario(path: Option<PathBuf>, random: Option<String>, seed: u64) -> Scenario {
    let scenario = match (path, random) {
        (Some(path), _) => {
            println!("Loading scenario from {:?}...", path);
            Scenario::from_file(&path).unwrap_or_else(|e| fail(format!("cannot load scenario: {}", e)))
        }
        (None, Some(dims)) => {
            let (deliveries, vehicles) = parse_dimensions(&dims)
                .unwrap_or_else(|| fail(format!("expected <deliveries>x<vehicles>, got '{}'", dims)));
            Scenario::random(seed, deliveries, vehicles, DEFAULT_CENTER, RANDOM_RADIUS_DEG)
        }
        (None, None) => fail("either --scenario or --random is required".to_string()),
    };

    if let Err(e) = scenario.validate() {
        fail(e.to_string());
    }
    println!(
        "Scenario '{}': {} deliveries, {} vehicles",
        scenario.name,
        scenario.deliveries.len(),
        scenario.vehicles.len()
    );
    scenario
}

fn engine_config(config: Option<PathBuf>, seed: u64, departure: Option<String>) -> EngineConfig {
    let mut engine = match config {
        Some(path) => EngineConfig::from_file(&path).unwrap_or_else(|e| fail(format!("cannot load config: {}", e))),
        None => EngineConfig::default(),
    };
    engine.seed = seed;

    if let Some(text) = departure {
        let time = NaiveTime::parse_from_str(&text, "%H:%M")
            .unwrap_or_else(|_| fail(format!("expected departure as HH:MM, got '{}'", text)));
        engine.departure = Some(time);
    }
    engine
}

#[allow(clippy::too_many_arguments)]
fn optimize(
    scenario: Option<PathBuf>,
    random: Option<String>,
    strategy: Strategy,
    threads: usize,
    seed: u64,
    departure: Option<String>,
    config: Option<PathBuf>,
    output: Option<PathBuf>,
) {
    let scenario = load_scenario(scenario, random, seed);
    let optimizer = Optimizer::new(engine_config(config, seed, departure));

    println!("Optimizing with {} on {} threads...", strategy, threads);
    let start = Instant::now();
    let result = optimizer
        .optimize(&scenario.deliveries, &scenario.vehicles, strategy, threads)
        .unwrap_or_else(|e| fail(e.to_string()));
    let elapsed = start.elapsed();

    println!("\n{}", result);
    println!("Success rate: {:.1}%", result.success_rate());
    println!(
        "Claims: {} won, {} contended | cache: {} hits, {} misses | peak workers: {}",
        result.metrics.claims_won,
        result.metrics.claims_contended,
        result.metrics.cache_hits,
        result.metrics.cache_misses,
        result.metrics.peak_workers
    );
    println!("Wall time: {:.4}s", elapsed.as_secs_f64());

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&result).unwrap_or_else(|e| fail(e.to_string()));
        if let Err(e) = std::fs::write(&path, json) {
            fail(format!("cannot write {:?}: {}", path, e));
        }
        println!("Result saved to {:?}", path);
    }
}

fn run_benchmark(
    scenario: Option<PathBuf>,
    random: Option<String>,
    max_threads: Option<usize>,
    seed: u64,
    output: &Path,
) {
    let scenario = load_scenario(scenario, random, seed);

    if let Err(e) = std::fs::create_dir_all(output) {
        fail(format!("cannot create {:?}: {}", output, e));
    }

    let optimizer = Optimizer::new(EngineConfig { seed, ..Default::default() });
    let mut benchmark = Benchmark::new(BenchmarkConfig { max_threads, ..Default::default() });

    let progress = ProgressBar::new(benchmark.planned_runs() as u64);
    progress.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let outcome = benchmark.run_with(&optimizer, &scenario.deliveries, &scenario.vehicles, |sample| {
        progress.set_message(format!("{} x{}", sample.strategy, sample.threads));
        progress.inc(1);
    });
    if let Err(e) = outcome {
        progress.abandon();
        fail(e.to_string());
    }
    progress.finish_with_message("done");

    let results_path = output.join("metrics.csv");
    if let Err(e) = benchmark.export_to_csv(&results_path) {
        fail(format!("cannot export results: {}", e));
    }
    println!("\nResults exported to {:?}", results_path);

    let stats_path = output.join("statistics.csv");
    if let Err(e) = benchmark.export_statistics_csv(&stats_path) {
        fail(format!("cannot export statistics: {}", e));
    }
    println!("Statistics exported to {:?}", stats_path);

    let report = benchmark.generate_report();
    println!("\n{}", report);

    let report_path = output.join("report.txt");
    if let Err(e) = std::fs::write(&report_path, &report) {
        fail(format!("cannot save report: {}", e));
    }
    println!("Report saved to {:?}", report_path);
}

fn generate(deliveries: usize, vehicles: usize, seed: u64, output: &Path) {
    let scenario = Scenario::random(seed, deliveries, vehicles, DEFAULT_CENTER, RANDOM_RADIUS_DEG);
    if let Err(e) = scenario.to_file(output) {
        fail(format!("cannot write scenario: {}", e));
    }
    println!(
        "Wrote '{}' ({} deliveries, {} vehicles) to {:?}",
        scenario.name, deliveries, vehicles, output
    );
}
