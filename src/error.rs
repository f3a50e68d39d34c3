//! Error taxonomy for optimization runs.

use thiserror::Error;

/// Errors surfaced by [`crate::optimizer::Optimizer`] and the benchmark harness.
///
/// Degenerate input (no vehicles, no deliveries) is not an error: it yields an
/// empty but valid [`crate::solution::OptimizationResult`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptimizeError {
    /// The strategy name did not match any known strategy.
    #[error("invalid strategy: {0}")]
    InvalidStrategy(String),
    /// Input rejected before any work started.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// A heuristic job or a strategy branch panicked.
    #[error("worker failure: {0}")]
    WorkerFailure(String),
    /// The worker pool could not be created.
    #[error("cannot build worker pool: {0}")]
    ThreadPool(String),
    /// A scenario file could not be read or parsed.
    #[error("scenario error: {0}")]
    Scenario(String),
}

pub type Result<T> = std::result::Result<T, OptimizeError>;

impl From<rayon::ThreadPoolBuildError> for OptimizeError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        OptimizeError::ThreadPool(err.to_string())
    }
}

impl From<std::io::Error> for OptimizeError {
    fn from(err: std::io::Error) -> Self {
        OptimizeError::Scenario(err.to_string())
    }
}

impl From<serde_json::Error> for OptimizeError {
    fn from(err: serde_json::Error) -> Self {
        OptimizeError::Scenario(err.to_string())
    }
}
