//! Bounded worker pool for heuristic jobs.

use crate::error::{OptimizeError, Result};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// Fixed-size thread pool: a batch of jobs is submitted, at most `threads`
/// run at once, and the batch joins into every result or the first failure.
pub struct WorkerPool {
    inner: ThreadPool,
    threads: usize,
}

impl WorkerPool {
    pub fn new(num_threads: usize) -> Result<Self> {
        let threads = num_threads.max(1);
        let inner = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("route-worker-{}", i))
            .build()?;
        Ok(WorkerPool { inner, threads })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Run `op` over every job; results keep submission order.
    ///
    /// A panicking job becomes [`OptimizeError::WorkerFailure`]; the other jobs
    /// still run to completion before the error is returned.
    pub fn run_all<T, R, F>(&self, jobs: Vec<T>, op: F) -> Result<Vec<R>>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Send + Sync,
    {
        let outcomes: Vec<std::thread::Result<R>> = self.inner.install(|| {
            jobs.into_par_iter()
                .map(|job| panic::catch_unwind(AssertUnwindSafe(|| op(job))))
                .collect()
        });

        outcomes
            .into_iter()
            .map(|outcome| outcome.map_err(|payload| OptimizeError::WorkerFailure(panic_message(&*payload))))
            .collect()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "heuristic job panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_results_keep_order() {
        let pool = WorkerPool::new(4).unwrap();
        let squares = pool.run_all((0..32).collect(), |x: u64| x * x).unwrap();
        assert_eq!(squares, (0..32).map(|x| x * x).collect::<Vec<_>>());
    }

    #[test]
    fn test_never_exceeds_thread_count() {
        let pool = WorkerPool::new(2).unwrap();
        let active = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        pool.run_all((0..10).collect(), |_: usize| {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(5));
            active.fetch_sub(1, Ordering::SeqCst);
        })
        .unwrap();

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_panic_becomes_worker_failure() {
        let pool = WorkerPool::new(2).unwrap();
        let outcome = pool.run_all(vec![1, 2, 3], |x: i32| {
            if x == 2 {
                panic!("job {} failed", x);
            }
            x
        });
        assert_eq!(outcome, Err(OptimizeError::WorkerFailure("job 2 failed".to_string())));
    }
}
