//! # Concurrency Orchestrator
//!
//! A reusable, bounded worker pool that runs independent units of work and
//! waits for all of them.
//!
//! - Each unit runs on one pool thread; at most `workers` run at once
//! - A unit's error or panic is captured in its own `UnitOutcome`
//! - Siblings are never cancelled; `run_all` returns once every unit is done

use crate::CardGraphError;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::Serialize;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// A named unit of work.
pub struct Unit<'a, T> {
    pub name: String,
    pub task: Box<dyn FnOnce() -> Result<T, CardGraphError> + Send + 'a>,
}

impl<'a, T> Unit<'a, T> {
    pub fn new(
        name: impl Into<String>,
        task: impl FnOnce() -> Result<T, CardGraphError> + Send + 'a,
    ) -> Self {
        Self {
            name: name.into(),
            task: Box::new(task),
        }
    }
}

/// Completion record of one unit.
#[derive(Debug, Clone, Serialize)]
pub struct UnitOutcome<T> {
    pub name: String,
    /// The unit's value, or its error rendered as text.
    pub result: Result<T, String>,
}

impl<T> UnitOutcome<T> {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

/// A bounded pool of worker threads.
pub struct WorkerPool {
    pool: ThreadPool,
    workers: usize,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers)
            .finish()
    }
}

impl WorkerPool {
    /// Build a pool of `workers` threads (at least one).
    pub fn new(workers: usize) -> Result<Self, CardGraphError> {
        let workers = workers.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("cardgraph-worker-{i}"))
            .build()
            .map_err(|e| CardGraphError::WorkerPool(e.to_string()))?;
        Ok(Self { pool, workers })
    }

    /// Number of worker threads.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run every unit and wait for all of them.
    ///
    /// Outcomes are returned in submission order.
    pub fn run_all<'a, T: Send>(&self, units: Vec<Unit<'a, T>>) -> Vec<UnitOutcome<T>> {
        self.pool.install(|| {
            units
                .into_par_iter()
                .with_max_len(1)
                .map(|unit| {
                    let name = unit.name;
                    let task = unit.task;
                    let result = match catch_unwind(AssertUnwindSafe(task)) {
                        Ok(Ok(value)) => Ok(value),
                        Ok(Err(e)) => {
                            tracing::error!(unit = %name, error = %e, "unit failed");
                            Err(e.to_string())
                        }
                        Err(panic) => {
                            let message = panic_message(panic.as_ref());
                            tracing::error!(unit = %name, panic = %message, "unit panicked");
                            Err(format!("panicked: {message}"))
                        }
                    };
                    UnitOutcome { name, result }
                })
                .collect()
        })
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn runs_every_unit_in_order() {
        let pool = WorkerPool::new(4).expect("pool");
        let units = (0..10)
            .map(|i| Unit::new(format!("unit-{i}"), move || Ok(i * 2)))
            .collect();

        let outcomes = pool.run_all(units);

        assert_eq!(outcomes.len(), 10);
        for (i, outcome) in outcomes.iter().enumerate() {
            assert_eq!(outcome.name, format!("unit-{i}"));
            assert_eq!(outcome.result, Ok(i * 2));
        }
    }

    #[test]
    fn failure_does_not_cancel_siblings() {
        let pool = WorkerPool::new(2).expect("pool");
        let done = AtomicUsize::new(0);
        let units = vec![
            Unit::new("fails", || Err(CardGraphError::Store("boom".into()))),
            Unit::new("slow", || {
                std::thread::sleep(Duration::from_millis(20));
                done.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
            Unit::new("fast", || {
                done.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        ];

        let outcomes = pool.run_all(units);

        assert!(!outcomes[0].succeeded());
        assert!(outcomes[1].succeeded());
        assert!(outcomes[2].succeeded());
        assert_eq!(done.load(Ordering::SeqCst), 2);
    }

    #[test]
    #[allow(clippy::panic)]
    fn panics_are_contained() {
        let pool = WorkerPool::new(2).expect("pool");
        let units: Vec<Unit<'_, ()>> = vec![
            Unit::new("panics", || panic!("worker exploded")),
            Unit::new("fine", || Ok(())),
        ];

        let outcomes = pool.run_all(units);

        let err = outcomes[0].result.as_ref().expect_err("panic captured");
        assert!(err.contains("worker exploded"));
        assert!(outcomes[1].succeeded());
    }

    #[test]
    fn zero_workers_still_runs() {
        let pool = WorkerPool::new(0).expect("pool");
        assert_eq!(pool.workers(), 1);
        let outcomes = pool.run_all(vec![Unit::new("one", || Ok(1))]);
        assert_eq!(outcomes[0].result, Ok(1));
    }
}
