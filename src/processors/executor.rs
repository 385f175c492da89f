//! Fixed-size worker pool with ordered, fail-fast result collection.
//!
//! Each stage maps a task over a slice of inputs on a dedicated `rayon`
//! pool. Results come back in input order whatever the completion order,
//! and the first failing task aborts the stage. Workers report completions
//! over a channel to a single reporter thread that owns the progress bar and
//! the completed count, so no counter is shared between workers.

use std::convert::Infallible;
use std::thread;
use std::time::Duration;

use crossbeam_channel::unbounded;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use thiserror::Error;

/// Errors creating the worker pool.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("worker pool size must be at least 1")]
    NoWorkers,

    #[error("failed to build worker pool: {0}")]
    PoolBuild(#[from] rayon::ThreadPoolBuildError),
}

/// A task failure that aborted a stage.
#[derive(Debug, Error)]
#[error("{stage} stage aborted after {completed} of {total} tasks: {source}")]
pub struct StageError<E: std::error::Error + Send + 'static> {
    pub stage: String,
    /// Tasks that finished successfully before the abort was observed
    pub completed: usize,
    pub total: usize,
    #[source]
    pub source: E,
}

/// Worker pool used by every parallel stage of a run.
pub struct Executor {
    pool: rayon::ThreadPool,
    workers: usize,
    show_progress: bool,
}

impl Executor {
    /// Create a pool with `workers` threads.
    pub fn new(workers: usize, show_progress: bool) -> Result<Self, ExecutorError> {
        if workers == 0 {
            return Err(ExecutorError::NoWorkers);
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("sift-worker-{}", i))
            .build()?;

        Ok(Self {
            pool,
            workers,
            show_progress,
        })
    }

    #[inline]
    pub fn workers(&self) -> usize {
        self.workers
    }

    fn progress_bar(&self, stage: &str, total: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} {msg:<10} [{bar:40.cyan/blue}] {pos}/{len}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        pb.set_message(stage.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Run `task` over every item, returning results in input order.
    ///
    /// The stage blocks until every worker has finished. If any task fails,
    /// the remaining tasks are abandoned as soon as possible and the error is
    /// returned; no partial results are exposed.
    pub fn try_map<T, R, E, F>(
        &self,
        stage: &str,
        items: &[T],
        task: F,
    ) -> Result<Vec<R>, StageError<E>>
    where
        T: Sync,
        R: Send,
        E: std::error::Error + Send + 'static,
        F: Fn(&T) -> Result<R, E> + Sync,
    {
        let total = items.len();
        let (done_tx, done_rx) = unbounded::<()>();
        let pb = self.progress_bar(stage, total);

        thread::scope(|scope| {
            let reporter = scope.spawn(move || {
                let mut completed = 0usize;
                for () in done_rx.iter() {
                    completed += 1;
                    pb.inc(1);
                }
                pb.finish_and_clear();
                completed
            });

            let outcome: Result<Vec<R>, E> = self.pool.install(|| {
                items
                    .par_iter()
                    .map_with(done_tx, |tx, item| {
                        let result = task(item);
                        if result.is_ok() {
                            // The reporter outlives every sender, so this cannot fail
                            let _ = tx.send(());
                        }
                        result
                    })
                    .collect()
            });

            // All senders are gone once the parallel iterator is consumed
            let completed = reporter.join().unwrap_or_default();

            outcome.map_err(|source| StageError {
                stage: stage.to_string(),
                completed,
                total,
                source,
            })
        })
    }

    /// Run an infallible `task` over every item, returning results in input order.
    pub fn map<T, R, F>(&self, stage: &str, items: &[T], task: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync,
    {
        match self.try_map(stage, items, |item| Ok::<R, Infallible>(task(item))) {
            Ok(results) => results,
            Err(failure) => match failure.source {},
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Error, PartialEq)]
    #[error("bad item {0}")]
    struct BadItem(usize);

    #[test]
    fn test_zero_workers_rejected() {
        assert!(matches!(Executor::new(0, false), Err(ExecutorError::NoWorkers)));
    }

    #[test]
    fn test_map_preserves_input_order() {
        let executor = Executor::new(4, false).unwrap();
        let items: Vec<u64> = (0..1000).collect();

        let results = executor.map("square", &items, |&x| {
            // Uneven work so completion order differs from input order
            if x % 7 == 0 {
                thread::sleep(Duration::from_micros(50));
            }
            x * x
        });

        let expected: Vec<u64> = items.iter().map(|x| x * x).collect();
        assert_eq!(results, expected);
    }

    #[test]
    fn test_results_identical_across_pool_sizes() {
        let items: Vec<String> = (0..257).map(|i| format!("task-{}", i)).collect();
        let task = |s: &String| s.len() * 3 + s.chars().last().map(|c| c as usize).unwrap_or(0);

        let single = Executor::new(1, false).unwrap().map("one", &items, task);
        let many = Executor::new(8, false).unwrap().map("many", &items, task);

        assert_eq!(single.len(), items.len());
        assert_eq!(single, many);
    }

    #[test]
    fn test_try_map_fails_fast_with_error() {
        let executor = Executor::new(3, false).unwrap();
        let items: Vec<usize> = (0..50).collect();

        let result = executor.try_map("check", &items, |&i| {
            if i == 17 {
                Err(BadItem(i))
            } else {
                Ok(i)
            }
        });

        let err = result.unwrap_err();
        assert_eq!(err.source, BadItem(17));
        assert_eq!(err.stage, "check");
        assert_eq!(err.total, 50);
        assert!(err.completed < 50);
    }

    #[test]
    fn test_try_map_counts_completions() {
        let executor = Executor::new(2, false).unwrap();
        let items = vec![1, 2, 3];
        let calls = AtomicUsize::new(0);

        let result: Result<Vec<i32>, StageError<BadItem>> = executor.try_map("ok", &items, |&x| {
            calls.fetch_add(1, Ordering::Relaxed);
            Ok(x + 1)
        });

        assert_eq!(result.unwrap(), vec![2, 3, 4]);
        assert_eq!(calls.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_empty_input() {
        let executor = Executor::new(2, false).unwrap();
        let items: Vec<u8> = Vec::new();
        assert!(executor.map("empty", &items, |&x| x).is_empty());
    }
}
