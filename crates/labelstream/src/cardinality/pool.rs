//! Per-label pool of blocking counting workers.
//!
//! A [`CountingPool`] is started for every label name that has values. It
//! spawns up to `count_workers` blocking tasks that pull values from a shared
//! [`WorkQueue`] and push `(value, count)` results into one bounded channel.
//! The channel closes once the last worker exits.
//!
//! Workers run under a child of the request's [`CancellationToken`]. Dropping
//! the pool cancels that child, so an aggregator that bails out early never
//! leaves workers counting in the background.

use super::worker::{ValueCounter, WorkQueue, count_worker};
use crate::{
    Result,
    index::{IndexReader, resolver::PostingsResolver},
};
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinSet};
use tokio_util::sync::{CancellationToken, DropGuard};

/// Outcome of counting one label value.
pub(crate) type CountResult = Result<(String, u64)>;

pub(crate) struct CountingPool {
    results: mpsc::Receiver<CountResult>,
    workers: JoinSet<()>,
    _guard: DropGuard,
}

impl CountingPool {
    /// Starts counting `values` of `label_name`.
    ///
    /// Must be called from within a Tokio runtime.
    pub(crate) fn spawn<I, R>(
        label_name: &str,
        values: Vec<String>,
        counter: &Arc<ValueCounter<I, R>>,
        parent: &CancellationToken,
        count_workers: usize,
        result_buffer_size: usize,
    ) -> Self
    where
        I: IndexReader + ?Sized + 'static,
        R: PostingsResolver<I> + ?Sized + 'static,
    {
        let work = Arc::new(WorkQueue::new(label_name, values));
        let cancel = parent.child_token();

        let worker_count = count_workers.min(work.len()).max(1);
        let (tx, results) = mpsc::channel(result_buffer_size.min(work.len()).max(1));

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "Counting {} values of {label_name:?} with {worker_count} workers",
            work.len()
        );

        let mut workers = JoinSet::new();
        for worker_id in 0..worker_count {
            let work = Arc::clone(&work);
            let counter = Arc::clone(counter);
            let cancel = cancel.clone();
            let tx = tx.clone();
            workers.spawn_blocking(move || count_worker(worker_id, &work, &*counter, &cancel, &tx));
        }

        Self {
            results,
            workers,
            _guard: cancel.drop_guard(),
        }
    }

    /// Next result in completion order, or `None` once every worker exited.
    pub(crate) async fn next(&mut self) -> Option<CountResult> {
        self.results.recv().await
    }

    /// Waits for every worker to exit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Worker`](crate::Error::Worker) if a worker panicked.
    pub(crate) async fn join(mut self) -> Result<()> {
        while let Some(joined) = self.workers.join_next().await {
            joined?;
        }
        Ok(())
    }
}
