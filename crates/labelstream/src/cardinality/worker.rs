use super::pool::CountResult;
use crate::{
    Matcher, PostingsStrategy, Result,
    index::{IndexReader, resolver::PostingsResolver},
    postings::{MatchedPostings, count_intersecting, count_label_value_series},
};
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// The values of one label name, handed out one at a time to whichever worker
/// asks next.
#[derive(Debug)]
pub(crate) struct WorkQueue {
    label_name: String,
    values: Vec<String>,
    next_value: AtomicUsize,
}

impl WorkQueue {
    pub(crate) fn new(label_name: &str, values: Vec<String>) -> Self {
        Self {
            label_name: label_name.to_string(),
            values,
            next_value: AtomicUsize::new(0),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.values.len()
    }

    /// Claims the next unclaimed value. Each value is claimed exactly once.
    fn claim(&self) -> Option<&str> {
        let idx = self.next_value.fetch_add(1, Ordering::Relaxed);
        self.values.get(idx).map(String::as_str)
    }
}

/// Series counter shared by every worker of a call.
///
/// Holds the request matchers and, for [`PostingsStrategy::Intersect`], the
/// postings they resolve to.
pub(crate) struct ValueCounter<I: ?Sized, R: ?Sized> {
    index: Arc<I>,
    resolver: Arc<R>,
    matchers: Vec<Matcher>,
    matched: Option<MatchedPostings>,
}

impl<I, R> ValueCounter<I, R>
where
    I: IndexReader + ?Sized,
    R: PostingsResolver<I> + ?Sized,
{
    pub(crate) fn new(
        index: Arc<I>,
        resolver: Arc<R>,
        matchers: &[Matcher],
        strategy: PostingsStrategy,
    ) -> Result<Self> {
        let matched = match strategy {
            PostingsStrategy::PerValue => None,
            PostingsStrategy::Intersect => {
                Some(MatchedPostings::resolve(&*index, &*resolver, matchers)?)
            }
        };
        Ok(Self {
            index,
            resolver,
            matchers: matchers.to_vec(),
            matched,
        })
    }

    fn count(&self, cancel: &CancellationToken, name: &str, value: &str) -> Result<u64> {
        match &self.matched {
            Some(matched) => count_intersecting(cancel, name, value, &*self.index, matched),
            None => count_label_value_series(
                cancel,
                name,
                value,
                &*self.index,
                &*self.resolver,
                &self.matchers,
            ),
        }
    }
}

/// Blocking loop of one counting worker.
///
/// Claims values from `work` until the queue is drained or `cancel` fires, and
/// sends one result per claimed value. Sending blocks while the result channel
/// is full, so workers never run further ahead of the aggregator than the
/// channel capacity.
///
/// A failed count is sent first and only then cancels `cancel`. Siblings that
/// abort because of it report [`Cancelled`](crate::Error::Cancelled) behind the
/// underlying error, so the aggregator sees the root cause.
pub(crate) fn count_worker<I, R>(
    worker_id: usize,
    work: &WorkQueue,
    counter: &ValueCounter<I, R>,
    cancel: &CancellationToken,
    results: &mpsc::Sender<CountResult>,
) where
    I: IndexReader + ?Sized,
    R: PostingsResolver<I> + ?Sized,
{
    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} started on {:?}", work.label_name);

    while !cancel.is_cancelled() {
        let Some(value) = work.claim() else {
            break;
        };

        let result = counter
            .count(cancel, &work.label_name, value)
            .map(|count| (value.to_string(), count));
        let failed = result.is_err();

        if results.blocking_send(result).is_err() {
            #[cfg(feature = "tracing")]
            tracing::debug!("Worker {worker_id}: aggregator went away");
            break;
        }

        if failed {
            #[cfg(feature = "tracing")]
            tracing::debug!("Worker {worker_id}: count failed, stopping siblings");
            cancel.cancel();
            break;
        }
    }

    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} stopped");
    #[cfg(not(feature = "tracing"))]
    let _ = worker_id;
}
