//! Streaming of per-value series counts for a set of label names.
//!
//! For every requested label name the values are counted in parallel by a
//! [`pool::CountingPool`], while this module aggregates the results in
//! completion order into [`CardinalityBatch`]es:
//!
//! ```text
//!        label names (in request order)
//!                 │
//!                 ▼
//!        ┌─────────────────┐     values      ┌──────────────────────┐
//!        │   aggregator    │ ──────────────▶ │ counting pool        │
//!        │ (this module)   │                 │ N blocking workers   │
//!        │                 │ ◀────────────── │ claim value, count   │
//!        └─────────────────┘ (value, count)  └──────────────────────┘
//!                 │        bounded channel
//!                 ▼
//!          ResponseSink::send
//! ```
//!
//! The aggregator is the only writer to the outbound batch. Value order
//! within a label is not deterministic, and the values of one label can be
//! split over several batches.
//!
//! ## Submodules
//!
//! - [`pool`] - Per-label worker pool and result channel.
//! - [`worker`] - Value claiming and counting loop.

mod pool;
mod worker;


use crate::{
    CardinalityBatch, CardinalityOptions, Error, LabelValueSeriesCount, Matcher, ResponseSink,
    Result, ValueFilter,
    index::{IndexReader, resolver::PostingsResolver},
    telemetry::{increment_batches_sent, increment_values_counted},
};
use pool::CountingPool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use worker::ValueCounter;

/// Streams, for each of `label_names`, the number of series carrying each of
/// its values.
///
/// Names are processed in the given order. Each result adds the value's byte
/// length to the batch size; once the size reaches
/// `options.message_size_threshold` the batch is sent and a new one started.
/// Names without values produce no entry. A final partial batch is sent at the
/// end; empty batches are never sent.
///
/// With [`ValueFilter::Matched`] only values of series selected by `matchers`
/// are listed. With [`ValueFilter::All`] every value of the label is listed and
/// those outside the selection count zero. In both cases counts only include
/// series matching `matchers`.
///
/// # Errors
///
/// The first index, postings, resolver or sink error ends the call and is
/// returned unchanged. Batches already sent are not retracted. Returns
/// [`Error::Cancelled`] as soon as the sink's token fires, including while
/// waiting for a label's values or its counts.
#[cfg_attr(
    feature = "tracing",
    tracing::instrument(
        skip_all,
        fields(
            label_names = label_names.len(),
            matchers = matchers.len(),
            threshold = options.message_size_threshold,
        )
    )
)]
pub async fn label_values_cardinality<I, R, S>(
    label_names: &[String],
    matchers: &[Matcher],
    index: Arc<I>,
    resolver: Arc<R>,
    options: CardinalityOptions,
    sink: &mut S,
) -> Result<()>
where
    I: IndexReader + ?Sized + 'static,
    R: PostingsResolver<I> + ?Sized + 'static,
    S: ResponseSink<CardinalityBatch>,
{
    let cancel = sink.cancellation_token().clone();
    let counter = Arc::new(ValueCounter::new(
        Arc::clone(&index),
        resolver,
        matchers,
        options.postings_strategy,
    )?);

    let mut batch = CardinalityBatch::default();
    let mut batch_size = 0_usize;

    for label_name in label_names {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let values =
            list_values(&index, label_name, matchers, options.value_filter, &cancel).await?;
        if values.is_empty() {
            continue;
        }
        let total = values.len();

        let mut pool = CountingPool::spawn(
            label_name,
            values,
            &counter,
            &cancel,
            options.count_workers,
            options.result_buffer_size,
        );

        // Index of this label's entry in `batch`, created on its first result.
        let mut current: Option<usize> = None;
        let mut received = 0_usize;

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(Error::Cancelled),
                next = pool.next() => next,
            };
            let Some(result) = next else {
                break;
            };
            let (value, count) = result?;
            received += 1;

            let idx = match current {
                Some(idx) => idx,
                None => {
                    batch
                        .items
                        .push(LabelValueSeriesCount::new(label_name.as_str()));
                    let idx = batch.items.len() - 1;
                    current = Some(idx);
                    idx
                }
            };
            batch_size += value.len();
            batch.items[idx].label_value_series.insert(value, count);

            if batch_size < options.message_size_threshold {
                continue;
            }
            flush(sink, &mut batch).await?;
            batch_size = 0;
            current = None;
        }

        pool.join().await?;
        if received != total {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            return Err(Error::Worker {
                context: format!("Counted {received} of {total} values of {label_name:?}"),
            });
        }
        increment_values_counted(received as u64);
    }

    if !batch.is_empty() {
        flush(sink, &mut batch).await?;
    }

    Ok(())
}

/// Lists the values of `label_name` on the blocking pool.
///
/// Returns [`Error::Cancelled`] as soon as `cancel` fires, without waiting for
/// the index read to finish.
async fn list_values<I>(
    index: &Arc<I>,
    label_name: &str,
    matchers: &[Matcher],
    filter: ValueFilter,
    cancel: &CancellationToken,
) -> Result<Vec<String>>
where
    I: IndexReader + ?Sized + 'static,
{
    let index = Arc::clone(index);
    let label_name = label_name.to_string();
    let matchers = match filter {
        ValueFilter::Matched => matchers.to_vec(),
        ValueFilter::All => Vec::new(),
    };
    let read = tokio::task::spawn_blocking(move || index.label_values(&label_name, &matchers));

    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(Error::Cancelled),
        res = read => res?,
    }
}

async fn flush<S>(sink: &mut S, batch: &mut CardinalityBatch) -> Result<()>
where
    S: ResponseSink<CardinalityBatch>,
{
    let batch = core::mem::take(batch);

    #[cfg(feature = "tracing")]
    tracing::trace!(
        items = batch.items.len(),
        bytes = batch.size_bytes(),
        "Flushing cardinality batch"
    );

    sink.send(batch).await?;
    increment_batches_sent();
    Ok(())
}
