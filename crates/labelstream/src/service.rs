//! Query entry point shared by every transport.
//!
//! [`LabelService`] bundles an index, a postings resolver and a validated
//! [`ServiceConfig`]. Each query can either be driven against a caller-owned
//! [`ResponseSink`], or spawned onto the runtime and consumed as a
//! [`BatchStream`].
//!
//! ## Responsibilities
//!
//! - Validate configuration once, at construction.
//! - Run both pipelines with the configured thresholds and pool sizes.
//! - Record request, error and duration metrics.
//! - Surface terminal errors as the last item of a spawned stream.

use crate::{
    CardinalityBatch, ChannelSink, Matcher, NameValuesBatch, ResponseSink, Result,
    ServiceConfig,
    index::{
        IndexReader,
        resolver::{MatcherResolver, PostingsResolver},
    },
    telemetry::{increment_requests, increment_stream_errors, record_stream_duration},
};
use core::{
    pin::Pin,
    task::{Context, Poll},
};
use futures::TryStreamExt;
use std::{sync::Arc, time::Instant};
use tokio::sync::mpsc;
use tokio_stream::{Stream, wrappers::ReceiverStream};
use tokio_util::sync::CancellationToken;

/// Label metadata queries over a shared index.
pub struct LabelService<I: ?Sized, R: ?Sized = MatcherResolver> {
    index: Arc<I>,
    resolver: Arc<R>,
    config: ServiceConfig,
}

impl<I: ?Sized, R: ?Sized> Clone for LabelService<I, R> {
    fn clone(&self) -> Self {
        Self {
            index: Arc::clone(&self.index),
            resolver: Arc::clone(&self.resolver),
            config: self.config.clone(),
        }
    }
}

impl<I: ?Sized, R: ?Sized> core::fmt::Debug for LabelService<I, R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LabelService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<I> LabelService<I, MatcherResolver>
where
    I: IndexReader + ?Sized + 'static,
{
    /// Creates a service resolving matchers with [`MatcherResolver`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`](crate::Error::InvalidRequest) if `config`
    /// does not validate.
    pub fn with_matcher_resolver(index: Arc<I>, config: ServiceConfig) -> Result<Self> {
        Self::new(index, Arc::new(MatcherResolver), config)
    }
}

impl<I, R> LabelService<I, R>
where
    I: IndexReader + ?Sized + 'static,
    R: PostingsResolver<I> + ?Sized + 'static,
{
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`](crate::Error::InvalidRequest) if `config`
    /// does not validate.
    pub fn new(index: Arc<I>, resolver: Arc<R>, config: ServiceConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            index,
            resolver,
            config,
        })
    }

    pub const fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Runs the label names and values query against `sink`.
    ///
    /// See [`label_names_and_values`](crate::label_names_and_values).
    pub async fn label_names_and_values<S>(&self, matchers: &[Matcher], sink: &mut S) -> Result<()>
    where
        S: ResponseSink<NameValuesBatch>,
    {
        let start = Instant::now();
        increment_requests();

        let res = crate::label_names_and_values(
            &*self.index,
            matchers,
            self.config.message_size_threshold,
            sink,
        )
        .await;
        record_outcome(start, &res);
        res
    }

    /// Runs the label values cardinality query against `sink`.
    ///
    /// See [`label_values_cardinality`](crate::label_values_cardinality).
    pub async fn label_values_cardinality<S>(
        &self,
        label_names: &[String],
        matchers: &[Matcher],
        sink: &mut S,
    ) -> Result<()>
    where
        S: ResponseSink<CardinalityBatch>,
    {
        let start = Instant::now();
        increment_requests();

        let res = crate::label_values_cardinality(
            label_names,
            matchers,
            Arc::clone(&self.index),
            Arc::clone(&self.resolver),
            self.config.cardinality_options(),
            sink,
        )
        .await;
        record_outcome(start, &res);
        res
    }

    /// Spawns the label names and values query and returns its batches as a
    /// stream.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn stream_label_names_and_values(
        &self,
        matchers: Vec<Matcher>,
    ) -> BatchStream<NameValuesBatch> {
        let (mut sink, stream) = self.channel();
        let service = self.clone();

        let fut = async move {
            let res = service.label_names_and_values(&matchers, &mut sink).await;
            surface_error(&sink, res).await;
        };
        spawn_query(fut, "label_names_and_values");
        stream
    }

    /// Spawns the label values cardinality query and returns its batches as a
    /// stream.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn stream_label_values_cardinality(
        &self,
        label_names: Vec<String>,
        matchers: Vec<Matcher>,
    ) -> BatchStream<CardinalityBatch> {
        let (mut sink, stream) = self.channel();
        let service = self.clone();

        let fut = async move {
            let res = service
                .label_values_cardinality(&label_names, &matchers, &mut sink)
                .await;
            surface_error(&sink, res).await;
        };
        spawn_query(fut, "label_values_cardinality");
        stream
    }

    fn channel<B: Send + 'static>(&self) -> (ChannelSink<B>, BatchStream<B>) {
        let (tx, rx) = mpsc::channel(self.config.stream_buffer_size);
        let cancel = CancellationToken::new();
        let sink = ChannelSink::new(tx, cancel.clone());
        let inner = ReceiverStream::new(rx).inspect_err(|_e| {
            #[cfg(feature = "tracing")]
            tracing::debug!("Stream ended with error: {_e}");
        });
        let stream = BatchStream {
            inner: Box::pin(inner),
            cancel,
        };
        (sink, stream)
    }
}

fn record_outcome(start: Instant, res: &Result<()>) {
    match res {
        Ok(()) => record_stream_duration(start.elapsed().as_millis() as f64),
        Err(_e) => {
            increment_stream_errors();
            #[cfg(feature = "tracing")]
            log_failure(_e);
        }
    }
}

#[cfg(feature = "tracing")]
fn log_failure(err: &crate::Error) {
    if err.is_cancelled() {
        tracing::debug!("Query cancelled");
    } else {
        tracing::warn!("Query failed: {err}");
    }
}

/// Makes a best effort to deliver the terminal error to the stream consumer,
/// which may already have gone away.
async fn surface_error<B>(sink: &ChannelSink<B>, res: Result<()>) {
    if let Err(e) = res {
        if !sink.send_error(e).await {
            #[cfg(feature = "tracing")]
            tracing::debug!("Failed to forward err: receiver dropped");
        }
    }
}

fn spawn_query<F>(fut: F, _name: &'static str)
where
    F: Future<Output = ()> + Send + 'static,
{
    #[cfg(feature = "tracing")]
    let fut = {
        use tracing::Instrument;
        let span = tracing::info_span!("streaming", query = _name);
        fut.instrument(span)
    };

    tokio::spawn(fut);
}

/// Batches of a spawned query, ending with an `Err` item if the query failed.
///
/// Dropping the stream cancels the query.
pub struct BatchStream<B> {
    inner: Pin<Box<dyn Stream<Item = Result<B>> + Send>>,
    cancel: CancellationToken,
}

impl<B> BatchStream<B> {
    /// Token of the running query. Cancelling it stops the query; the stream
    /// then ends with [`Error::Cancelled`](crate::Error::Cancelled).
    pub const fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl<B> Stream for BatchStream<B> {
    type Item = Result<B>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl<B> Drop for BatchStream<B> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl<B> core::fmt::Debug for BatchStream<B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BatchStream")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}
