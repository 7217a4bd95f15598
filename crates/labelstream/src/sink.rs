//! Response sinks.
//!
//! A [`ResponseSink`] is the transport-facing end of a query: it accepts each
//! flushed batch and carries the request's [`CancellationToken`]. Sending may
//! wait on transport backpressure, which is what bounds how far the pipelines
//! can run ahead of the client.

use crate::{Error, Result};
use core::future::Future;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Consumer of outbound batches for a single request.
pub trait ResponseSink<B>: Send {
    /// Delivers one batch. Ownership of the batch moves to the sink.
    fn send(&mut self, batch: B) -> impl Future<Output = Result<()>> + Send;

    /// Token that fires when the request is cancelled.
    fn cancellation_token(&self) -> &CancellationToken;
}

/// A sink that forwards batches into a bounded channel.
///
/// Pair the receiving half with [`tokio_stream::wrappers::ReceiverStream`] to
/// expose a query as a stream. Sending fails with [`Error::ChannelError`] once
/// the receiver is dropped.
#[derive(Debug)]
pub struct ChannelSink<B> {
    tx: mpsc::Sender<Result<B>>,
    cancel: CancellationToken,
}

impl<B> ChannelSink<B> {
    pub const fn new(tx: mpsc::Sender<Result<B>>, cancel: CancellationToken) -> Self {
        Self { tx, cancel }
    }

    /// Best effort delivery of a terminal error to the receiver.
    ///
    /// Returns `false` if the receiver has gone away.
    pub async fn send_error(&self, err: Error) -> bool {
        self.tx.send(Err(err)).await.is_ok()
    }
}

impl<B: Send> ResponseSink<B> for ChannelSink<B> {
    async fn send(&mut self, batch: B) -> Result<()> {
        self.tx
            .send(Ok(batch))
            .await
            .map_err(|e| Error::ChannelError {
                context: format!("Failed to forward batch: {e}"),
            })
    }

    fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }
}
