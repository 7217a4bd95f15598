//! Test doubles shared by the pipeline tests.

use crate::{
    Error, Matcher, ResponseSink, Result,
    index::{IndexReader, Postings},
};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Index with fixed names and values that cannot produce postings.
///
/// Matchers are ignored. Values are returned in the order given.
#[derive(Debug, Default)]
pub(crate) struct StaticIndex {
    labels: Vec<(String, Vec<String>)>,
    delay: Duration,
    fail_values_for: Option<String>,
}

impl StaticIndex {
    pub(crate) fn new(labels: &[(&str, &[&str])]) -> Self {
        let mut labels: Vec<(String, Vec<String>)> = labels
            .iter()
            .map(|(name, values)| {
                (
                    name.to_string(),
                    values.iter().map(|v| v.to_string()).collect(),
                )
            })
            .collect();
        labels.sort_by(|a, b| a.0.cmp(&b.0));
        Self {
            labels,
            ..Self::default()
        }
    }

    /// Every index operation sleeps for `delay` first.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn fail_values_for(mut self, name: &str) -> Self {
        self.fail_values_for = Some(name.to_string());
        self
    }

    fn pause(&self) {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
    }
}

impl IndexReader for StaticIndex {
    fn label_names(&self, _matchers: &[Matcher]) -> Result<Vec<String>> {
        self.pause();
        Ok(self.labels.iter().map(|(name, _)| name.clone()).collect())
    }

    fn label_values(&self, name: &str, _matchers: &[Matcher]) -> Result<Vec<String>> {
        self.pause();
        if self.fail_values_for.as_deref() == Some(name) {
            return Err(Error::index_read(format!(
                "label values unavailable for {name}"
            )));
        }
        Ok(self
            .labels
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, values)| values.clone())
            .unwrap_or_default())
    }

    fn postings(&self, _name: &str, _value: &str) -> Result<Postings> {
        Err(Error::index_read("postings not supported"))
    }

    fn all_postings(&self) -> Result<Postings> {
        Err(Error::index_read("postings not supported"))
    }
}

/// Sink that keeps every batch it receives.
#[derive(Debug)]
pub(crate) struct RecordingSink<B> {
    pub(crate) sent: Vec<B>,
    cancel: CancellationToken,
    fail_on_send: Option<usize>,
    cancel_after_sends: Option<usize>,
}

impl<B> RecordingSink<B> {
    pub(crate) fn new() -> Self {
        Self::with_token(CancellationToken::new())
    }

    pub(crate) fn with_token(cancel: CancellationToken) -> Self {
        Self {
            sent: Vec::new(),
            cancel,
            fail_on_send: None,
            cancel_after_sends: None,
        }
    }

    /// The send attempted after `n` successful sends fails.
    pub(crate) fn fail_on_send(mut self, n: usize) -> Self {
        self.fail_on_send = Some(n);
        self
    }

    /// Cancels the token once `n` batches were received.
    pub(crate) fn cancel_after_sends(mut self, n: usize) -> Self {
        self.cancel_after_sends = Some(n);
        self
    }
}

impl<B: Send> ResponseSink<B> for RecordingSink<B> {
    async fn send(&mut self, batch: B) -> Result<()> {
        if self.fail_on_send == Some(self.sent.len()) {
            return Err(Error::ChannelError {
                context: "client went away".to_string(),
            });
        }
        self.sent.push(batch);
        if self.cancel_after_sends == Some(self.sent.len()) {
            self.cancel.cancel();
        }
        Ok(())
    }

    fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }
}
