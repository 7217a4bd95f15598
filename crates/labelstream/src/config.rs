//! Configuration and defaults for label metadata queries.
//!
//! ## Key Concepts
//! - **Message size threshold**: Byte budget per outbound batch. A batch is
//!   flushed the moment its accounted size reaches the threshold.
//! - **Counting workers**: Per label name, series counts for its values are
//!   computed by a fixed-size pool of blocking workers.
//! - **Backpressure**: Result and stream buffers are bounded so that memory
//!   stays proportional to the buffer sizes, not to the answer.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Default byte budget per outbound batch (1 MiB).
pub const DEFAULT_MESSAGE_SIZE_THRESHOLD: usize = 1024 * 1024;

/// Default capacity of the per-name channel between counting workers and the
/// aggregator.
pub const DEFAULT_RESULT_BUFFER_SIZE: usize = 1024;

/// Default number of batches buffered between a spawned query and its stream.
pub const DEFAULT_STREAM_BUFFER_SIZE: usize = 8;

/// Number of postings advanced between two cancellation checks while counting.
pub const CHECK_CANCELLATION_INTERVAL: u64 = 1000;

/// Which values of a label the cardinality query reports.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueFilter {
    /// List values with the request matchers applied. Values carried only by
    /// excluded series are absent from the response.
    #[default]
    Matched,
    /// List every value of the label. Values carried only by excluded series
    /// are reported with a count of zero.
    All,
}

/// How per-value postings are intersected with the request matchers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostingsStrategy {
    /// Resolve `matchers + {name=value}` from scratch for every value.
    #[default]
    PerValue,
    /// Resolve the request matchers once per call and intersect that set with
    /// each value's postings.
    Intersect,
}

/// Tuning knobs shared by both query pipelines.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub message_size_threshold: usize,
    pub count_workers: usize,
    pub result_buffer_size: usize,
    pub stream_buffer_size: usize,
    pub value_filter: ValueFilter,
    pub postings_strategy: PostingsStrategy,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            message_size_threshold: DEFAULT_MESSAGE_SIZE_THRESHOLD,
            count_workers: num_cpus::get(),
            result_buffer_size: DEFAULT_RESULT_BUFFER_SIZE,
            stream_buffer_size: DEFAULT_STREAM_BUFFER_SIZE,
            value_filter: ValueFilter::default(),
            postings_strategy: PostingsStrategy::default(),
        }
    }
}

impl ServiceConfig {
    /// Checks every size and count is usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] naming the first zero-valued setting.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("message_size_threshold", self.message_size_threshold),
            ("count_workers", self.count_workers),
            ("result_buffer_size", self.result_buffer_size),
            ("stream_buffer_size", self.stream_buffer_size),
        ] {
            if value == 0 {
                return Err(Error::InvalidRequest {
                    reason: format!("{name} must be greater than 0"),
                });
            }
        }
        Ok(())
    }

    /// The subset of settings the cardinality pipeline needs.
    pub const fn cardinality_options(&self) -> CardinalityOptions {
        CardinalityOptions {
            message_size_threshold: self.message_size_threshold,
            count_workers: self.count_workers,
            result_buffer_size: self.result_buffer_size,
            value_filter: self.value_filter,
            postings_strategy: self.postings_strategy,
        }
    }
}

/// Per-call settings for
/// [`label_values_cardinality`](crate::label_values_cardinality).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CardinalityOptions {
    pub message_size_threshold: usize,
    pub count_workers: usize,
    pub result_buffer_size: usize,
    pub value_filter: ValueFilter,
    pub postings_strategy: PostingsStrategy,
}

impl CardinalityOptions {
    /// Defaults with the given byte budget per batch.
    pub fn with_threshold(message_size_threshold: usize) -> Self {
        Self {
            message_size_threshold,
            ..ServiceConfig::default().cardinality_options()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ServiceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.message_size_threshold, DEFAULT_MESSAGE_SIZE_THRESHOLD);
        assert!(config.count_workers >= 1);
        assert_eq!(config.value_filter, ValueFilter::Matched);
        assert_eq!(config.postings_strategy, PostingsStrategy::PerValue);
    }

    #[test]
    fn zero_settings_are_rejected() {
        let config = ServiceConfig {
            count_workers: 0,
            ..ServiceConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(Error::InvalidRequest {
                reason: "count_workers must be greater than 0".to_string()
            })
        );

        let config = ServiceConfig {
            message_size_threshold: 0,
            ..ServiceConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidRequest { .. })));
    }

    #[test]
    fn options_carry_threshold() {
        let opts = CardinalityOptions::with_threshold(25);
        assert_eq!(opts.message_size_threshold, 25);
        assert_eq!(opts.value_filter, ValueFilter::Matched);
    }
}
