//! Outbound batch types.
//!
//! Each batch is one message handed to a [`ResponseSink`](crate::ResponseSink).
//! Batches are moved into the sink; the pipelines start a fresh batch after
//! every flush instead of reusing the sent buffers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One label name and a contiguous run of its values.
///
/// A label with many values may be split across several consecutive batches,
/// each carrying the next run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelValues {
    pub label_name: String,
    pub values: Vec<String>,
}

impl LabelValues {
    pub fn new(label_name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            label_name: label_name.into(),
            values,
        }
    }

    /// Bytes accounted for this item: the name plus every value.
    pub fn size_bytes(&self) -> usize {
        self.label_name.len() + self.values.iter().map(String::len).sum::<usize>()
    }
}

/// A batch of the label names and values stream.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameValuesBatch {
    pub items: Vec<LabelValues>,
}

impl NameValuesBatch {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        self.items.iter().map(LabelValues::size_bytes).sum()
    }
}

/// Series counts for the values of one label name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelValueSeriesCount {
    pub label_name: String,
    pub label_value_series: HashMap<String, u64>,
}

impl LabelValueSeriesCount {
    pub fn new(label_name: impl Into<String>) -> Self {
        Self {
            label_name: label_name.into(),
            label_value_series: HashMap::new(),
        }
    }

    pub fn size_bytes(&self) -> usize {
        self.label_name.len() + self.label_value_series.keys().map(String::len).sum::<usize>()
    }
}

/// A batch of the label values cardinality stream.
///
/// Holds at most one entry per label name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardinalityBatch {
    pub items: Vec<LabelValueSeriesCount>,
}

impl CardinalityBatch {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        self.items.iter().map(LabelValueSeriesCount::size_bytes).sum()
    }
}
