//! Read-only index capability consumed by the query pipelines.
//!
//! The storage index itself lives outside this crate. Anything that can list
//! label names, label values and postings implements [`IndexReader`] and can be
//! queried concurrently by the counting workers.
//!
//! ## Submodules
//!
//! - [`resolver`] - Matcher-driven postings resolution and sorted-list set
//!   operations.
//! - [`memory`] - A thread-safe in-memory index used by tools and tests.

pub mod memory;
pub mod resolver;

use crate::{Matcher, Result};

/// Opaque identifier of one series in the index.
pub type SeriesRef = u64;

/// A lazy, strictly increasing sequence of series references.
///
/// An `Err` item is terminal: consumers stop at the first error and report it.
pub type Postings = Box<dyn Iterator<Item = Result<SeriesRef>> + Send>;

/// Wraps an already materialized, sorted list of references as [`Postings`].
pub fn postings_from_sorted(refs: Vec<SeriesRef>) -> Postings {
    Box::new(refs.into_iter().map(Ok))
}

/// Read access to label names, label values and postings.
///
/// Implementations must be safe for concurrent calls from many threads; the
/// cardinality pipeline reads from several counting workers at once.
///
/// Every method is treated as blocking. The cardinality pipeline calls them on
/// tokio's blocking pool. [`label_names_and_values`](crate::label_names_and_values)
/// borrows the index and calls `label_names`/`label_values` on the task that
/// polls it, so an index with slow listings should be driven through
/// [`LabelService`](crate::LabelService), which runs each query on its own task.
pub trait IndexReader: Send + Sync {
    /// Returns the label names carried by series matching `matchers`.
    ///
    /// The result must be sorted ascending. Batch boundaries emitted by the
    /// name/value stream depend on this order.
    fn label_names(&self, matchers: &[Matcher]) -> Result<Vec<String>>;

    /// Returns the values of `name` carried by series matching `matchers`, in
    /// the index's native order.
    fn label_values(&self, name: &str, matchers: &[Matcher]) -> Result<Vec<String>>;

    /// Returns the postings of series carrying `name=value`.
    fn postings(&self, name: &str, value: &str) -> Result<Postings>;

    /// Returns the postings of every series in the index.
    fn all_postings(&self) -> Result<Postings>;
}

impl<T: IndexReader + ?Sized> IndexReader for std::sync::Arc<T> {
    fn label_names(&self, matchers: &[Matcher]) -> Result<Vec<String>> {
        (**self).label_names(matchers)
    }

    fn label_values(&self, name: &str, matchers: &[Matcher]) -> Result<Vec<String>> {
        (**self).label_values(name, matchers)
    }

    fn postings(&self, name: &str, value: &str) -> Result<Postings> {
        (**self).postings(name, value)
    }

    fn all_postings(&self) -> Result<Postings> {
        (**self).all_postings()
    }
}
