//! Series counting for a single `name=value` pair.
//!
//! Both counting strategies advance a postings iterator to exhaustion and
//! check the cancellation token every [`CHECK_CANCELLATION_INTERVAL`] advances,
//! which bounds cancellation latency on huge postings lists without paying for
//! a check per series.

use crate::{
    CHECK_CANCELLATION_INTERVAL, Error, Matcher, Result,
    index::{IndexReader, Postings, SeriesRef, resolver::PostingsResolver},
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Counts the series matching `matchers` plus `name=value`.
///
/// Postings are resolved through `resolver` with the caller's matchers and one
/// extra equality matcher for the pair being counted.
///
/// # Errors
///
/// - Resolver errors are returned unchanged.
/// - An [`Error::IndexRead`] yielded by the postings iterator is reported as
///   [`Error::Postings`] for this pair; other iterator errors are returned
///   unchanged.
/// - [`Error::Cancelled`] if `cancel` fires, observed at the check interval.
pub fn count_label_value_series<I, R>(
    cancel: &CancellationToken,
    name: &str,
    value: &str,
    index: &I,
    resolver: &R,
    matchers: &[Matcher],
) -> Result<u64>
where
    I: IndexReader + ?Sized,
    R: PostingsResolver<I> + ?Sized,
{
    let mut value_matchers = Vec::with_capacity(matchers.len() + 1);
    value_matchers.extend_from_slice(matchers);
    value_matchers.push(Matcher::equal(name, value));

    let postings = resolver.resolve(index, &value_matchers)?;
    count_postings(cancel, name, value, postings, None)
}

/// Postings of the request matchers, resolved once and shared read-only by all
/// counting workers of a call.
#[derive(Clone, Debug)]
pub struct MatchedPostings {
    /// `None` when the request has no matchers and every series qualifies.
    refs: Option<Arc<[SeriesRef]>>,
}

impl MatchedPostings {
    pub fn resolve<I, R>(index: &I, resolver: &R, matchers: &[Matcher]) -> Result<Self>
    where
        I: IndexReader + ?Sized,
        R: PostingsResolver<I> + ?Sized,
    {
        if matchers.is_empty() {
            return Ok(Self { refs: None });
        }
        let refs: Vec<SeriesRef> = resolver.resolve(index, matchers)?.collect::<Result<_>>()?;
        Ok(Self {
            refs: Some(refs.into()),
        })
    }

    /// Number of matched series, or `None` if unrestricted.
    pub fn len(&self) -> Option<usize> {
        self.refs.as_ref().map(|refs| refs.len())
    }
}

/// Counts the postings of `name=value` that are also in `matched`.
///
/// Produces the same count as [`count_label_value_series`] with the matchers
/// `matched` was resolved from.
pub fn count_intersecting<I>(
    cancel: &CancellationToken,
    name: &str,
    value: &str,
    index: &I,
    matched: &MatchedPostings,
) -> Result<u64>
where
    I: IndexReader + ?Sized,
{
    let postings = index.postings(name, value)?;
    count_postings(cancel, name, value, postings, matched.refs.as_deref())
}

fn count_postings(
    cancel: &CancellationToken,
    name: &str,
    value: &str,
    postings: Postings,
    filter: Option<&[SeriesRef]>,
) -> Result<u64> {
    let mut count = 0_u64;
    let mut advanced = 0_u64;
    let mut cursor = 0_usize;

    for item in postings {
        let series_ref = item.map_err(|e| match e {
            Error::IndexRead { context } => Error::Postings {
                label_name: name.to_string(),
                label_value: value.to_string(),
                context,
            },
            other => other,
        })?;

        advanced += 1;
        if advanced % CHECK_CANCELLATION_INTERVAL == 0 && cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        match filter {
            None => count += 1,
            Some(refs) => {
                cursor += refs[cursor..].partition_point(|&r| r < series_ref);
                if cursor < refs.len() && refs[cursor] == series_ref {
                    count += 1;
                }
            }
        }
    }

    Ok(count)
}
