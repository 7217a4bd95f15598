//! Matcher-driven postings resolution.
//!
//! [`PostingsResolver`] is the seam the cardinality pipeline uses to turn a
//! matcher set into postings. Any closure with the right shape is a resolver,
//! which keeps tests free to return synthetic postings. [`MatcherResolver`] is
//! the default and works against any [`IndexReader`].

use super::{IndexReader, Postings, SeriesRef, postings_from_sorted};
use crate::{MatchKind, Matcher, Result};

/// Resolves a matcher conjunction into the postings of matching series.
pub trait PostingsResolver<I: ?Sized>: Send + Sync {
    fn resolve(&self, index: &I, matchers: &[Matcher]) -> Result<Postings>;
}

impl<I, F> PostingsResolver<I> for F
where
    I: ?Sized,
    F: Fn(&I, &[Matcher]) -> Result<Postings> + Send + Sync,
{
    fn resolve(&self, index: &I, matchers: &[Matcher]) -> Result<Postings> {
        self(index, matchers)
    }
}

/// Default resolver backed by [`postings_for_matchers`].
#[derive(Clone, Copy, Debug, Default)]
pub struct MatcherResolver;

impl<I: IndexReader + ?Sized> PostingsResolver<I> for MatcherResolver {
    fn resolve(&self, index: &I, matchers: &[Matcher]) -> Result<Postings> {
        postings_for_matchers(index, matchers)
    }
}

/// Computes the postings of series matching every matcher in `matchers`.
///
/// Matchers that reject the empty string select the union of postings of their
/// matching values and are intersected first. Matchers that accept the empty
/// string also select series lacking the label, so they are applied last by
/// removing the postings of the values they reject. An empty matcher set
/// selects all series.
pub fn postings_for_matchers<I: IndexReader + ?Sized>(
    index: &I,
    matchers: &[Matcher],
) -> Result<Postings> {
    let (subtractive, selective): (Vec<&Matcher>, Vec<&Matcher>) =
        matchers.iter().partition(|m| m.matches_empty());

    let mut selected: Option<Vec<SeriesRef>> = None;
    for matcher in selective {
        let refs = if matcher.kind() == MatchKind::Equal {
            collect_postings(index.postings(matcher.name(), matcher.value())?)?
        } else {
            union_of_values(index, matcher.name(), |v| matcher.matches(v))?
        };

        let next = match selected {
            None => refs,
            Some(prev) => intersect_postings(&prev, &refs),
        };
        if next.is_empty() {
            return Ok(postings_from_sorted(Vec::new()));
        }
        selected = Some(next);
    }

    let mut selected = match selected {
        Some(refs) => refs,
        None => collect_postings(index.all_postings()?)?,
    };

    for matcher in subtractive {
        let rejected = union_of_values(index, matcher.name(), |v| !matcher.matches(v))?;
        selected = subtract_postings(&selected, &rejected);
    }

    Ok(postings_from_sorted(selected))
}

/// Drains a postings iterator, stopping at its terminal error.
pub fn collect_postings(postings: Postings) -> Result<Vec<SeriesRef>> {
    postings.collect()
}

fn union_of_values<I, P>(index: &I, name: &str, mut keep: P) -> Result<Vec<SeriesRef>>
where
    I: IndexReader + ?Sized,
    P: FnMut(&str) -> bool,
{
    let mut lists = Vec::new();
    for value in index.label_values(name, &[])? {
        if keep(&value) {
            lists.push(collect_postings(index.postings(name, &value)?)?);
        }
    }
    Ok(merge_postings(lists))
}

/// Union of several sorted reference lists.
pub fn merge_postings(lists: Vec<Vec<SeriesRef>>) -> Vec<SeriesRef> {
    let mut merged: Vec<SeriesRef> = lists.into_iter().flatten().collect();
    merged.sort_unstable();
    merged.dedup();
    merged
}

/// Intersection of two sorted reference lists.
pub fn intersect_postings(a: &[SeriesRef], b: &[SeriesRef]) -> Vec<SeriesRef> {
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            core::cmp::Ordering::Less => i += 1,
            core::cmp::Ordering::Greater => j += 1,
            core::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

/// References in `a` that are not in `b`. Both inputs must be sorted.
pub fn subtract_postings(a: &[SeriesRef], b: &[SeriesRef]) -> Vec<SeriesRef> {
    let mut out = Vec::with_capacity(a.len());
    let mut j = 0;
    for &r in a {
        while j < b.len() && b[j] < r {
            j += 1;
        }
        if j >= b.len() || b[j] != r {
            out.push(r);
        }
    }
    out
}
