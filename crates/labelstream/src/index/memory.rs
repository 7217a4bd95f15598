//! A thread-safe in-memory label index.
//!
//! [`MemIndex`] keeps an inverted index of `name -> value -> postings` in
//! sorted maps, so label names come back sorted and postings are strictly
//! increasing without extra work. Series are appended behind a
//! [`parking_lot::RwLock`] and can be added while readers are active.

use super::{IndexReader, Postings, SeriesRef, postings_from_sorted, resolver};
use crate::{Matcher, Result};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Default)]
struct Inner {
    /// Label pairs of every series, indexed by [`SeriesRef`].
    series: Vec<Vec<(String, String)>>,
    postings: BTreeMap<String, BTreeMap<String, Vec<SeriesRef>>>,
}

/// In-memory index mapping label pairs to series postings.
#[derive(Debug, Default)]
pub struct MemIndex {
    inner: RwLock<Inner>,
}

impl MemIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a series and returns its reference.
    ///
    /// Pairs with an empty value are ignored, matching the convention that an
    /// empty value is the same as the label being absent. Duplicate names keep
    /// the last value.
    pub fn add_series<N, V>(&self, labels: &[(N, V)]) -> SeriesRef
    where
        N: AsRef<str>,
        V: AsRef<str>,
    {
        let mut pairs: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in labels {
            let (name, value) = (name.as_ref(), value.as_ref());
            if !value.is_empty() {
                pairs.insert(name.to_string(), value.to_string());
            }
        }

        let mut inner = self.inner.write();
        let series_ref = inner.series.len() as SeriesRef;
        for (name, value) in &pairs {
            inner
                .postings
                .entry(name.clone())
                .or_default()
                .entry(value.clone())
                .or_default()
                .push(series_ref);
        }
        inner.series.push(pairs.into_iter().collect());
        series_ref
    }

    pub fn series_count(&self) -> usize {
        self.inner.read().series.len()
    }

    /// Series matching `matchers`, or `None` when every series qualifies.
    fn matching_series(&self, matchers: &[Matcher]) -> Result<Option<Vec<SeriesRef>>> {
        if matchers.is_empty() {
            return Ok(None);
        }
        let postings = resolver::postings_for_matchers(self, matchers)?;
        resolver::collect_postings(postings).map(Some)
    }
}

impl IndexReader for MemIndex {
    fn label_names(&self, matchers: &[Matcher]) -> Result<Vec<String>> {
        let Some(refs) = self.matching_series(matchers)? else {
            return Ok(self.inner.read().postings.keys().cloned().collect());
        };

        let inner = self.inner.read();
        let names: BTreeSet<&String> = refs
            .iter()
            .filter_map(|&r| inner.series.get(r as usize))
            .flat_map(|labels| labels.iter().map(|(name, _)| name))
            .collect();
        Ok(names.into_iter().cloned().collect())
    }

    fn label_values(&self, name: &str, matchers: &[Matcher]) -> Result<Vec<String>> {
        let Some(refs) = self.matching_series(matchers)? else {
            return Ok(self
                .inner
                .read()
                .postings
                .get(name)
                .map(|values| values.keys().cloned().collect())
                .unwrap_or_default());
        };

        let inner = self.inner.read();
        let values: BTreeSet<&String> = refs
            .iter()
            .filter_map(|&r| inner.series.get(r as usize))
            .filter_map(|labels| labels.iter().find(|(n, _)| n == name).map(|(_, v)| v))
            .collect();
        Ok(values.into_iter().cloned().collect())
    }

    fn postings(&self, name: &str, value: &str) -> Result<Postings> {
        let refs = self
            .inner
            .read()
            .postings
            .get(name)
            .and_then(|values| values.get(value))
            .cloned()
            .unwrap_or_default();
        Ok(postings_from_sorted(refs))
    }

    fn all_postings(&self) -> Result<Postings> {
        let count = self.inner.read().series.len() as SeriesRef;
        Ok(Box::new((0..count).map(Ok)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MatchKind, index::resolver::collect_postings};
    use std::sync::Arc;

    fn fixture() -> MemIndex {
        let index = MemIndex::new();
        index.add_series(&[("__name__", "up"), ("job", "api"), ("instance", "a")]);
        index.add_series(&[("__name__", "up"), ("job", "api"), ("instance", "b")]);
        index.add_series(&[("__name__", "up"), ("job", "db"), ("instance", "c")]);
        index.add_series(&[("__name__", "errors"), ("job", "api"), ("code", "500")]);
        index
    }

    #[test]
    fn label_names_are_sorted() {
        let index = fixture();
        assert_eq!(
            index.label_names(&[]).unwrap(),
            vec!["__name__", "code", "instance", "job"]
        );
    }

    #[test]
    fn label_names_respect_matchers() {
        let index = fixture();
        let names = index.label_names(&[Matcher::equal("__name__", "up")]).unwrap();
        assert_eq!(names, vec!["__name__", "instance", "job"]);
    }

    #[test]
    fn label_values_respect_matchers() {
        let index = fixture();
        assert_eq!(index.label_values("job", &[]).unwrap(), vec!["api", "db"]);

        let matchers = [Matcher::new(MatchKind::Regex, "instance", "a|c").unwrap()];
        assert_eq!(index.label_values("job", &matchers).unwrap(), vec!["api", "db"]);

        let matchers = [Matcher::equal("__name__", "errors")];
        assert_eq!(index.label_values("job", &matchers).unwrap(), vec!["api"]);
        assert!(index.label_values("instance", &matchers).unwrap().is_empty());
    }

    #[test]
    fn unknown_pairs_have_empty_postings() {
        let index = fixture();
        assert!(collect_postings(index.postings("job", "web").unwrap()).unwrap().is_empty());
        assert!(collect_postings(index.postings("nope", "x").unwrap()).unwrap().is_empty());
        assert!(index.label_values("nope", &[]).unwrap().is_empty());
    }

    #[test]
    fn empty_values_are_not_indexed() {
        let index = MemIndex::new();
        let r = index.add_series(&[("job", "api"), ("env", "")]);
        assert_eq!(r, 0);
        assert_eq!(index.label_names(&[]).unwrap(), vec!["job"]);
    }

    #[test]
    fn concurrent_writers_assign_unique_refs() {
        let index = Arc::new(MemIndex::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let index = Arc::clone(&index);
                std::thread::spawn(move || {
                    for i in 0..250 {
                        index.add_series(&[("thread", t.to_string()), ("i", i.to_string())]);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(index.series_count(), 1000);
        let all = collect_postings(index.all_postings().unwrap()).unwrap();
        assert_eq!(all, (0..1000).collect::<Vec<_>>());
        for t in 0..4 {
            let refs = collect_postings(index.postings("thread", &t.to_string()).unwrap()).unwrap();
            assert_eq!(refs.len(), 250);
            assert!(refs.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
