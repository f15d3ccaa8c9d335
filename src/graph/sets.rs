//! The per-node halves of the dependency-edge relation.
//!
//! Both sets are insertion-ordered linear maps over small hashed indices:
//! the M:N relation between sources and subscribers usually involves a
//! handful of nodes, and insertion order is observable (effects re-run in
//! the order their sources notified them).

use super::{AnySource, AnySubscriber, Source};
use indexmap::{IndexMap, IndexSet};
use rustc_hash::FxHasher;
use std::{hash::BuildHasherDefault, mem};

type FxIndexMap<K, V> = IndexMap<K, V, BuildHasherDefault<FxHasher>>;
type FxIndexSet<T> = IndexSet<T, BuildHasherDefault<FxHasher>>;

/// The sources a subscriber read during its last evaluation, each paired
/// with the version the source reported at read time. The recorded version
/// is what lets reconciliation distinguish "a transitive input was written"
/// from "this exact input's value changed."
#[derive(Default, Clone, Debug)]
pub struct SourceSet(FxIndexMap<AnySource, u64>);

impl SourceSet {
    pub fn new() -> Self {
        Self(Default::default())
    }

    /// Records `source` at `version`. Re-reading a source within one
    /// evaluation refreshes the recorded version in place.
    pub fn insert(&mut self, source: AnySource, version: u64) {
        self.0.insert(source, version);
    }

    pub fn take(&mut self) -> SourceSet {
        Self(mem::take(&mut self.0))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, source: &AnySource) -> bool {
        self.0.contains_key(source)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AnySource, u64)> {
        self.0.iter().map(|(source, version)| (source, *version))
    }

    /// Sources present in `self` but absent from `newer`: the edges a
    /// re-evaluation dropped, whose subscriber backlinks must be removed.
    pub fn difference(&self, newer: &SourceSet) -> Vec<AnySource> {
        self.0
            .keys()
            .filter(|source| !newer.contains(source))
            .cloned()
            .collect()
    }

    /// Folds `older` entries into `self` without overwriting entries that
    /// are already present. Used after a failed evaluation so the node
    /// stays subscribed to everything it was watching before.
    pub fn merge_missing(&mut self, older: SourceSet) {
        for (source, version) in older.0 {
            self.0.entry(source).or_insert(version);
        }
    }

    /// Drops every edge, removing `subscriber` from each source.
    pub fn clear_sources(&mut self, subscriber: &AnySubscriber) {
        for (source, _) in mem::take(&mut self.0) {
            source.remove_subscriber(subscriber);
        }
    }
}

impl IntoIterator for SourceSet {
    type Item = (AnySource, u64);
    type IntoIter = <FxIndexMap<AnySource, u64> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// The subscribers observing a source, held weakly.
#[derive(Debug, Default, Clone)]
pub struct SubscriberSet(FxIndexSet<AnySubscriber>);

impl SubscriberSet {
    pub fn new() -> Self {
        Self(FxIndexSet::with_capacity_and_hasher(2, Default::default()))
    }

    pub fn subscribe(&mut self, subscriber: AnySubscriber) {
        self.0.insert(subscriber);
    }

    pub fn unsubscribe(&mut self, subscriber: &AnySubscriber) {
        // `shift_remove`, not `swap_remove`: notification order must stay
        // the order in which subscribers first appeared, or nested
        // observers that rely on an outer observer having already run
        // would fire out of order.
        self.0.shift_remove(subscriber);
    }

    pub fn take(&mut self) -> SubscriberSet {
        Self(mem::take(&mut self.0))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl IntoIterator for SubscriberSet {
    type Item = AnySubscriber;
    type IntoIter = <FxIndexSet<AnySubscriber> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a SubscriberSet {
    type Item = &'a AnySubscriber;
    type IntoIter = <&'a FxIndexSet<AnySubscriber> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
