use super::{node::ReactiveNode, AnySubscriber};
use crate::{error::RuntimeError, runtime::NodeId};
use core::{fmt::Debug, hash::Hash};
use std::sync::Arc;

/// Converts this type to its type-erased equivalent.
pub trait ToAnySource {
    fn to_any_source(&self) -> AnySource;
}

/// Describes the behavior of any source of reactivity (a signal or a memo).
pub trait Source: ReactiveNode {
    /// The source's version: a counter that moves exactly when the source's
    /// value changes as judged by its comparator. Subscribers record it at
    /// read time and compare it during reconciliation to decide whether
    /// "maybe changed" was "actually changed."
    fn current_version(&self) -> u64;

    /// Adds a subscriber to this source's list of dependents.
    fn add_subscriber(&self, subscriber: AnySubscriber);

    /// Removes a subscriber from this source's list of dependents.
    fn remove_subscriber(&self, subscriber: &AnySubscriber);

    /// Removes all subscribers from this source's list of dependents.
    fn clear_subscribers(&self);
}

/// A type-erased reference to a source node.
///
/// This is the owning direction of a dependency edge: a subscriber's source
/// set keeps the producers it read alive. The reverse subscriber edges are
/// weak, so the graph never forms a strong cycle.
#[derive(Clone)]
pub struct AnySource(
    pub(crate) NodeId,
    pub(crate) Arc<dyn Source + Send + Sync>,
);

impl AnySource {
    /// The registry identity of the underlying node.
    pub fn id(&self) -> NodeId {
        self.0
    }
}

impl Debug for AnySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AnySource").field(&self.0).finish()
    }
}

impl Hash for AnySource {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl PartialEq for AnySource {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for AnySource {}

impl ToAnySource for AnySource {
    fn to_any_source(&self) -> AnySource {
        self.clone()
    }
}

impl Source for AnySource {
    fn current_version(&self) -> u64 {
        self.1.current_version()
    }

    fn add_subscriber(&self, subscriber: AnySubscriber) {
        self.1.add_subscriber(subscriber);
    }

    fn remove_subscriber(&self, subscriber: &AnySubscriber) {
        self.1.remove_subscriber(subscriber);
    }

    fn clear_subscribers(&self) {
        self.1.clear_subscribers();
    }
}

impl ReactiveNode for AnySource {
    fn mark_check(&self) {
        self.1.mark_check();
    }

    fn mark_subscribers_check(&self) {
        self.1.mark_subscribers_check();
    }

    fn update_if_necessary(&self) -> Result<(), RuntimeError> {
        self.1.update_if_necessary()
    }
}
