use super::{node::ReactiveNode, AnySource};
use crate::{error::RuntimeError, runtime::NodeId};
use core::{fmt::Debug, hash::Hash};
use std::{cell::RefCell, mem, sync::Weak};

thread_local! {
    static OBSERVER: RefCell<Option<ObserverState>> = const { RefCell::new(None) };
}

#[derive(Debug)]
struct ObserverState {
    subscriber: AnySubscriber,
}

/// The current reactive observer.
///
/// The observer is whatever node is evaluating on this thread and listening
/// for the sources it reads. While a memo or effect runs, it is the
/// observer, and every signal or memo read during the run records an edge
/// to it. The observer is strictly thread-local: a computation that spawns
/// another thread does not hand its tracking frame to the child, so reads
/// from the child are untracked.
pub struct Observer;

#[derive(Debug)]
struct SetObserverOnDrop(Option<AnySubscriber>);

impl Drop for SetObserverOnDrop {
    fn drop(&mut self) {
        Observer::set(self.0.take());
    }
}

impl Observer {
    /// Returns the current observer, if any.
    pub fn get() -> Option<AnySubscriber> {
        OBSERVER.with_borrow(|obs| obs.as_ref().map(|obs| obs.subscriber.clone()))
    }

    fn take() -> SetObserverOnDrop {
        SetObserverOnDrop(
            OBSERVER.with_borrow_mut(Option::take).map(|o| o.subscriber),
        )
    }

    fn set(observer: Option<AnySubscriber>) {
        OBSERVER.with_borrow_mut(|o| {
            *o = observer.map(|subscriber| ObserverState { subscriber })
        });
    }

    fn replace(observer: AnySubscriber) -> SetObserverOnDrop {
        SetObserverOnDrop(
            OBSERVER
                .with(|o| {
                    mem::replace(
                        &mut *o.borrow_mut(),
                        Some(ObserverState {
                            subscriber: observer,
                        }),
                    )
                })
                .map(|o| o.subscriber),
        )
    }
}

/// Suspends reactive tracking while running the given function.
///
/// A node that wants to peek at a value without subscribing to it wraps the
/// read in `untrack`; the enclosing evaluation keeps running, but reads
/// inside the closure record no edges.
#[track_caller]
pub fn untrack<T>(fun: impl FnOnce() -> T) -> T {
    let _prev = Observer::take();
    fun()
}

/// Converts this type to its type-erased equivalent.
pub trait ToAnySubscriber {
    fn to_any_subscriber(&self) -> AnySubscriber;
}

/// Any type that tracks the sources it reads (a memo or an effect).
pub trait Subscriber: ReactiveNode {
    /// Records `source` as a dependency, together with the source's version
    /// at the time of the read.
    fn add_source(&self, source: AnySource, version: u64);

    /// Drops every source edge, removing `subscriber` (this node's own
    /// type-erased handle) from each source's subscriber list.
    fn clear_sources(&self, subscriber: &AnySubscriber);
}

/// A type-erased, weak reference to a subscriber node.
///
/// Subscriber edges are the weak direction of the graph: observing a source
/// never keeps the observer alive, and a source holding a dead subscriber
/// entry simply prunes it on the next notification walk.
#[derive(Clone)]
pub struct AnySubscriber(
    pub(crate) NodeId,
    pub(crate) Weak<dyn Subscriber + Send + Sync>,
);

impl AnySubscriber {
    /// The registry identity of the underlying node.
    pub fn id(&self) -> NodeId {
        self.0
    }

    pub(crate) fn upgrade(
        &self,
    ) -> Option<std::sync::Arc<dyn Subscriber + Send + Sync>> {
        self.1.upgrade()
    }
}

impl ToAnySubscriber for AnySubscriber {
    fn to_any_subscriber(&self) -> AnySubscriber {
        self.clone()
    }
}

impl Subscriber for AnySubscriber {
    fn add_source(&self, source: AnySource, version: u64) {
        if let Some(inner) = self.upgrade() {
            inner.add_source(source, version);
        }
    }

    fn clear_sources(&self, subscriber: &AnySubscriber) {
        if let Some(inner) = self.upgrade() {
            inner.clear_sources(subscriber);
        }
    }
}

impl ReactiveNode for AnySubscriber {
    fn mark_check(&self) {
        if let Some(inner) = self.upgrade() {
            inner.mark_check()
        }
    }

    fn mark_subscribers_check(&self) {
        if let Some(inner) = self.upgrade() {
            inner.mark_subscribers_check()
        }
    }

    fn update_if_necessary(&self) -> Result<(), RuntimeError> {
        match self.upgrade() {
            Some(inner) => inner.update_if_necessary(),
            None => Ok(()),
        }
    }
}

/// Runs code with some subscriber as the thread-local [`Observer`].
pub trait WithObserver {
    /// Runs the given function with this subscriber as the observer,
    /// restoring the previous observer afterwards.
    fn with_observer<T>(&self, fun: impl FnOnce() -> T) -> T;
}

impl WithObserver for AnySubscriber {
    fn with_observer<T>(&self, fun: impl FnOnce() -> T) -> T {
        let _prev = Observer::replace(self.clone());
        fun()
    }
}

impl Debug for AnySubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AnySubscriber").field(&self.0).finish()
    }
}

impl Hash for AnySubscriber {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl PartialEq for AnySubscriber {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for AnySubscriber {}
