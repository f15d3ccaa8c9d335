use super::inner::MemoInner;
use crate::{
    error::RuntimeError,
    graph::{
        AnySource, AnySubscriber, ReactiveNode, ReactiveNodeState, Source,
        Subscriber, ToAnySource, ToAnySubscriber,
    },
    runtime::{NodeId, Runtime},
    signal::{Mapped, Plain, ReadGuard},
    traits::{DefinedAt, IsDisposed, Read, ReadUntracked, Track},
};
use core::fmt::{Debug, Formatter};
use or_poisoned::OrPoisoned;
use std::{
    any::Any,
    hash::Hash,
    panic::Location,
    sync::{Arc, RwLock, Weak},
};

/// A cached derived value.
///
/// A memo is lazy: its computation does not run until the first read, and
/// a read only recomputes when a source it read last time has actually
/// changed. In between, a signal write pushes a cheap `Check` mark through
/// the graph, and the next read pulls recomputation up exactly as far as
/// the sources whose values moved — push-pull dirty checking.
///
/// A memo whose recomputation produces an equal value (per its comparator)
/// keeps its version, so downstream subscribers short-circuit without
/// running.
pub struct Memo<T: 'static> {
    #[cfg(debug_assertions)]
    defined_at: &'static Location<'static>,
    id: NodeId,
    inner: Arc<RwLock<MemoInner<T>>>,
}

impl<T: Send + Sync + 'static> Memo<T> {
    /// Creates a memo comparing values with `==`. The computation receives
    /// the previously cached value, if any.
    #[track_caller]
    pub fn new(fun: impl Fn(Option<&T>) -> T + Send + Sync + 'static) -> Self
    where
        T: PartialEq,
    {
        Self::new_with_compare(fun, |a, b| a == b)
    }

    /// Creates a memo with a caller-supplied equality predicate.
    #[track_caller]
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn new_with_compare(
        fun: impl Fn(Option<&T>) -> T + Send + Sync + 'static,
        compare_with: fn(Option<&T>, Option<&T>) -> bool,
    ) -> Self {
        let id = Runtime::reserve();
        let inner = Arc::new_cyclic(|weak| {
            let any_subscriber = AnySubscriber(
                id,
                Weak::clone(weak) as Weak<dyn Subscriber + Send + Sync>,
            );
            RwLock::new(MemoInner::new(
                id,
                Arc::new(fun),
                compare_with,
                any_subscriber,
            ))
        });
        Runtime::bind(id, Arc::downgrade(&inner) as Weak<dyn Any + Send + Sync>);
        Self {
            #[cfg(debug_assertions)]
            defined_at: Location::caller(),
            id,
            inner,
        }
    }
}

impl<T: 'static> Memo<T> {
    /// The memo's identity in the runtime registry.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The memo's current version: moves by one for each recomputation
    /// whose result compared unequal to the previous cache, and for each
    /// cached failure.
    pub fn version(&self) -> u64 {
        self.inner.read().or_poisoned().version
    }

    /// The number of sources recorded during the last evaluation.
    pub fn source_count(&self) -> usize {
        self.inner.read().or_poisoned().sources.len()
    }

    /// The number of live subscribers currently observing this memo.
    pub fn subscriber_count(&self) -> usize {
        let subs = self.inner.read().or_poisoned().subscribers.clone();
        subs.into_iter()
            .filter(|sub| sub.upgrade().is_some())
            .count()
    }

    /// Creates a weak handle that does not keep the memo alive.
    pub fn downgrade(&self) -> WeakMemo<T> {
        WeakMemo {
            #[cfg(debug_assertions)]
            defined_at: self.defined_at,
            id: self.id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Disposes the memo: drops its cache and both edge directions, and
    /// unregisters it. Idempotent; later reads fail with
    /// [`RuntimeError::Disposed`].
    pub fn dispose(&self) {
        let (sources, subscriber, _subs) = {
            let mut lock = self.inner.write().or_poisoned();
            if lock.state == ReactiveNodeState::Disposed {
                return;
            }
            lock.state = ReactiveNodeState::Disposed;
            lock.value = None;
            lock.error = None;
            (
                lock.sources.take(),
                lock.any_subscriber.clone(),
                lock.subscribers.take(),
            )
        };
        for (source, _) in sources.iter() {
            source.remove_subscriber(&subscriber);
        }
        drop(sources);
        Runtime::unregister(self.id);
    }
}

impl<T: Send + Sync + 'static> ReactiveNode for Memo<T> {
    fn mark_check(&self) {
        self.inner.mark_check();
    }

    fn mark_subscribers_check(&self) {
        self.inner.mark_subscribers_check();
    }

    fn update_if_necessary(&self) -> Result<(), RuntimeError> {
        self.inner.update_if_necessary()
    }
}

impl<T: Send + Sync + 'static> Source for Memo<T> {
    fn current_version(&self) -> u64 {
        self.inner.current_version()
    }

    fn add_subscriber(&self, subscriber: AnySubscriber) {
        self.inner.add_subscriber(subscriber);
    }

    fn remove_subscriber(&self, subscriber: &AnySubscriber) {
        self.inner.remove_subscriber(subscriber);
    }

    fn clear_subscribers(&self) {
        self.inner.clear_subscribers();
    }
}

impl<T: Send + Sync + 'static> ToAnySource for Memo<T> {
    fn to_any_source(&self) -> AnySource {
        AnySource(
            self.id,
            Arc::clone(&self.inner) as Arc<dyn Source + Send + Sync>,
        )
    }
}

impl<T: Send + Sync + 'static> ToAnySubscriber for Memo<T> {
    fn to_any_subscriber(&self) -> AnySubscriber {
        AnySubscriber(
            self.id,
            Arc::downgrade(&self.inner) as Weak<dyn Subscriber + Send + Sync>,
        )
    }
}

impl<T: Send + Sync + 'static> Subscriber for Memo<T> {
    fn add_source(&self, source: AnySource, version: u64) {
        self.inner.add_source(source, version);
    }

    fn clear_sources(&self, subscriber: &AnySubscriber) {
        self.inner.clear_sources(subscriber);
    }
}

impl<T: Send + Sync + 'static> ReadUntracked for Memo<T> {
    type Value = ReadGuard<T, Mapped<Plain<MemoInner<T>>, T>>;

    fn try_read_untracked(&self) -> Result<Self::Value, RuntimeError> {
        // Even an untracked peek revalidates: a stale cache must never be
        // observable after a write.
        self.inner.update_if_necessary()?;
        let guard = Plain::try_new(Arc::clone(&self.inner))
            .ok_or(RuntimeError::Disposed)?;
        if let Some(err) = &guard.error {
            return Err(err.clone());
        }
        if guard.value.is_none() {
            return Err(RuntimeError::Disposed);
        }
        Ok(ReadGuard::new(Mapped::new_with_guard(guard, |inner| {
            inner
                .value
                .as_ref()
                .expect("memo revalidated before the guard was taken")
        })))
    }
}

impl<T: Send + Sync + 'static> Read for Memo<T> {
    type Value = <Self as ReadUntracked>::Value;

    fn try_read(&self) -> Result<Self::Value, RuntimeError> {
        // Revalidate before tracking, so the observer records the version
        // the returned value actually corresponds to.
        self.inner.update_if_necessary()?;
        self.track();
        self.try_read_untracked()
    }
}

impl<T: 'static> DefinedAt for Memo<T> {
    #[inline(always)]
    fn defined_at(&self) -> Option<&'static Location<'static>> {
        #[cfg(debug_assertions)]
        {
            Some(self.defined_at)
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    }
}

impl<T: 'static> IsDisposed for Memo<T> {
    fn is_disposed(&self) -> bool {
        self.inner.read().or_poisoned().state == ReactiveNodeState::Disposed
    }
}

impl<T: 'static> Clone for Memo<T> {
    fn clone(&self) -> Self {
        Self {
            #[cfg(debug_assertions)]
            defined_at: self.defined_at,
            id: self.id,
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: 'static> Debug for Memo<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Memo")
            .field("type", &std::any::type_name::<T>())
            .field("id", &self.id)
            .finish()
    }
}

impl<T: 'static> PartialEq for Memo<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: 'static> Eq for Memo<T> {}

impl<T: 'static> Hash for Memo<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::ptr::hash(Arc::as_ptr(&self.inner), state);
    }
}

/// A handle that refers to a [`Memo`] without keeping it alive.
pub struct WeakMemo<T: 'static> {
    #[cfg(debug_assertions)]
    defined_at: &'static Location<'static>,
    id: NodeId,
    inner: Weak<RwLock<MemoInner<T>>>,
}

impl<T: 'static> WeakMemo<T> {
    /// The identity of the memo this handle pointed to.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Recovers an owning handle, failing with [`RuntimeError::Gone`] once
    /// the memo has been dropped.
    pub fn upgrade(&self) -> Result<Memo<T>, RuntimeError> {
        self.inner
            .upgrade()
            .map(|inner| Memo {
                #[cfg(debug_assertions)]
                defined_at: self.defined_at,
                id: self.id,
                inner,
            })
            .ok_or(RuntimeError::Gone)
    }
}

impl<T: 'static> Clone for WeakMemo<T> {
    fn clone(&self) -> Self {
        Self {
            #[cfg(debug_assertions)]
            defined_at: self.defined_at,
            id: self.id,
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<T: 'static> Debug for WeakMemo<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WeakMemo").field("id", &self.id).finish()
    }
}
