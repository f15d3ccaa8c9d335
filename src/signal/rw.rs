use super::{
    guards::{Mapped, MappedMut, Plain, PlainMut, ReadGuard, WriteGuard},
    inner::SignalInner,
};
use crate::{
    error::{raise, RuntimeError},
    graph::{
        AnySource, AnySubscriber, ReactiveNode, Source, SubscriberSet,
        ToAnySource,
    },
    runtime::{NodeId, Runtime},
    scheduler,
    traits::{
        DefinedAt, IsDisposed, Read, ReadUntracked, Set, Track, Trigger, Write,
    },
};
use core::fmt::{Debug, Formatter};
use or_poisoned::OrPoisoned;
use std::{
    any::Any,
    hash::Hash,
    mem,
    panic::Location,
    sync::{Arc, RwLock, Weak},
};

/// A leaf source of truth holding a mutable value.
///
/// Writes are equality gated: [`Set::set`] compares the new value against
/// the current one with the signal's comparator and does nothing — no
/// version bump, no marking, no effects — when they are equal. This is the
/// property that keeps a redundant write from rippling recomputation
/// through the whole downstream graph.
///
/// The handle is an owning handle: it is cheap to clone, may be sent and
/// shared across threads (for `T: Send + Sync`), and keeps the signal
/// alive. [`Signal::downgrade`] yields a [`WeakSignal`] that does not.
pub struct Signal<T: 'static> {
    #[cfg(debug_assertions)]
    defined_at: &'static Location<'static>,
    id: NodeId,
    inner: Arc<RwLock<SignalInner<T>>>,
}

impl<T: Send + Sync + 'static> Signal<T> {
    /// Creates a signal comparing values with `==`.
    #[track_caller]
    pub fn new(value: T) -> Self
    where
        T: PartialEq,
    {
        Self::new_with_compare(value, |a, b| a == b)
    }

    /// Creates a signal with a caller-supplied equality predicate, for
    /// payloads without a meaningful `PartialEq` or where only part of the
    /// value is significant.
    #[track_caller]
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn new_with_compare(value: T, compare: fn(&T, &T) -> bool) -> Self {
        let id = Runtime::reserve();
        let inner = Arc::new(RwLock::new(SignalInner {
            id,
            value,
            pending: None,
            version: 1,
            compare,
            subscribers: SubscriberSet::new(),
            disposed: false,
        }));
        Runtime::bind(id, Arc::downgrade(&inner) as Weak<dyn Any + Send + Sync>);
        Self {
            #[cfg(debug_assertions)]
            defined_at: Location::caller(),
            id,
            inner,
        }
    }
}

impl<T: 'static> Signal<T> {
    /// The signal's identity in the runtime registry.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The signal's current version. Moves by exactly one for every
    /// accepted (non-equal) write.
    pub fn version(&self) -> u64 {
        self.inner.read().or_poisoned().version
    }

    /// The number of live subscribers currently observing this signal.
    pub fn subscriber_count(&self) -> usize {
        let subs = self.inner.read().or_poisoned().subscribers.clone();
        subs.into_iter()
            .filter(|sub| sub.upgrade().is_some())
            .count()
    }

    /// Creates a weak handle that does not keep the signal alive.
    pub fn downgrade(&self) -> WeakSignal<T> {
        WeakSignal {
            #[cfg(debug_assertions)]
            defined_at: self.defined_at,
            id: self.id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Disposes the signal: drops its subscriber edges and unregisters it.
    /// Idempotent; later reads and writes fail with
    /// [`RuntimeError::Disposed`].
    pub fn dispose(&self) {
        let _subs = {
            let mut lock = self.inner.write().or_poisoned();
            if lock.disposed {
                return;
            }
            lock.disposed = true;
            lock.pending = None;
            lock.subscribers.take()
        };
        Runtime::unregister(self.id);
    }

    /// Applies the value staged by batch writes, if it survived the
    /// equality gate against the value at batch start.
    fn commit_pending(&self) {
        let (changed, old) = {
            let mut lock = self.inner.write().or_poisoned();
            match lock.pending.take() {
                None => (false, None),
                Some(_) if lock.disposed => (false, None),
                Some(pending) => {
                    if (lock.compare)(&lock.value, &pending) {
                        (false, Some(pending))
                    } else {
                        let old = mem::replace(&mut lock.value, pending);
                        lock.version += 1;
                        (true, Some(old))
                    }
                }
            }
        };
        // The displaced value may itself own reactive handles; drop it
        // only after the signal's lock is released.
        drop(old);
        if changed {
            self.inner.mark_subscribers_check();
        }
    }
}

impl<T: Send + Sync + 'static> Set for Signal<T> {
    type Value = T;

    fn try_set(&self, value: T) -> Result<(), RuntimeError> {
        if scheduler::in_batch() {
            {
                let mut lock = self.inner.write().or_poisoned();
                if lock.disposed {
                    return Err(RuntimeError::Disposed);
                }
                lock.pending = Some(value);
            }
            let this = self.clone();
            scheduler::stage(Box::new(move || this.commit_pending()));
            return Ok(());
        }

        let mut changed = false;
        let mut old = None;
        {
            let mut lock = self.inner.write().or_poisoned();
            if lock.disposed {
                return Err(RuntimeError::Disposed);
            }
            if !(lock.compare)(&lock.value, &value) {
                old = Some(mem::replace(&mut lock.value, value));
                lock.version += 1;
                changed = true;
            }
        }
        drop(old);
        if changed {
            self.inner.mark_subscribers_check();
            scheduler::run_pass();
        }
        Ok(())
    }

    #[track_caller]
    fn set(&self, value: T) {
        self.try_set(value).unwrap_or_else(|err| raise(err));
    }
}

impl<T: Send + Sync + 'static> Trigger for Signal<T> {
    fn trigger(&self) {
        {
            let mut lock = self.inner.write().or_poisoned();
            if lock.disposed {
                return;
            }
            lock.version += 1;
        }
        if scheduler::in_batch() {
            let this = self.clone();
            scheduler::stage(Box::new(move || {
                this.inner.mark_subscribers_check()
            }));
        } else {
            self.inner.mark_subscribers_check();
            scheduler::run_pass();
        }
    }
}

impl<T: 'static> ReactiveNode for RwLock<SignalInner<T>> {
    fn mark_check(&self) {
        // a signal has no cache to invalidate; it is the origin of marks
    }

    fn mark_subscribers_check(&self) {
        let subs = self.read().or_poisoned().subscribers.clone();
        let mut dead = Vec::new();
        for sub in &subs {
            if sub.upgrade().is_some() {
                sub.mark_check();
            } else {
                dead.push(sub.clone());
            }
        }
        if !dead.is_empty() {
            let mut lock = self.write().or_poisoned();
            for sub in &dead {
                lock.subscribers.unsubscribe(sub);
            }
        }
    }

    fn update_if_necessary(&self) -> Result<(), RuntimeError> {
        // a signal is always up to date with itself
        Ok(())
    }
}

impl<T: 'static> Source for RwLock<SignalInner<T>> {
    fn current_version(&self) -> u64 {
        self.read().or_poisoned().version
    }

    fn add_subscriber(&self, subscriber: AnySubscriber) {
        self.write().or_poisoned().subscribers.subscribe(subscriber);
    }

    fn remove_subscriber(&self, subscriber: &AnySubscriber) {
        self.write().or_poisoned().subscribers.unsubscribe(subscriber);
    }

    fn clear_subscribers(&self) {
        let _taken = self.write().or_poisoned().subscribers.take();
    }
}

impl<T: 'static> ReactiveNode for Signal<T> {
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

impl<T: 'static> Source for Signal<T> {
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

impl<T: Send + Sync + 'static> ToAnySource for Signal<T> {
    fn to_any_source(&self) -> AnySource {
        AnySource(
            self.id,
            Arc::clone(&self.inner) as Arc<dyn Source + Send + Sync>,
        )
    }
}

impl<T: Send + Sync + 'static> ReadUntracked for Signal<T> {
    type Value = ReadGuard<T, Mapped<Plain<SignalInner<T>>, T>>;

    fn try_read_untracked(&self) -> Result<Self::Value, RuntimeError> {
        let guard = Plain::try_new(Arc::clone(&self.inner))
            .ok_or(RuntimeError::Disposed)?;
        if guard.disposed {
            return Err(RuntimeError::Disposed);
        }
        Ok(ReadGuard::new(Mapped::new_with_guard(guard, |inner| {
            &inner.value
        })))
    }
}

impl<T: Send + Sync + 'static> Read for Signal<T> {
    type Value = <Self as ReadUntracked>::Value;

    fn try_read(&self) -> Result<Self::Value, RuntimeError> {
        self.track();
        self.try_read_untracked()
    }
}

impl<T: Send + Sync + 'static> Write for Signal<T> {
    type Value = T;
    type UntrackedGuard = MappedMut<PlainMut<SignalInner<T>>, T>;

    fn try_write(
        &self,
    ) -> Result<WriteGuard<'_, Self, Self::UntrackedGuard>, RuntimeError> {
        Ok(WriteGuard::new(self, self.try_write_untracked()?))
    }

    fn try_write_untracked(
        &self,
    ) -> Result<Self::UntrackedGuard, RuntimeError> {
        let guard = PlainMut::try_new(Arc::clone(&self.inner))
            .ok_or(RuntimeError::Disposed)?;
        if guard.disposed {
            return Err(RuntimeError::Disposed);
        }
        Ok(MappedMut::new_with_guard(
            guard,
            |inner| &inner.value,
            |inner| &mut inner.value,
        ))
    }
}

impl<T: 'static> DefinedAt for Signal<T> {
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

impl<T: 'static> IsDisposed for Signal<T> {
    fn is_disposed(&self) -> bool {
        self.inner.read().or_poisoned().disposed
    }
}

impl<T: 'static> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            #[cfg(debug_assertions)]
            defined_at: self.defined_at,
            id: self.id,
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: 'static> Debug for Signal<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Signal")
            .field("type", &std::any::type_name::<T>())
            .field("id", &self.id)
            .finish()
    }
}

impl<T: 'static> PartialEq for Signal<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: 'static> Eq for Signal<T> {}

impl<T: 'static> Hash for Signal<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::ptr::hash(Arc::as_ptr(&self.inner), state);
    }
}

/// A handle that observes a [`Signal`] without keeping it alive.
pub struct WeakSignal<T: 'static> {
    #[cfg(debug_assertions)]
    defined_at: &'static Location<'static>,
    id: NodeId,
    inner: Weak<RwLock<SignalInner<T>>>,
}

impl<T: 'static> WeakSignal<T> {
    /// The identity of the signal this handle pointed to.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Recovers an owning handle, failing with [`RuntimeError::Gone`] once
    /// the signal has been dropped.
    pub fn upgrade(&self) -> Result<Signal<T>, RuntimeError> {
        self.inner
            .upgrade()
            .map(|inner| Signal {
                #[cfg(debug_assertions)]
                defined_at: self.defined_at,
                id: self.id,
                inner,
            })
            .ok_or(RuntimeError::Gone)
    }
}

impl<T: 'static> Clone for WeakSignal<T> {
    fn clone(&self) -> Self {
        Self {
            #[cfg(debug_assertions)]
            defined_at: self.defined_at,
            id: self.id,
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<T: 'static> Debug for WeakSignal<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WeakSignal").field("id", &self.id).finish()
    }
}
