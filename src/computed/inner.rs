use crate::{
    error::{error_from_panic, RuntimeError},
    graph::{
        AnySource, AnySubscriber, ReactiveNode, ReactiveNodeState, Source,
        SourceSet, Subscriber, SubscriberSet, WithObserver,
    },
    runtime::{NodeId, Runtime},
};
use or_poisoned::OrPoisoned;
use std::{
    fmt::Debug,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{Arc, RwLock},
    thread::{self, ThreadId},
};

pub struct MemoInner<T> {
    pub(crate) id: NodeId,
    #[allow(clippy::type_complexity)]
    pub(crate) fun: Arc<dyn Fn(Option<&T>) -> T + Send + Sync>,
    pub(crate) value: Option<T>,
    /// A cached evaluation failure. Re-raised on every read until an
    /// upstream change triggers a retry.
    pub(crate) error: Option<RuntimeError>,
    pub(crate) compare_with: fn(Option<&T>, Option<&T>) -> bool,
    pub(crate) version: u64,
    pub(crate) state: ReactiveNodeState,
    /// Which thread is evaluating, while `state` is `Running`. Re-entry
    /// from the same thread is a cycle; another thread just waits.
    pub(crate) running_on: Option<ThreadId>,
    /// Set when a mark arrives mid-evaluation, so the node re-enters
    /// `Check` instead of `Clean` once the evaluation finishes.
    pub(crate) marked_while_running: bool,
    pub(crate) sources: SourceSet,
    pub(crate) subscribers: SubscriberSet,
    pub(crate) any_subscriber: AnySubscriber,
}

impl<T> Debug for MemoInner<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoInner").finish_non_exhaustive()
    }
}

impl<T> Drop for MemoInner<T> {
    fn drop(&mut self) {
        Runtime::unregister(self.id);
    }
}

impl<T: Send + Sync + 'static> MemoInner<T> {
    #[allow(clippy::type_complexity)]
    pub(crate) fn new(
        id: NodeId,
        fun: Arc<dyn Fn(Option<&T>) -> T + Send + Sync>,
        compare_with: fn(Option<&T>, Option<&T>) -> bool,
        any_subscriber: AnySubscriber,
    ) -> Self {
        Self {
            id,
            fun,
            value: None,
            error: None,
            compare_with,
            version: 0,
            state: ReactiveNodeState::Dirty,
            running_on: None,
            marked_while_running: false,
            sources: SourceSet::new(),
            subscribers: SubscriberSet::new(),
            any_subscriber,
        }
    }
}

impl<T: Send + Sync + 'static> ReactiveNode for RwLock<MemoInner<T>> {
    fn mark_check(&self) {
        {
            let mut lock = self.write().or_poisoned();
            match lock.state {
                ReactiveNodeState::Disposed => return,
                ReactiveNodeState::Running => {
                    lock.marked_while_running = true;
                }
                ReactiveNodeState::Clean => {
                    lock.state = ReactiveNodeState::Check;
                }
                ReactiveNodeState::Check | ReactiveNodeState::Dirty => {}
            }
        }
        // Marks propagate unconditionally (the graph is acyclic, so the
        // walk terminates): an effect that was dequeued mid-pass must be
        // re-enqueued even when the memos between it and the written
        // signal were already marked.
        self.mark_subscribers_check();
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
        loop {
            // Phase 1: snapshot, then bring the recorded sources up to
            // date without holding this node's lock (reconciling them may
            // run arbitrary user computations).
            let (prior_state, sources) = {
                let lock = self.read().or_poisoned();
                match lock.state {
                    ReactiveNodeState::Running => {
                        if lock.running_on == Some(thread::current().id()) {
                            return Err(RuntimeError::Cycle);
                        }
                        drop(lock);
                        thread::yield_now();
                        continue;
                    }
                    ReactiveNodeState::Disposed => {
                        return Err(RuntimeError::Disposed)
                    }
                    ReactiveNodeState::Clean => return Ok(()),
                    state => (state, lock.sources.clone()),
                }
            };

            if prior_state == ReactiveNodeState::Check {
                for (source, _) in sources.iter() {
                    source.update_if_necessary()?;
                }
            }

            // Phase 2: with the sources settled, decide under the write
            // lock whether the recorded versions still hold.
            let (fun, prev_value, compare_with, any_subscriber, prev_sources) = {
                let mut lock = self.write().or_poisoned();
                match lock.state {
                    ReactiveNodeState::Running => {
                        drop(lock);
                        thread::yield_now();
                        continue;
                    }
                    ReactiveNodeState::Disposed => {
                        return Err(RuntimeError::Disposed)
                    }
                    ReactiveNodeState::Clean => return Ok(()),
                    ReactiveNodeState::Check => {
                        let stale = lock.sources.iter().any(
                            |(source, recorded)| {
                                source.current_version() != recorded
                            },
                        );
                        if !stale {
                            lock.state = ReactiveNodeState::Clean;
                            return Ok(());
                        }
                    }
                    ReactiveNodeState::Dirty => {}
                }
                lock.state = ReactiveNodeState::Running;
                lock.running_on = Some(thread::current().id());
                lock.marked_while_running = false;
                (
                    Arc::clone(&lock.fun),
                    lock.value.take(),
                    lock.compare_with,
                    lock.any_subscriber.clone(),
                    lock.sources.take(),
                )
            };

            // Evaluate with this node as the observer; new source edges
            // accumulate in `sources` as the computation reads them.
            let result = catch_unwind(AssertUnwindSafe(|| {
                any_subscriber.with_observer(|| fun(prev_value.as_ref()))
            }));

            return match result {
                Ok(new_value) => self.finish_evaluation(
                    new_value,
                    prev_value,
                    compare_with,
                    &any_subscriber,
                    prev_sources,
                ),
                Err(payload) => self.fail_evaluation(
                    error_from_panic(payload),
                    prior_state,
                    prev_value,
                    &any_subscriber,
                    prev_sources,
                ),
            };
        }
    }
}

trait MemoEvaluation<T> {
    fn finish_evaluation(
        &self,
        new_value: T,
        prev_value: Option<T>,
        compare_with: fn(Option<&T>, Option<&T>) -> bool,
        any_subscriber: &AnySubscriber,
        prev_sources: SourceSet,
    ) -> Result<(), RuntimeError>;

    fn fail_evaluation(
        &self,
        err: RuntimeError,
        prior_state: ReactiveNodeState,
        prev_value: Option<T>,
        any_subscriber: &AnySubscriber,
        prev_sources: SourceSet,
    ) -> Result<(), RuntimeError>;

    fn abort_disposed(
        &self,
        any_subscriber: &AnySubscriber,
        prev_sources: SourceSet,
    );
}

impl<T: Send + Sync + 'static> MemoEvaluation<T> for RwLock<MemoInner<T>> {
    fn finish_evaluation(
        &self,
        new_value: T,
        prev_value: Option<T>,
        compare_with: fn(Option<&T>, Option<&T>) -> bool,
        any_subscriber: &AnySubscriber,
        prev_sources: SourceSet,
    ) -> Result<(), RuntimeError> {
        let changed = !compare_with(Some(&new_value), prev_value.as_ref());
        let removed = {
            let mut lock = self.write().or_poisoned();
            if lock.state == ReactiveNodeState::Disposed {
                drop(lock);
                self.abort_disposed(any_subscriber, prev_sources);
                return Err(RuntimeError::Disposed);
            }
            lock.value = Some(new_value);
            lock.error = None;
            if changed {
                lock.version += 1;
            }
            lock.state = if lock.marked_while_running {
                // A write landed while we were evaluating; stay suspect so
                // the next read reconciles again.
                ReactiveNodeState::Check
            } else {
                ReactiveNodeState::Clean
            };
            lock.marked_while_running = false;
            lock.running_on = None;
            prev_sources.difference(&lock.sources)
        };
        for source in &removed {
            source.remove_subscriber(any_subscriber);
        }
        drop(removed);
        drop(prev_sources);
        drop(prev_value);
        Ok(())
    }

    fn fail_evaluation(
        &self,
        err: RuntimeError,
        prior_state: ReactiveNodeState,
        prev_value: Option<T>,
        any_subscriber: &AnySubscriber,
        prev_sources: SourceSet,
    ) -> Result<(), RuntimeError> {
        if err == RuntimeError::Cycle {
            // A cycle is the reader's error, not this node's: restore the
            // exact pre-evaluation state, edges included.
            let (partial, added) = {
                let mut lock = self.write().or_poisoned();
                if lock.state == ReactiveNodeState::Disposed {
                    drop(lock);
                    self.abort_disposed(any_subscriber, prev_sources);
                    return Err(RuntimeError::Disposed);
                }
                let partial = lock.sources.take();
                let added = partial.difference(&prev_sources);
                lock.sources = prev_sources;
                lock.value = prev_value;
                lock.running_on = None;
                lock.marked_while_running = false;
                if lock.state == ReactiveNodeState::Running {
                    lock.state = prior_state;
                }
                (partial, added)
            };
            for source in &added {
                source.remove_subscriber(any_subscriber);
            }
            drop(partial);
            return Err(err);
        }

        // A panicking computation: invalidate the cache, store the error,
        // and bump the version so dependents know to retry. The node keeps
        // the union of its old and partially-tracked edges so the next
        // upstream change reaches it.
        {
            let mut lock = self.write().or_poisoned();
            if lock.state == ReactiveNodeState::Disposed {
                drop(lock);
                self.abort_disposed(any_subscriber, prev_sources);
                return Err(RuntimeError::Disposed);
            }
            lock.value = None;
            lock.error = Some(err.clone());
            lock.version += 1;
            lock.sources.merge_missing(prev_sources);
            lock.running_on = None;
            lock.marked_while_running = false;
            if lock.state == ReactiveNodeState::Running {
                lock.state = ReactiveNodeState::Clean;
            }
        }
        drop(prev_value);
        Err(err)
    }

    /// Tears down a node that was disposed while it was evaluating. The
    /// concurrent `dispose` found an empty source set (this evaluation had
    /// taken it), so both halves are unsubscribed here: the edges the
    /// aborted run re-tracked and the pre-evaluation edges in
    /// `prev_sources`.
    fn abort_disposed(
        &self,
        any_subscriber: &AnySubscriber,
        prev_sources: SourceSet,
    ) {
        let mut partial = self.write().or_poisoned().sources.take();
        partial.merge_missing(prev_sources);
        for (source, _) in partial.iter() {
            source.remove_subscriber(any_subscriber);
        }
        drop(partial);
    }
}

impl<T: Send + Sync + 'static> Source for RwLock<MemoInner<T>> {
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

impl<T: Send + Sync + 'static> Subscriber for RwLock<MemoInner<T>> {
    fn add_source(&self, source: AnySource, version: u64) {
        let mut lock = self.write().or_poisoned();
        if lock.state == ReactiveNodeState::Disposed {
            return;
        }
        lock.sources.insert(source, version);
    }

    fn clear_sources(&self, subscriber: &AnySubscriber) {
        let taken = self.write().or_poisoned().sources.take();
        for (source, _) in taken.iter() {
            source.remove_subscriber(subscriber);
        }
        drop(taken);
    }
}
