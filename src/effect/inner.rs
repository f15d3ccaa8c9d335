use crate::{
    error::{error_from_panic, RuntimeError},
    graph::{
        AnySource, AnySubscriber, ReactiveNode, ReactiveNodeState, Source, SourceSet,
        Subscriber, ToAnySubscriber, WithObserver,
    },
    runtime::{self, NodeId, Runtime},
    scheduler,
};
use or_poisoned::OrPoisoned;
use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{Arc, Mutex, RwLock, Weak},
};

/// The effect body. Held behind its own mutex so it is callable without
/// the node's lock (the body re-enters the node through tracking), and so
/// `dispose` can drop it.
pub(crate) type RunFn = Arc<Mutex<Option<Box<dyn FnMut() + Send>>>>;

pub(crate) struct EffectInner {
    pub(crate) id: NodeId,
    pub(crate) fun: RunFn,
    pub(crate) state: ReactiveNodeState,
    /// Set when a mark arrives mid-run (typically because the body wrote
    /// to one of its own sources), so the effect re-enters `Check` instead
    /// of `Clean` when the run finishes.
    pub(crate) marked_while_running: bool,
    pub(crate) sources: SourceSet,
    pub(crate) last_error: Option<RuntimeError>,
    pub(crate) this: Weak<RwLock<EffectInner>>,
}

impl Drop for EffectInner {
    fn drop(&mut self) {
        Runtime::unregister(self.id);
    }
}

impl ToAnySubscriber for Arc<RwLock<EffectInner>> {
    fn to_any_subscriber(&self) -> AnySubscriber {
        AnySubscriber(
            self.read().or_poisoned().id,
            Arc::downgrade(self) as Weak<dyn Subscriber + Send + Sync>,
        )
    }
}

impl ReactiveNode for RwLock<EffectInner> {
    fn mark_check(&self) {
        let (id, this) = {
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
            (lock.id, lock.this.clone())
        };
        scheduler::schedule(id, this);
    }

    fn mark_subscribers_check(&self) {
        // effects are sinks; nothing observes them
    }

    fn update_if_necessary(&self) -> Result<(), RuntimeError> {
        let (state, sources) = {
            let lock = self.read().or_poisoned();
            (lock.state, lock.sources.clone())
        };
        if state != ReactiveNodeState::Check {
            return Ok(());
        }

        // Settle the sources first, without this node's lock held.
        for (source, _) in sources.iter() {
            source.update_if_necessary()?;
        }

        let mut lock = self.write().or_poisoned();
        if lock.state == ReactiveNodeState::Check {
            let stale = lock
                .sources
                .iter()
                .any(|(source, recorded)| source.current_version() != recorded);
            lock.state = if stale {
                ReactiveNodeState::Dirty
            } else {
                ReactiveNodeState::Clean
            };
        }
        Ok(())
    }
}

impl Subscriber for RwLock<EffectInner> {
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

/// Reconciles and, if a source actually changed, runs a dequeued effect.
/// Failures land in the effect's `last_error` and the runtime error hook;
/// the effect stays subscribed and retries on the next source change.
pub(crate) fn run_pending_effect(inner: &Arc<RwLock<EffectInner>>) {
    if let Err(err) = try_run(inner) {
        inner.write().or_poisoned().last_error = Some(err.clone());
        runtime::report_error(&err);
    }
}

/// Parks an effect that exhausted the propagation budget.
pub(crate) fn mark_runaway(inner: &Arc<RwLock<EffectInner>>) {
    let mut lock = inner.write().or_poisoned();
    lock.last_error = Some(RuntimeError::RunawayPropagation);
    if lock.state != ReactiveNodeState::Disposed {
        lock.state = ReactiveNodeState::Clean;
    }
}

fn try_run(inner: &Arc<RwLock<EffectInner>>) -> Result<(), RuntimeError> {
    inner.update_if_necessary()?;

    let (fun, any_subscriber, prev_sources) = {
        let mut lock = inner.write().or_poisoned();
        if lock.state != ReactiveNodeState::Dirty {
            // the "maybe dirty but actually clean" skip
            return Ok(());
        }
        lock.state = ReactiveNodeState::Running;
        (
            Arc::clone(&lock.fun),
            AnySubscriber(lock.id, lock.this.clone()),
            lock.sources.take(),
        )
    };

    let result = catch_unwind(AssertUnwindSafe(|| {
        any_subscriber.with_observer(|| {
            let mut fun = fun.lock().or_poisoned();
            if let Some(fun) = fun.as_mut() {
                fun()
            }
        })
    }));

    match result {
        Ok(()) => {
            let mut lock = inner.write().or_poisoned();
            if lock.state == ReactiveNodeState::Disposed {
                // The body disposed its own effect, or a concurrent
                // dispose raced the run: finish the cleanup the dispose
                // call deferred to us.
                drop(lock);
                abort_disposed(inner, &any_subscriber, prev_sources);
                *fun.lock().or_poisoned() = None;
                return Ok(());
            }
            lock.state = if lock.marked_while_running {
                ReactiveNodeState::Check
            } else {
                ReactiveNodeState::Clean
            };
            lock.marked_while_running = false;
            lock.last_error = None;
            let removed = prev_sources.difference(&lock.sources);
            drop(lock);
            for source in &removed {
                source.remove_subscriber(&any_subscriber);
            }
            drop(prev_sources);
            Ok(())
        }
        Err(payload) => {
            let mut lock = inner.write().or_poisoned();
            if lock.state == ReactiveNodeState::Disposed {
                drop(lock);
                abort_disposed(inner, &any_subscriber, prev_sources);
                *fun.lock().or_poisoned() = None;
                return Err(error_from_panic(payload));
            }
            // Keep the union of the old and partially-tracked edges so the
            // retry-on-next-change contract holds even when the body
            // panicked before reading anything.
            lock.sources.merge_missing(prev_sources);
            if lock.state == ReactiveNodeState::Running {
                lock.state = if lock.marked_while_running {
                    ReactiveNodeState::Check
                } else {
                    ReactiveNodeState::Clean
                };
            }
            lock.marked_while_running = false;
            drop(lock);
            Err(error_from_panic(payload))
        }
    }
}

/// Tears down an effect that was disposed while its body was running. The
/// concurrent `dispose` found an empty source set (the run had taken it),
/// so both halves are unsubscribed here: the edges the aborted run
/// re-tracked and the pre-run edges in `prev_sources`.
fn abort_disposed(
    inner: &Arc<RwLock<EffectInner>>,
    any_subscriber: &AnySubscriber,
    prev_sources: SourceSet,
) {
    let mut partial = inner.write().or_poisoned().sources.take();
    partial.merge_missing(prev_sources);
    for (source, _) in partial.iter() {
        source.remove_subscriber(any_subscriber);
    }
    drop(partial);
}
