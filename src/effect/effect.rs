use super::inner::{EffectInner, RunFn};
use crate::{
    error::RuntimeError,
    graph::{AnySubscriber, ReactiveNodeState, Source, SourceSet, ToAnySubscriber},
    runtime::{NodeId, Runtime},
    scheduler,
    traits::{DefinedAt, IsDisposed},
};
use core::fmt::{Debug, Formatter};
use or_poisoned::OrPoisoned;
use std::{
    any::Any,
    panic::Location,
    sync::{Arc, Mutex, RwLock, Weak},
};

/// An eager observer: side-effecting code that re-runs when the sources it
/// read during its last run change.
///
/// The initial run happens inside [`Effect::new`], unless the effect is
/// created inside a [`batch`](crate::scheduler::batch) window, in which
/// case it is deferred to the close of the outermost batch. Re-runs are
/// driven by the scheduler in FIFO schedule order, and an effect whose
/// sources were only *maybe* changed is reconciled at dequeue and skipped
/// when every recorded source version still matches.
///
/// The handle is owning: dropping the last clone of it tears the effect
/// down. Call [`Effect::dispose`] to stop it explicitly.
pub struct Effect {
    #[cfg(debug_assertions)]
    defined_at: &'static Location<'static>,
    id: NodeId,
    inner: Arc<RwLock<EffectInner>>,
}

impl Effect {
    /// Creates an effect and schedules its first run.
    #[track_caller]
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn new(fun: impl FnMut() + Send + 'static) -> Self {
        let id = Runtime::reserve();
        let fun: RunFn = Arc::new(Mutex::new(Some(Box::new(fun))));
        let inner = Arc::new_cyclic(|weak| {
            RwLock::new(EffectInner {
                id,
                fun,
                state: ReactiveNodeState::Dirty,
                marked_while_running: false,
                sources: SourceSet::new(),
                last_error: None,
                this: weak.clone(),
            })
        });
        Runtime::bind(id, Arc::downgrade(&inner) as Weak<dyn Any + Send + Sync>);
        scheduler::schedule(id, Arc::downgrade(&inner));
        scheduler::run_pass();
        Self {
            #[cfg(debug_assertions)]
            defined_at: Location::caller(),
            id,
            inner,
        }
    }

    /// The effect's identity in the runtime registry.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The number of sources recorded during the last run.
    pub fn source_count(&self) -> usize {
        self.inner.read().or_poisoned().sources.len()
    }

    /// The most recent failure of this effect's body, if the run since the
    /// last success failed.
    pub fn last_error(&self) -> Option<RuntimeError> {
        self.inner.read().or_poisoned().last_error.clone()
    }

    /// Creates a weak handle that does not keep the effect alive.
    pub fn downgrade(&self) -> WeakEffect {
        WeakEffect {
            #[cfg(debug_assertions)]
            defined_at: self.defined_at,
            id: self.id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Stops the effect: removes it from every source's subscriber list,
    /// drops the run function, and discards any pending scheduling
    /// request. Idempotent. Disposing from inside the effect's own body
    /// takes hold when the in-flight run returns.
    pub fn dispose(&self) {
        let (sources, subscriber, was_running, fun) = {
            let mut lock = self.inner.write().or_poisoned();
            if lock.state == ReactiveNodeState::Disposed {
                return;
            }
            let was_running = lock.state == ReactiveNodeState::Running;
            lock.state = ReactiveNodeState::Disposed;
            (
                lock.sources.take(),
                AnySubscriber(lock.id, lock.this.clone()),
                was_running,
                Arc::clone(&lock.fun),
            )
        };
        for (source, _) in sources.iter() {
            source.remove_subscriber(&subscriber);
        }
        drop(sources);
        if !was_running {
            // An in-flight run owns the body mutex; it drops the function
            // itself when it observes the Disposed state.
            *fun.lock().or_poisoned() = None;
        }
        Runtime::unregister(self.id);
    }
}

impl ToAnySubscriber for Effect {
    fn to_any_subscriber(&self) -> AnySubscriber {
        self.inner.to_any_subscriber()
    }
}

impl DefinedAt for Effect {
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

impl IsDisposed for Effect {
    fn is_disposed(&self) -> bool {
        self.inner.read().or_poisoned().state == ReactiveNodeState::Disposed
    }
}

impl Clone for Effect {
    fn clone(&self) -> Self {
        Self {
            #[cfg(debug_assertions)]
            defined_at: self.defined_at,
            id: self.id,
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Debug for Effect {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Effect").field("id", &self.id).finish()
    }
}

/// A handle that refers to an [`Effect`] without keeping it alive.
pub struct WeakEffect {
    #[cfg(debug_assertions)]
    defined_at: &'static Location<'static>,
    id: NodeId,
    inner: Weak<RwLock<EffectInner>>,
}

impl WeakEffect {
    /// The identity of the effect this handle pointed to.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Recovers an owning handle, failing with [`RuntimeError::Gone`] once
    /// the effect has been dropped.
    pub fn upgrade(&self) -> Result<Effect, RuntimeError> {
        self.inner
            .upgrade()
            .map(|inner| Effect {
                #[cfg(debug_assertions)]
                defined_at: self.defined_at,
                id: self.id,
                inner,
            })
            .ok_or(RuntimeError::Gone)
    }
}

impl Clone for WeakEffect {
    fn clone(&self) -> Self {
        Self {
            #[cfg(debug_assertions)]
            defined_at: self.defined_at,
            id: self.id,
            inner: Weak::clone(&self.inner),
        }
    }
}

impl Debug for WeakEffect {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WeakEffect").field("id", &self.id).finish()
    }
}
