//! The global node registry and runtime-level hooks.
//!
//! Every node registers itself here at creation and removes itself when its
//! inner state is dropped. The registry stores only weak, type-erased
//! entries: ownership lives in the handles users hold and in the strong
//! source edges of the graph itself, so registration never extends a
//! node's lifetime.
//!
//! The registry lock is a leaf lock. It is taken briefly for inserts,
//! removals, and counting, and no node lock is ever acquired while it is
//! held — which makes it safe for a node's `Drop` impl to unregister
//! itself even when the drop happens inside an edge-maintenance path.

use crate::error::RuntimeError;
use or_poisoned::OrPoisoned;
use slotmap::{new_key_type, SlotMap};
use std::{
    any::Any,
    sync::{Arc, OnceLock, RwLock, Weak},
};

new_key_type! {
    /// Stable identity of a node in the reactive graph.
    ///
    /// Keys are generational, so an id handed out once is never observed
    /// again for a different node within the process lifetime.
    pub struct NodeId;
}

type RegistryMap = SlotMap<NodeId, Option<Weak<dyn Any + Send + Sync>>>;

static REGISTRY: OnceLock<RwLock<RegistryMap>> = OnceLock::new();

type ErrorHook = Arc<dyn Fn(&RuntimeError) + Send + Sync>;

static ERROR_HOOK: OnceLock<RwLock<Option<ErrorHook>>> = OnceLock::new();

fn registry() -> &'static RwLock<RegistryMap> {
    REGISTRY.get_or_init(Default::default)
}

fn error_hook() -> &'static RwLock<Option<ErrorHook>> {
    ERROR_HOOK.get_or_init(Default::default)
}

/// Facade over the process-wide runtime state.
pub struct Runtime;

impl Runtime {
    /// Allocates an identity for a node that is about to be constructed.
    /// The entry stays empty until [`Runtime::bind`] fills it in.
    pub(crate) fn reserve() -> NodeId {
        registry().write().or_poisoned().insert(None)
    }

    /// Associates a freshly constructed node with its reserved id.
    pub(crate) fn bind(id: NodeId, node: Weak<dyn Any + Send + Sync>) {
        if let Some(slot) = registry().write().or_poisoned().get_mut(id) {
            *slot = Some(node);
        }
    }

    /// Removes a node from the registry. Idempotent: called both from
    /// explicit `dispose` and from the node's `Drop` impl.
    pub(crate) fn unregister(id: NodeId) {
        registry().write().or_poisoned().remove(id);
    }

    /// Whether the node behind `id` is still registered and alive.
    pub fn is_live(id: NodeId) -> bool {
        registry()
            .read()
            .or_poisoned()
            .get(id)
            .and_then(|slot| slot.as_ref())
            .map(|weak| weak.strong_count() > 0)
            .unwrap_or(false)
    }

    /// The number of live nodes currently registered.
    pub fn node_count() -> usize {
        registry()
            .read()
            .or_poisoned()
            .values()
            .filter(|slot| {
                slot.as_ref()
                    .map(|weak| weak.strong_count() > 0)
                    .unwrap_or(false)
            })
            .count()
    }

    /// Drops registry entries whose node has died without unregistering
    /// itself. Runs at the end of each propagation pass; with `Drop`-based
    /// unregistration this is normally a no-op, but it bounds the damage
    /// of a leaked entry.
    pub(crate) fn reclaim() {
        registry().write().or_poisoned().retain(|_, slot| {
            slot.as_ref()
                .map(|weak| weak.strong_count() > 0)
                .unwrap_or(true)
        });
    }
}

/// Installs the host-supplied sink for errors that have no caller to
/// return to: effect-body panics and runaway-propagation aborts.
pub fn set_error_hook(hook: impl Fn(&RuntimeError) + Send + Sync + 'static) {
    *error_hook().write().or_poisoned() = Some(Arc::new(hook));
}

/// Removes the installed error hook, restoring the default logging sink.
pub fn clear_error_hook() {
    *error_hook().write().or_poisoned() = None;
}

/// Delivers `err` to the installed hook, or to the warning log when no
/// hook is installed.
pub(crate) fn report_error(err: &RuntimeError) {
    let hook = error_hook().read().or_poisoned().clone();
    match hook {
        Some(hook) => hook(err),
        None => crate::log_warning(format_args!("uncaught reactive error: {err}")),
    }
}
