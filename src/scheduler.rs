//! Batched, deterministic execution of pending effects.
//!
//! A write to a signal (outside a batch) or the close of an outermost
//! [`batch`] starts a propagation pass: `Check` marks are pushed through
//! the graph, pending effects are drained in FIFO schedule order, and the
//! registry is reclaimed. Each effect is re-reconciled at dequeue time and
//! skipped entirely when none of its sources actually changed.
//!
//! Passes are serialized: a global drain lock admits one draining thread
//! at a time, and a thread that is already draining extends its current
//! pass instead of starting a nested one. Writes performed by effect
//! bodies therefore feed the same queue the outer loop is consuming.

use crate::{
    effect::inner::{self, EffectInner},
    error::RuntimeError,
    runtime::{self, NodeId, Runtime},
};
use or_poisoned::OrPoisoned;
use rustc_hash::FxHashSet;
use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    mem,
    sync::{
        atomic::{AtomicUsize, Ordering::Relaxed},
        Mutex, OnceLock, RwLock, Weak,
    },
};

/// Default per-pass budget: the number of effect executions a single pass
/// may perform before it is aborted as runaway.
pub const DEFAULT_EFFECT_BUDGET: usize = 1000;

static EFFECT_BUDGET: AtomicUsize = AtomicUsize::new(DEFAULT_EFFECT_BUDGET);

#[derive(Default)]
struct Queue {
    pending: VecDeque<(NodeId, Weak<RwLock<EffectInner>>)>,
    queued: FxHashSet<NodeId>,
}

static QUEUE: OnceLock<Mutex<Queue>> = OnceLock::new();

// Serializes effect execution across threads. Never held while a batch
// commit or user write is pending on the same thread: re-entry is routed
// through the IN_PASS flag instead.
static DRAIN: Mutex<()> = Mutex::new(());

thread_local! {
    static BATCH: RefCell<BatchState> = RefCell::new(BatchState::default());
    static IN_PASS: Cell<bool> = const { Cell::new(false) };
}

#[derive(Default)]
struct BatchState {
    depth: usize,
    staged: Vec<Box<dyn FnOnce()>>,
}

/// Overrides the per-pass effect-execution budget.
pub fn set_effect_budget(budget: usize) {
    EFFECT_BUDGET.store(budget.max(1), Relaxed);
}

/// Whether the current thread is inside a [`batch`] window.
pub fn in_batch() -> bool {
    BATCH.with_borrow(|b| b.depth > 0)
}

/// Runs `fun` inside a batching window.
///
/// Signal writes during the window only stage a pending value; when the
/// outermost batch closes, each written signal compares its final pending
/// value against the value it held at batch start, applies it if different,
/// and a single propagation pass drains every effect that became pending.
/// Effects therefore observe only the final value of each signal, and a
/// batch whose writes cancel out runs nothing at all.
pub fn batch<T>(fun: impl FnOnce() -> T) -> T {
    let _guard = BatchGuard::enter();
    fun()
}

struct BatchGuard;

impl BatchGuard {
    fn enter() -> Self {
        BATCH.with_borrow_mut(|b| b.depth += 1);
        BatchGuard
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        let staged = BATCH.with_borrow_mut(|b| {
            b.depth -= 1;
            if b.depth == 0 {
                mem::take(&mut b.staged)
            } else {
                Vec::new()
            }
        });
        if std::thread::panicking() {
            // The batch body unwound: abandon the staged writes rather
            // than committing a half-applied transaction.
            return;
        }
        for commit in staged {
            commit();
        }
        run_pass();
    }
}

/// Registers a deferred write commit to run when the outermost batch on
/// this thread closes.
pub(crate) fn stage(commit: Box<dyn FnOnce()>) {
    BATCH.with_borrow_mut(|b| b.staged.push(commit));
}

/// Enqueues an effect for the next drain, at most once per effect.
pub(crate) fn schedule(id: NodeId, effect: Weak<RwLock<EffectInner>>) {
    let mut queue = QUEUE.get_or_init(Default::default).lock().or_poisoned();
    if queue.queued.insert(id) {
        queue.pending.push_back((id, effect));
    }
}

fn pop_next() -> Option<(NodeId, Weak<RwLock<EffectInner>>)> {
    let mut queue = QUEUE.get_or_init(Default::default).lock().or_poisoned();
    let entry = queue.pending.pop_front();
    if let Some((id, _)) = &entry {
        queue.queued.remove(id);
    }
    entry
}

struct PassGuard;

impl Drop for PassGuard {
    fn drop(&mut self) {
        IN_PASS.set(false);
    }
}

/// Drains the pending-effect queue, unless draining is already deferred to
/// a batch close or to the drain loop higher up this thread's stack.
pub(crate) fn run_pass() {
    if in_batch() || IN_PASS.get() {
        return;
    }
    let _serialize = DRAIN.lock().or_poisoned();
    IN_PASS.set(true);
    let _reset = PassGuard;

    let budget = EFFECT_BUDGET.load(Relaxed);
    let mut executed = 0usize;
    while let Some((_, effect)) = pop_next() {
        let Some(effect) = effect.upgrade() else {
            // The effect died between scheduling and dequeue.
            continue;
        };
        executed += 1;
        if executed > budget {
            // The pass is not settling. Park the head effect in an error
            // state and abandon the pass; everything still queued stays
            // pending for the next one.
            inner::mark_runaway(&effect);
            runtime::report_error(&RuntimeError::RunawayPropagation);
            break;
        }
        inner::run_pending_effect(&effect);
    }

    Runtime::reclaim();
}
