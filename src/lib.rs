//! An implementation of a fine-grained reactive runtime.
//!
//! Fine-grained reactivity models the flow of data through a long-lived
//! program by composing three kinds of reactive primitives:
//! 1. **Signals**: atomic units of state, which can be directly mutated.
//! 2. **Memos**: derived values, which cannot be mutated directly but
//!    update whenever the signals they depend on change.
//! 3. **Effects**: side effects that synchronize the reactive system with
//!    the world outside it.
//!
//! Signals and memos are "source" nodes in the dependency graph, because
//! subscribers can observe their values; memos and effects are
//! "subscriber" nodes, because they track the sources they read.
//!
//! ```rust
//! use reactive_runtime::{computed::Memo, effect::Effect, prelude::*, signal::Signal};
//!
//! let count = Signal::new(1);
//! let double_count = Memo::new({
//!     let count = count.clone();
//!     move |_| count.get() * 2
//! });
//!
//! // the effect runs once when it is created
//! let printer = Effect::new({
//!     let double_count = double_count.clone();
//!     move || println!("double_count = {}", double_count.get())
//! });
//!
//! // updating `count` propagates to its dependents and re-runs the effect
//! count.set(2);
//! # drop(printer);
//! ```
//!
//! ## Design principles and assumptions
//! - **Effects are expensive.** Side effects (rendering, network, disk)
//!   are assumed to be orders of magnitude more expensive than bookkeeping,
//!   so the runtime spends its effort on *not* running them: writes are
//!   equality gated, dirtiness propagates as cheap `Check` marks, and a
//!   scheduled effect is skipped when none of its recorded sources turns
//!   out to have actually changed.
//! - **Automatic dependency tracking.** Dependencies are discovered at run
//!   time, not declared: each evaluation re-records exactly the sources it
//!   read, so a subscriber with a conditional branch stops re-running when
//!   values used only in the inactive branch change.
//! - **Synchronous, batched scheduling.** A write outside a [`batch`]
//!   drains the effect queue before it returns; writes inside a batch
//!   coalesce into a single propagation pass at the close of the outermost
//!   batch. Effect execution is serialized process-wide, and the runtime
//!   tolerates concurrent access from multiple threads without a global
//!   lock around user code.
//!
//! [`batch`]: scheduler::batch

use std::fmt::Arguments;

pub mod computed;
pub mod effect;
mod error;
pub mod graph;
pub mod runtime;
pub mod scheduler;
#[cfg(feature = "serde")]
mod serde;
pub mod signal;
pub mod traits;

pub use error::RuntimeError;

/// Reexports frequently-used traits and functions.
pub mod prelude {
    pub use crate::{
        graph::{untrack, ToAnySource, ToAnySubscriber},
        scheduler::batch,
        traits::*,
    };
}

pub(crate) fn log_warning(text: Arguments) {
    #[cfg(feature = "tracing")]
    {
        tracing::warn!("{}", text);
    }
    #[cfg(not(feature = "tracing"))]
    {
        eprintln!("{}", text);
    }
}
