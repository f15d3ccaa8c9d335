use std::{any::Any, sync::Arc};
use thiserror::Error;

/// Failure modes of the reactive runtime.
///
/// Fallible accessors (`try_get`, `try_read`, `try_set`, …) return these
/// directly. Their panicking counterparts raise the same value as a panic
/// payload, which is how a failure propagates out of a user-supplied
/// computation and is caught again by the node that invoked it.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RuntimeError {
    /// A derived value read itself, directly or through other nodes, while
    /// it was being evaluated.
    #[error("cycle detected while evaluating a derived value")]
    Cycle,

    /// A weak handle was upgraded after the node it pointed to had been
    /// dropped and unregistered.
    #[error("the reactive node behind this handle no longer exists")]
    Gone,

    /// The node was disposed and can no longer be read or written.
    #[error("attempted to use a disposed reactive node")]
    Disposed,

    /// A propagation pass exceeded its effect-execution budget, which
    /// usually means an effect keeps rescheduling itself by writing to its
    /// own sources.
    #[error("effect queue did not settle within the propagation budget")]
    RunawayPropagation,

    /// A user-supplied computation or effect body panicked. For memos the
    /// failure is cached and re-raised on every read until an upstream
    /// change triggers a retry.
    #[error("reactive callback panicked: {0}")]
    Callback(Arc<str>),
}

/// Raises `err` as a panic carrying the typed error as its payload, so that
/// an enclosing evaluation can recover it with [`error_from_panic`].
pub(crate) fn raise(err: RuntimeError) -> ! {
    std::panic::panic_any(err)
}

/// Recovers a [`RuntimeError`] from a caught panic payload. Payloads that
/// did not originate from [`raise`] (i.e. ordinary panics inside user code)
/// are wrapped as [`RuntimeError::Callback`].
pub(crate) fn error_from_panic(payload: Box<dyn Any + Send>) -> RuntimeError {
    match payload.downcast::<RuntimeError>() {
        Ok(err) => *err,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(msg) => RuntimeError::Callback(Arc::from(*msg)),
            Err(payload) => match payload.downcast::<String>() {
                Ok(msg) => RuntimeError::Callback(Arc::from(msg.as_str())),
                Err(_) => RuntimeError::Callback(Arc::from(
                    "callback panicked with a non-string payload",
                )),
            },
        },
    }
}
