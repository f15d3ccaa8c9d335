//! The access-trait tower implemented by the reactive primitives.
//!
//! ## Principles
//! 1. **Composition**: the richer traits are blanket-implemented from the
//!    base traits, so a primitive implements as little as possible and
//!    gets the rest for free.
//! 2. **Fallibility**: every accessor has a `try_` variant returning
//!    [`RuntimeError`]. The plain variants raise the same error as a
//!    panic payload, which lets a failure travel out of a user-supplied
//!    closure and be recovered, typed, by the node that invoked it.
//!
//! ## Base traits
//! | Trait             | Mode  | Description                                                         |
//! |-------------------|-------|---------------------------------------------------------------------|
//! | [`Track`]         | —     | Records this value as a source of the current observer.             |
//! | [`Trigger`]       | —     | Notifies subscribers unconditionally.                               |
//! | [`ReadUntracked`] | Guard | Shared access to the value without registering a dependency.        |
//! | [`Read`]          | Guard | Shared access with dependency registration (and, for derived values, revalidation first). |
//! | [`Write`]         | Guard | Exclusive access; notifies on guard drop.                           |
//!
//! `Read` is implemented per primitive rather than blanket-composed from
//! `Track + ReadUntracked`: a memo must bring itself up to date *before*
//! the observer records its version, or the observer would immediately
//! consider the edge stale.
//!
//! ## Derived traits
//! [`WithUntracked`]/[`With`] apply a closure to the value; [`GetUntracked`]/
//! [`Get`] clone it; [`Update`] mutates through a write guard; [`Set`]
//! replaces the value (equality-gated on signals).

use crate::{
    error::{raise, RuntimeError},
    graph::{Observer, Source, Subscriber, ToAnySource},
    signal::WriteGuard,
};
use std::{
    ops::{Deref, DerefMut},
    panic::Location,
};

/// Records the location at which a reactive value was created, for error
/// reporting in debug builds.
pub trait DefinedAt {
    fn defined_at(&self) -> Option<&'static Location<'static>>;
}

/// Checks whether a node is still usable.
pub trait IsDisposed {
    fn is_disposed(&self) -> bool;
}

/// Tracks changes to this value, adding it as a source of the current
/// reactive observer.
pub trait Track {
    fn track(&self);
}

impl<T: Source + ToAnySource> Track for T {
    #[track_caller]
    fn track(&self) {
        if let Some(subscriber) = Observer::get() {
            // Record the version before the caller reads the value: if a
            // write lands in between, the recorded version is merely older
            // than the value observed, and reconciliation errs toward
            // re-running rather than missing the update.
            subscriber.add_source(self.to_any_source(), self.current_version());
            self.add_subscriber(subscriber);
        }
    }
}

/// Notifies this node's subscribers that it changed, without any equality
/// gating. This is the escape hatch used by in-place mutation and by
/// wrappers (such as a CRDT-backed signal) that must preserve every write.
pub trait Trigger {
    fn trigger(&self);
}

/// Shared access to the value without registering a dependency.
pub trait ReadUntracked: Sized + DefinedAt {
    type Value: Deref;

    fn try_read_untracked(&self) -> Result<Self::Value, RuntimeError>;

    #[track_caller]
    fn read_untracked(&self) -> Self::Value {
        self.try_read_untracked().unwrap_or_else(|err| raise(err))
    }
}

/// Shared access to the value, registering it as a source of the current
/// observer. For derived values this also revalidates the cache first.
pub trait Read: Sized + DefinedAt {
    type Value: Deref;

    fn try_read(&self) -> Result<Self::Value, RuntimeError>;

    #[track_caller]
    fn read(&self) -> Self::Value {
        self.try_read().unwrap_or_else(|err| raise(err))
    }
}

/// Applies a closure to the current value without tracking.
pub trait WithUntracked: DefinedAt {
    type Value: ?Sized;

    fn try_with_untracked<U>(
        &self,
        fun: impl FnOnce(&Self::Value) -> U,
    ) -> Result<U, RuntimeError>;

    #[track_caller]
    fn with_untracked<U>(&self, fun: impl FnOnce(&Self::Value) -> U) -> U {
        self.try_with_untracked(fun).unwrap_or_else(|err| raise(err))
    }
}

impl<T> WithUntracked for T
where
    T: ReadUntracked,
{
    type Value = <<T as ReadUntracked>::Value as Deref>::Target;

    fn try_with_untracked<U>(
        &self,
        fun: impl FnOnce(&Self::Value) -> U,
    ) -> Result<U, RuntimeError> {
        self.try_read_untracked().map(|value| fun(&value))
    }
}

/// Applies a closure to the current value, with tracking.
pub trait With: DefinedAt {
    type Value: ?Sized;

    fn try_with<U>(
        &self,
        fun: impl FnOnce(&Self::Value) -> U,
    ) -> Result<U, RuntimeError>;

    #[track_caller]
    fn with<U>(&self, fun: impl FnOnce(&Self::Value) -> U) -> U {
        self.try_with(fun).unwrap_or_else(|err| raise(err))
    }
}

impl<T> With for T
where
    T: Read,
{
    type Value = <<T as Read>::Value as Deref>::Target;

    fn try_with<U>(
        &self,
        fun: impl FnOnce(&Self::Value) -> U,
    ) -> Result<U, RuntimeError> {
        self.try_read().map(|value| fun(&value))
    }
}

/// Clones the current value without tracking.
pub trait GetUntracked: DefinedAt {
    type Value;

    fn try_get_untracked(&self) -> Result<Self::Value, RuntimeError>;

    #[track_caller]
    fn get_untracked(&self) -> Self::Value {
        self.try_get_untracked().unwrap_or_else(|err| raise(err))
    }
}

impl<T> GetUntracked for T
where
    T: WithUntracked,
    T::Value: Clone,
{
    type Value = <T as WithUntracked>::Value;

    fn try_get_untracked(&self) -> Result<Self::Value, RuntimeError> {
        self.try_with_untracked(Self::Value::clone)
    }
}

/// Clones the current value, with tracking.
pub trait Get: DefinedAt {
    type Value;

    fn try_get(&self) -> Result<Self::Value, RuntimeError>;

    #[track_caller]
    fn get(&self) -> Self::Value {
        self.try_get().unwrap_or_else(|err| raise(err))
    }
}

impl<T> Get for T
where
    T: With,
    T::Value: Clone,
{
    type Value = <T as With>::Value;

    fn try_get(&self) -> Result<Self::Value, RuntimeError> {
        self.try_with(Self::Value::clone)
    }
}

/// Exclusive access to the value through a guard that notifies subscribers
/// on drop.
pub trait Write: Sized + DefinedAt + Trigger {
    type Value: 'static;
    type UntrackedGuard: DerefMut<Target = Self::Value>;

    fn try_write(
        &self,
    ) -> Result<WriteGuard<'_, Self, Self::UntrackedGuard>, RuntimeError>;

    fn try_write_untracked(
        &self,
    ) -> Result<Self::UntrackedGuard, RuntimeError>;

    #[track_caller]
    fn write(&self) -> WriteGuard<'_, Self, Self::UntrackedGuard> {
        self.try_write().unwrap_or_else(|err| raise(err))
    }

    #[track_caller]
    fn write_untracked(&self) -> Self::UntrackedGuard {
        self.try_write_untracked().unwrap_or_else(|err| raise(err))
    }
}

/// Mutates the value in place through a write guard.
pub trait Update: DefinedAt {
    type Value;

    fn try_update<U>(
        &self,
        fun: impl FnOnce(&mut Self::Value) -> U,
    ) -> Result<U, RuntimeError>;

    fn try_update_untracked<U>(
        &self,
        fun: impl FnOnce(&mut Self::Value) -> U,
    ) -> Result<U, RuntimeError>;

    #[track_caller]
    fn update<U>(&self, fun: impl FnOnce(&mut Self::Value) -> U) -> U {
        self.try_update(fun).unwrap_or_else(|err| raise(err))
    }

    #[track_caller]
    fn update_untracked<U>(
        &self,
        fun: impl FnOnce(&mut Self::Value) -> U,
    ) -> U {
        self.try_update_untracked(fun)
            .unwrap_or_else(|err| raise(err))
    }
}

impl<T> Update for T
where
    T: Write,
{
    type Value = <T as Write>::Value;

    fn try_update<U>(
        &self,
        fun: impl FnOnce(&mut Self::Value) -> U,
    ) -> Result<U, RuntimeError> {
        let mut guard = self.try_write()?;
        Ok(fun(&mut guard))
    }

    fn try_update_untracked<U>(
        &self,
        fun: impl FnOnce(&mut Self::Value) -> U,
    ) -> Result<U, RuntimeError> {
        let mut guard = self.try_write_untracked()?;
        Ok(fun(&mut guard))
    }
}

/// Replaces the value. On signals this is the equality-gated write: when
/// the new value compares equal to the current one, nothing happens at
/// all — no version bump, no marking, no effects.
pub trait Set {
    type Value;

    fn try_set(&self, value: Self::Value) -> Result<(), RuntimeError>;

    #[track_caller]
    fn set(&self, value: Self::Value);
}
