//! Guard types returned by reads and writes.
//!
//! Read guards hold the node's lock in shared mode for as long as the
//! caller keeps them, which is what makes a `Clean` observation torn-read
//! free: the value cannot move while the guard is alive. Write guards
//! notify subscribers when dropped.

use crate::traits::Trigger;
use core::fmt::Debug;
use guardian::{ArcRwLockReadGuardian, ArcRwLockWriteGuardian};
use std::{
    fmt::Display,
    marker::PhantomData,
    ops::{Deref, DerefMut},
    sync::{Arc, RwLock},
};

/// A wrapper that ties a guard to the payload type it exposes.
#[derive(Debug)]
pub struct ReadGuard<T, Inner> {
    ty: PhantomData<T>,
    inner: Inner,
}

impl<T, Inner> ReadGuard<T, Inner> {
    pub(crate) fn new(inner: Inner) -> Self {
        Self {
            inner,
            ty: PhantomData,
        }
    }
}

impl<T, Inner> Deref for ReadGuard<T, Inner>
where
    Inner: Deref<Target = T>,
{
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.inner.deref()
    }
}

impl<T, Inner> PartialEq<T> for ReadGuard<T, Inner>
where
    Inner: Deref<Target = T>,
    T: PartialEq,
{
    fn eq(&self, other: &T) -> bool {
        self.deref() == other
    }
}

impl<T, Inner> Display for ReadGuard<T, Inner>
where
    Inner: Deref<Target = T>,
    T: Display,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&**self, f)
    }
}

/// An owning shared-mode guard over a node's inner state.
pub struct Plain<T: 'static> {
    guard: ArcRwLockReadGuardian<T>,
}

impl<T: 'static> Debug for Plain<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plain").finish()
    }
}

impl<T: 'static> Plain<T> {
    pub(crate) fn try_new(inner: Arc<RwLock<T>>) -> Option<Self> {
        ArcRwLockReadGuardian::take(inner)
            .ok()
            .map(|guard| Plain { guard })
    }
}

impl<T> Deref for Plain<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.guard.deref()
    }
}

/// Projects a [`Plain`] guard down to one field of the inner state.
#[derive(Debug)]
pub struct Mapped<Inner, U>
where
    Inner: Deref,
{
    inner: Inner,
    map_fn: fn(&Inner::Target) -> &U,
}

impl<Inner, U> Mapped<Inner, U>
where
    Inner: Deref,
{
    pub(crate) fn new_with_guard(
        inner: Inner,
        map_fn: fn(&Inner::Target) -> &U,
    ) -> Self {
        Self { inner, map_fn }
    }
}

impl<Inner, U> Deref for Mapped<Inner, U>
where
    Inner: Deref,
{
    type Target = U;

    fn deref(&self) -> &Self::Target {
        (self.map_fn)(self.inner.deref())
    }
}

/// An owning exclusive-mode guard over a node's inner state.
pub struct PlainMut<T: 'static> {
    guard: ArcRwLockWriteGuardian<T>,
}

impl<T: 'static> Debug for PlainMut<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlainMut").finish()
    }
}

impl<T: 'static> PlainMut<T> {
    pub(crate) fn try_new(inner: Arc<RwLock<T>>) -> Option<Self> {
        ArcRwLockWriteGuardian::take(inner)
            .ok()
            .map(|guard| PlainMut { guard })
    }
}

impl<T> Deref for PlainMut<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.guard.deref()
    }
}

impl<T> DerefMut for PlainMut<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.guard.deref_mut()
    }
}

/// Projects an exclusive guard down to one field of the inner state.
#[derive(Debug)]
pub struct MappedMut<Inner, U>
where
    Inner: DerefMut,
{
    inner: Inner,
    map_ref: fn(&Inner::Target) -> &U,
    map_mut: fn(&mut Inner::Target) -> &mut U,
}

impl<Inner, U> MappedMut<Inner, U>
where
    Inner: DerefMut,
{
    pub(crate) fn new_with_guard(
        inner: Inner,
        map_ref: fn(&Inner::Target) -> &U,
        map_mut: fn(&mut Inner::Target) -> &mut U,
    ) -> Self {
        Self {
            inner,
            map_ref,
            map_mut,
        }
    }
}

impl<Inner, U> Deref for MappedMut<Inner, U>
where
    Inner: DerefMut,
{
    type Target = U;

    fn deref(&self) -> &Self::Target {
        (self.map_ref)(self.inner.deref())
    }
}

impl<Inner, U> DerefMut for MappedMut<Inner, U>
where
    Inner: DerefMut,
{
    fn deref_mut(&mut self) -> &mut Self::Target {
        (self.map_mut)(self.inner.deref_mut())
    }
}

/// A write guard that notifies the node's subscribers when dropped.
///
/// In-place mutation cannot be equality gated: by the time the guard is
/// dropped the previous value is gone, so the node's version is bumped and
/// subscribers are notified unconditionally. [`WriteGuard::untrack`]
/// suppresses the notification for callers that know better.
#[derive(Debug)]
pub struct WriteGuard<'a, S, G>
where
    S: Trigger,
{
    triggerable: Option<&'a S>,
    guard: Option<G>,
}

impl<'a, S, G> WriteGuard<'a, S, G>
where
    S: Trigger,
{
    pub(crate) fn new(triggerable: &'a S, guard: G) -> Self {
        Self {
            triggerable: Some(triggerable),
            guard: Some(guard),
        }
    }

    /// Skips the notification this guard would send on drop.
    pub fn untrack(&mut self) {
        self.triggerable.take();
    }
}

impl<S, G> Deref for WriteGuard<'_, S, G>
where
    S: Trigger,
    G: Deref,
{
    type Target = G::Target;

    fn deref(&self) -> &Self::Target {
        self.guard
            .as_ref()
            .expect("guard is present until drop")
            .deref()
    }
}

impl<S, G> DerefMut for WriteGuard<'_, S, G>
where
    S: Trigger,
    G: DerefMut,
{
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.guard
            .as_mut()
            .expect("guard is present until drop")
            .deref_mut()
    }
}

impl<S, G> Drop for WriteGuard<'_, S, G>
where
    S: Trigger,
{
    fn drop(&mut self) {
        // Release the lock before notifying, or the propagation pass would
        // deadlock against the guard it is notifying about.
        drop(self.guard.take());

        if let Some(triggerable) = self.triggerable {
            triggerable.trigger();
        }
    }
}
