//! # Shared handles to registered work.
//!
//! The registry wraps every accepted item in a [`Shared`] cell and stores it
//! type-erased (as `Arc<dyn ErasedWork>`). Callers get a typed [`Handle`] to
//! the same cell. An item is *live* while any handle exists; once only the
//! registry's own reference remains, the item starts counting toward
//! eviction.
//!
//! ```text
//! Handle<T> ──┐
//! Handle<T> ──┼──► Arc<Shared<T>> ◄── Registry entry (Arc<dyn ErasedWork>)
//!             │                   ◄┄┄ dedicated worker (Weak, upgraded per unit)
//!             │                   ◄── pool queue (only while a unit is pending)
//! ```
//!
//! References taken by runners are counted in `in_flight` and subtracted when
//! liveness is computed, so a unit that never returns (an event loop) does not
//! keep its own item alive.

use std::any::Any;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::work::{Work, WorkContext};

/// Item plus scheduler-owned state.
pub(crate) struct Shared<T> {
    work: T,
    faulted: AtomicBool,
    in_flight: AtomicUsize,
}

impl<T> Shared<T> {
    pub(crate) fn new(work: T) -> Self {
        Self {
            work,
            faulted: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
        }
    }

    pub(crate) fn work(&self) -> &T {
        &self.work
    }
}

/// Object-safe view of a [`Shared`] cell used by runners.
pub(crate) trait ErasedWork: Send + Sync {
    fn name(&self) -> &str;
    fn run_unit(&self, ctx: &WorkContext<'_>);
    fn is_faulted(&self) -> bool;
    fn mark_faulted(&self);
    /// Marks a runner-owned strong reference as taken.
    fn begin_run(&self);
    fn end_run(&self);
    fn in_flight(&self) -> usize;
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Work> ErasedWork for Shared<T> {
    fn name(&self) -> &str {
        self.work.name()
    }

    fn run_unit(&self, ctx: &WorkContext<'_>) {
        self.work.run(ctx);
    }

    fn is_faulted(&self) -> bool {
        self.faulted.load(Ordering::Acquire)
    }

    fn mark_faulted(&self) {
        self.faulted.store(true, Ordering::Release);
    }

    fn begin_run(&self) {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
    }

    fn end_run(&self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }

    fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Shared handle to a registered work item.
///
/// Cloning a handle keeps the item alive. Dropping every handle lets the
/// registry evict the item after a few ticks.
pub struct Handle<T> {
    inner: Arc<Shared<T>>,
}

impl<T: Work> Handle<T> {
    pub(crate) fn from_shared(inner: Arc<Shared<T>>) -> Self {
        Self { inner }
    }

    /// Returns `true` if both handles point to the same registered item.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Approximate number of other references to the item.
    ///
    /// Counts every handle; excludes the registry's own reference and
    /// references held by running units.
    pub fn holders(&self) -> usize {
        let runners = self.inner.in_flight.load(Ordering::Acquire);
        Arc::strong_count(&self.inner).saturating_sub(1 + runners)
    }

    /// Returns `true` once a unit of this item has panicked.
    ///
    /// A faulted item is never run again.
    pub fn is_faulted(&self) -> bool {
        self.inner.faulted.load(Ordering::Acquire)
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Deref for Handle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner.work
    }
}

impl<T: Work> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("name", &self.inner.work.name())
            .field("faulted", &self.is_faulted())
            .finish()
    }
}
