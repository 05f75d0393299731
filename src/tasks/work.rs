//! # Work item abstraction.
//!
//! A [`Work`] is an object whose repeatable unit of work is run by the
//! registry every `period` ticks. The same instance is run again and again;
//! results are kept inside the item (see [`Latest`](crate::Latest)) and read by
//! callers holding a [`Handle`](crate::Handle).
//!
//! ## Identity
//! Two registrations denote the same work iff they have the same concrete
//! type, the same execution kind, equal [`Work::key_hash`] and
//! [`Work::same_work`] returns `true`. Items returning `None` from
//! `key_hash` are never merged with anything.
//!
//! ## Rules
//! - `run` is called with at most one execution in flight per item.
//! - `run` must not block forever; the registry joins dedicated threads on
//!   eviction and shutdown.
//! - A panic escaping `run` marks the item faulted; it is never run again.

use tokio_util::sync::CancellationToken;

use crate::sync::SignalReceiver;

/// Periodic unit of work.
///
/// # Example
/// ```
/// use std::sync::atomic::{AtomicU64, Ordering};
/// use tickvisor::{Work, WorkContext};
///
/// #[derive(Default)]
/// struct Counter(AtomicU64);
///
/// impl Work for Counter {
///     fn run(&self, _ctx: &WorkContext<'_>) {
///         self.0.fetch_add(1, Ordering::Relaxed);
///     }
/// }
/// ```
pub trait Work: Send + Sync + 'static {
    /// Performs one unit of work.
    fn run(&self, ctx: &WorkContext<'_>);

    /// Name used for events, logs and worker thread names.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Hash of the identifying keys, or `None` for items that never merge.
    fn key_hash(&self) -> Option<u64> {
        None
    }

    /// Returns `true` if `other` denotes the same work as `self`.
    ///
    /// Only consulted when both items have the same type and key hash.
    fn same_work(&self, _other: &Self) -> bool
    where
        Self: Sized,
    {
        false
    }

    /// Folds a duplicate registration into the canonical item.
    ///
    /// Called with the candidate that is about to be discarded.
    fn merge(&self, _other: Self)
    where
        Self: Sized,
    {
    }
}

/// Per-execution context handed to [`Work::run`].
#[derive(Clone, Copy)]
pub struct WorkContext<'a> {
    cancel: &'a CancellationToken,
    signal: Option<&'a SignalReceiver>,
    tick: u64,
}

impl<'a> WorkContext<'a> {
    pub(crate) fn new(
        cancel: &'a CancellationToken,
        signal: Option<&'a SignalReceiver>,
        tick: u64,
    ) -> Self {
        Self {
            cancel,
            signal,
            tick,
        }
    }

    /// Returns `true` once the worker running this item has been asked to stop.
    ///
    /// Long-running units should poll this and return early.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The termination token of the worker running this item.
    pub fn cancellation(&self) -> &CancellationToken {
        self.cancel
    }

    /// Signaling channel of a dedicated worker registered with `signal = true`.
    ///
    /// Yields [`Signal::Next`](crate::Signal::Next) once per trigger and
    /// [`Signal::Done`](crate::Signal::Done) when the worker is being stopped.
    /// `None` for pooled items and workers without a channel.
    pub fn signal(&self) -> Option<&'a SignalReceiver> {
        self.signal
    }

    /// Tick number of the most recent trigger.
    pub fn tick(&self) -> u64 {
        self.tick
    }
}

impl std::fmt::Debug for WorkContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkContext")
            .field("cancelled", &self.is_cancelled())
            .field("signal", &self.signal.is_some())
            .field("tick", &self.tick)
            .finish()
    }
}
