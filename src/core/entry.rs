//! # Registry entries and per-tick bookkeeping.
//!
//! An [`Entry`] is the registry's record of one canonical item: its identity
//! (type, kind, key hash), its schedule (`period`, `remaining`) and its
//! liveness counter (`unused`).
//!
//! ## Per-tick step
//! ```text
//! held by anyone else?  yes → unused = 0
//!                       no  → unused += 1; unused >= unused_max → evict
//! remaining == 0?       yes → trigger; remaining = period - 1
//!                       no  → remaining -= 1
//! ```
//! A new entry starts with `remaining = 0`, so it runs on its first tick.

use std::any::TypeId;
use std::sync::Arc;

use crate::error::SchedulerError;
use crate::tasks::ErasedWork;

use super::pool::WorkerPool;
use super::worker::{DedicatedWorker, Trigger};

/// How an item is executed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WorkKind {
    /// Runs on its own OS thread.
    Threaded,
    /// Runs on the shared pool; always awaited.
    Pooled,
}

impl WorkKind {
    /// Short label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            WorkKind::Threaded => "threaded",
            WorkKind::Pooled => "pooled",
        }
    }
}

pub(crate) enum Runner {
    Thread(DedicatedWorker),
    Pool,
}

/// Result of stepping an entry for one tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Step {
    Idle,
    Due,
    Evict,
}

/// How a due entry was started.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Started {
    Skipped,
    Detached,
    Awaited,
    Pooled,
}

pub(crate) struct Entry {
    // runner first: a dedicated thread is stopped before the item is released
    runner: Runner,
    pub(crate) item: Arc<dyn ErasedWork>,
    pub(crate) name: Arc<str>,
    pub(crate) type_id: TypeId,
    pub(crate) kind: WorkKind,
    period: u32,
    remaining: u32,
    unused: u32,
}

impl Entry {
    pub(crate) fn new(
        item: Arc<dyn ErasedWork>,
        name: Arc<str>,
        type_id: TypeId,
        period: u32,
        runner: Runner,
    ) -> Self {
        let kind = match runner {
            Runner::Thread(_) => WorkKind::Threaded,
            Runner::Pool => WorkKind::Pooled,
        };
        Self {
            runner,
            item,
            name,
            type_id,
            kind,
            period,
            remaining: 0,
            unused: 0,
        }
    }

    /// Only the registry and running units reference the item.
    fn is_unheld(&self) -> bool {
        Arc::strong_count(&self.item).saturating_sub(self.item.in_flight()) == 1
    }

    /// Advances liveness and schedule by one tick.
    pub(crate) fn step(&mut self, unused_max: u32) -> Step {
        if self.is_unheld() {
            self.unused += 1;
            if self.unused >= unused_max {
                return Step::Evict;
            }
        } else {
            self.unused = 0;
        }

        if self.remaining == 0 {
            self.remaining = self.period - 1;
            Step::Due
        } else {
            self.remaining -= 1;
            Step::Idle
        }
    }

    /// Starts one unit of a due entry.
    pub(crate) fn start(&mut self, tick: u64, pool: &WorkerPool) -> Result<Started, SchedulerError> {
        if self.item.is_faulted() {
            return Ok(Started::Skipped);
        }
        match &mut self.runner {
            Runner::Thread(worker) => Ok(match worker.trigger(tick)? {
                Trigger::Skipped => Started::Skipped,
                Trigger::Detached => Started::Detached,
                Trigger::Awaited => Started::Awaited,
            }),
            Runner::Pool => {
                pool.submit(Arc::clone(&self.item), Arc::clone(&self.name), tick);
                Ok(Started::Pooled)
            }
        }
    }

    /// Folds a duplicate registration's schedule into this entry.
    ///
    /// A shorter period wins and runs on the next tick; `wait` only upgrades.
    pub(crate) fn absorb(&mut self, period: u32, wait: bool) {
        if period < self.period {
            self.period = period;
            self.remaining = 0;
        }
        self.unused = 0;
        if wait {
            if let Runner::Thread(worker) = &mut self.runner {
                worker.upgrade_wait();
            }
        }
    }

    /// Stops the dedicated thread, if any.
    pub(crate) fn stop(&mut self) -> Result<(), SchedulerError> {
        match &mut self.runner {
            Runner::Thread(worker) => worker.stop(),
            Runner::Pool => Ok(()),
        }
    }

    pub(crate) fn period(&self) -> u32 {
        self.period
    }

    pub(crate) fn remaining(&self) -> u32 {
        self.remaining
    }

    pub(crate) fn unused(&self) -> u32 {
        self.unused
    }

    pub(crate) fn waits(&self) -> bool {
        match &self.runner {
            Runner::Thread(worker) => worker.waits(),
            Runner::Pool => true,
        }
    }

    pub(crate) fn is_spawned(&self) -> bool {
        match &self.runner {
            Runner::Thread(worker) => worker.is_spawned(),
            Runner::Pool => false,
        }
    }
}
