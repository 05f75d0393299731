//! # Dedicated worker thread.
//!
//! A [`DedicatedWorker`] owns one OS thread that runs one item's unit each
//! time the coordinator triggers it.
//!
//! ## Lifecycle
//! ```text
//! new()       → channel created (if signal), no thread yet
//! trigger()   → thread spawned on first call; start.post(); 'T' written
//! thread:       start.wait() → drain extra posts → run unit → post owed completions
//! stop()      → cancel; start.post(); 'X' written (blocking); join
//! ```
//!
//! ## Rules
//! - At most one unit in flight: the thread runs units one after another and
//!   coalesces triggers that arrive while a unit is running.
//! - Every trigger that owed a completion gets exactly one post on the shared
//!   completion semaphore, even when the unit panics or the worker exits.
//! - The thread holds the item through a `Weak`, upgraded only while a unit
//!   runs; the upgrade is counted as in flight and ignored by liveness, so a
//!   unit that never returns does not keep an otherwise unheld item alive.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::SchedulerError;
use crate::events::{Bus, Event, EventKind};
use crate::subscribers::panic_message;
use crate::sync::{Semaphore, SignalReceiver, SignalSender, channel};
use crate::tasks::{ErasedWork, WorkContext};

/// Outcome of a trigger request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Trigger {
    /// The worker is gone or faulted; nothing was started.
    Skipped,
    /// Started; the tick does not wait for it.
    Detached,
    /// Started; one completion is owed to the tick.
    Awaited,
}

#[derive(Default)]
struct Ledger {
    owed: usize,
    exited: bool,
}

/// State shared between the coordinator and the worker thread.
struct WorkerShared {
    start: Semaphore,
    cancel: CancellationToken,
    tick: AtomicU64,
    ledger: Mutex<Ledger>,
}

/// One item's private thread plus its synchronization objects.
pub(crate) struct DedicatedWorker {
    name: Arc<str>,
    thread_name: String,
    item: Weak<dyn ErasedWork>,
    wait: bool,
    shared: Arc<WorkerShared>,
    completions: Arc<Semaphore>,
    sender: Option<SignalSender>,
    receiver: Option<Arc<SignalReceiver>>,
    thread: Option<JoinHandle<()>>,
    bus: Bus,
}

impl DedicatedWorker {
    /// Prepares a worker; the signaling channel (if any) is created here so
    /// that resource failures surface at registration.
    pub(crate) fn new(
        name: Arc<str>,
        prefix: &str,
        item: Weak<dyn ErasedWork>,
        wait: bool,
        signal: bool,
        completions: Arc<Semaphore>,
        bus: Bus,
    ) -> Result<Self, SchedulerError> {
        let (sender, receiver) = if signal {
            let (tx, rx) = channel()?;
            (Some(tx), Some(Arc::new(rx)))
        } else {
            (None, None)
        };

        Ok(Self {
            thread_name: format!("{prefix}-{}", short_name(&name)),
            name,
            item,
            wait,
            shared: Arc::new(WorkerShared {
                start: Semaphore::new(0),
                cancel: CancellationToken::new(),
                tick: AtomicU64::new(0),
                ledger: Mutex::new(Ledger::default()),
            }),
            completions,
            sender,
            receiver,
            thread: None,
            bus,
        })
    }

    /// Whether triggers owe a completion to the tick.
    pub(crate) fn waits(&self) -> bool {
        self.wait
    }

    /// Makes future triggers owe a completion. Never reverts.
    pub(crate) fn upgrade_wait(&mut self) {
        self.wait = true;
    }

    /// Whether the OS thread has been started.
    pub(crate) fn is_spawned(&self) -> bool {
        self.thread.is_some()
    }

    /// Starts one unit, spawning the thread on first use.
    pub(crate) fn trigger(&mut self, tick: u64) -> Result<Trigger, SchedulerError> {
        if self.thread.is_none() {
            self.spawn()?;
        }

        {
            let mut ledger = self.shared.ledger.lock();
            if ledger.exited {
                return Ok(Trigger::Skipped);
            }
            if self.wait {
                ledger.owed += 1;
            }
        }

        self.shared.tick.store(tick, Ordering::Release);
        self.shared.start.post();

        if let Some(tx) = self.sender.as_mut() {
            let reason = match tx.send_tick() {
                Ok(true) => None,
                Ok(false) => Some("channel full".to_string()),
                Err(e) => Some(e.as_message()),
            };
            if let Some(reason) = reason {
                tracing::warn!(item = %self.name, tick, %reason, "tick signal skipped");
                self.bus.publish(
                    Event::new(EventKind::TickSkipped)
                        .with_item(Arc::clone(&self.name))
                        .with_tick(tick)
                        .with_reason(reason),
                );
            }
        }

        Ok(if self.wait {
            Trigger::Awaited
        } else {
            Trigger::Detached
        })
    }

    fn spawn(&mut self) -> Result<(), SchedulerError> {
        let ctx = WorkerLoop {
            name: Arc::clone(&self.name),
            item: self.item.clone(),
            shared: Arc::clone(&self.shared),
            completions: Arc::clone(&self.completions),
            signal: self.receiver.clone(),
            bus: self.bus.clone(),
        };

        let handle = thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || ctx.run())
            .map_err(|source| SchedulerError::Spawn {
                name: self.thread_name.clone(),
                source,
            })?;

        self.thread = Some(handle);
        tracing::debug!(item = %self.name, thread = %self.thread_name, "dedicated worker started");
        self.bus
            .publish(Event::new(EventKind::WorkerStarted).with_item(Arc::clone(&self.name)));
        Ok(())
    }

    /// Requests termination and joins the thread.
    ///
    /// Blocks until any in-flight unit returns. Idempotent.
    pub(crate) fn stop(&mut self) -> Result<(), SchedulerError> {
        let Some(handle) = self.thread.take() else {
            return Ok(());
        };

        self.shared.cancel.cancel();
        self.shared.start.post();
        let signaled = match self.sender.as_mut() {
            Some(tx) => tx.send_terminate(),
            None => Ok(()),
        };

        let joined = handle.join();
        self.sender = None;
        self.receiver = None;

        let mut ev = Event::new(EventKind::WorkerStopped).with_item(Arc::clone(&self.name));
        if let Err(panic) = joined {
            let info = panic_message(panic.as_ref());
            tracing::error!(item = %self.name, %info, "dedicated worker thread panicked");
            ev = ev.with_reason(info);
        } else {
            tracing::debug!(item = %self.name, "dedicated worker stopped");
        }
        self.bus.publish(ev);
        signaled
    }
}

impl Drop for DedicatedWorker {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::error!(item = %self.name, error = %e, "failed to signal worker termination");
        }
    }
}

/// Everything the worker thread owns.
struct WorkerLoop {
    name: Arc<str>,
    item: Weak<dyn ErasedWork>,
    shared: Arc<WorkerShared>,
    completions: Arc<Semaphore>,
    signal: Option<Arc<SignalReceiver>>,
    bus: Bus,
}

impl WorkerLoop {
    fn run(self) {
        loop {
            self.shared.start.wait();
            if self.shared.cancel.is_cancelled() {
                break;
            }
            // triggers that piled up while the previous unit ran
            self.shared.start.drain();

            let owed = std::mem::take(&mut self.shared.ledger.lock().owed);
            let tick = self.shared.tick.load(Ordering::Acquire);
            let outcome = self.run_unit(tick);

            if let Err(info) = outcome {
                tracing::error!(item = %self.name, tick, %info, "work unit panicked");
                self.bus.publish(
                    Event::new(EventKind::WorkFaulted)
                        .with_item(Arc::clone(&self.name))
                        .with_tick(tick)
                        .with_reason(info),
                );
                self.completions.post_n(owed);
                break;
            }
            self.completions.post_n(owed);
        }

        let leftover = {
            let mut ledger = self.shared.ledger.lock();
            ledger.exited = true;
            std::mem::take(&mut ledger.owed)
        };
        self.completions.post_n(leftover);

        if let Some(rx) = &self.signal {
            if let Err(e) = rx.drain() {
                tracing::warn!(item = %self.name, error = %e, "failed to drain signal channel");
            }
        }
    }

    /// Runs one unit; the strong reference is released before returning.
    fn run_unit(&self, tick: u64) -> Result<(), String> {
        let Some(item) = self.item.upgrade() else {
            return Ok(());
        };
        if item.is_faulted() {
            return Ok(());
        }

        let ctx = WorkContext::new(&self.shared.cancel, self.signal.as_deref(), tick);
        // taken after the upgrade and released before the drop, so the count
        // never exceeds the worker's extra strong reference
        item.begin_run();
        let outcome = catch_unwind(AssertUnwindSafe(|| item.run_unit(&ctx)));
        item.end_run();
        outcome.map_err(|panic| {
            item.mark_faulted();
            panic_message(panic.as_ref())
        })
    }
}

/// Last path segment of a type name, without generic arguments.
pub(crate) fn short_name(name: &str) -> &str {
    let base = name.split('<').next().unwrap_or(name);
    base.rsplit("::").next().unwrap_or(base)
}
