//! # Shared worker pool.
//!
//! A fixed set of OS threads receiving pending units from one shared FIFO
//! channel.
//! Pooled items are always awaited: after triggering, the coordinator calls
//! [`WorkerPool::wait`], which blocks until every submitted unit has
//! finished.
//!
//! ```text
//! submit() ──► channel ──► pool-0 ─┐
//!   (to_wait += 1)     └─► pool-1 ─┼──► finished.post()
//!                                  │
//! wait() ◄── finished.wait() × to_wait
//! ```
//!
//! A queued job holds a strong reference to its item; the reference is
//! dropped before the completion is posted, so once `wait` returns the pool
//! holds nothing. Dropping the sender disconnects the channel and ends every
//! thread's receive loop.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, unbounded};
use tokio_util::sync::CancellationToken;

use crate::error::SchedulerError;
use crate::events::{Bus, Event, EventKind};
use crate::subscribers::panic_message;
use crate::sync::Semaphore;
use crate::tasks::{ErasedWork, WorkContext};

struct Job {
    item: Arc<dyn ErasedWork>,
    name: Arc<str>,
    tick: u64,
}

struct PoolInner {
    finished: Semaphore,
    cancel: CancellationToken,
    bus: Bus,
}

/// Fixed-size pool running pooled units.
pub(crate) struct WorkerPool {
    inner: Arc<PoolInner>,
    sender: Option<Sender<Job>>,
    threads: Vec<JoinHandle<()>>,
    to_wait: AtomicUsize,
}

impl WorkerPool {
    /// Spawns `size` threads named `{prefix}-pool-{i}`.
    pub(crate) fn new(size: usize, prefix: &str, bus: Bus) -> Result<Self, SchedulerError> {
        let (sender, receiver) = unbounded::<Job>();
        let mut pool = Self {
            inner: Arc::new(PoolInner {
                finished: Semaphore::new(0),
                cancel: CancellationToken::new(),
                bus,
            }),
            sender: Some(sender),
            threads: Vec::with_capacity(size),
            to_wait: AtomicUsize::new(0),
        };

        for i in 0..size {
            let name = format!("{prefix}-pool-{i}");
            let inner = Arc::clone(&pool.inner);
            let rx = receiver.clone();
            // on error the partially built pool is dropped, which joins what was spawned
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || pool_loop(&inner, rx))
                .map_err(|source| SchedulerError::Spawn { name, source })?;
            pool.threads.push(handle);
        }

        tracing::debug!(size, "worker pool started");
        Ok(pool)
    }

    /// Queues one unit of `item`.
    pub(crate) fn submit(&self, item: Arc<dyn ErasedWork>, name: Arc<str>, tick: u64) {
        let Some(sender) = self.sender.as_ref() else {
            return;
        };
        self.to_wait.fetch_add(1, Ordering::AcqRel);
        if let Err(rejected) = sender.send(Job { item, name, tick }) {
            // every pool thread is gone; nothing will post for this job
            self.to_wait.fetch_sub(1, Ordering::AcqRel);
            tracing::error!(item = %rejected.0.name, tick, "pool has no threads; unit dropped");
        }
    }

    /// Blocks until every submitted unit has finished; returns how many were waited for.
    pub(crate) fn wait(&self) -> usize {
        let mut waited = 0;
        while self.to_wait.load(Ordering::Acquire) > 0 {
            self.inner.finished.wait();
            self.to_wait.fetch_sub(1, Ordering::AcqRel);
            waited += 1;
        }
        waited
    }

    /// Stops the threads; queued but unstarted jobs are dropped without running.
    pub(crate) fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if self.sender.is_none() && self.threads.is_empty() {
            return;
        }
        self.inner.cancel.cancel();
        drop(self.sender.take());
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                tracing::error!("pool thread panicked outside a unit");
            }
        }
        tracing::debug!("worker pool stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

fn pool_loop(inner: &PoolInner, rx: Receiver<Job>) {
    while let Ok(Job { item, name, tick }) = rx.recv() {
        if !item.is_faulted() && !inner.cancel.is_cancelled() {
            let ctx = WorkContext::new(&inner.cancel, None, tick);
            item.begin_run();
            let outcome = catch_unwind(AssertUnwindSafe(|| item.run_unit(&ctx)));
            item.end_run();
            if let Err(panic) = outcome {
                item.mark_faulted();
                let info = panic_message(panic.as_ref());
                tracing::error!(item = %name, tick, %info, "pooled unit panicked");
                inner.bus.publish(
                    Event::new(EventKind::WorkFaulted)
                        .with_item(name)
                        .with_tick(tick)
                        .with_reason(info),
                );
            }
        }
        drop(item);
        inner.finished.post();
    }
}
