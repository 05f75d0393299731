//! # Registry: deduplicating, tick-driven scheduler.
//!
//! The registry holds one canonical entry per distinct work item. Each call to
//! [`Registry::run_all_tasks`] is one *tick*.
//!
//! ## Architecture
//! ```text
//! register_threaded(spec, item) ─┐
//! register_pooled(period, item) ─┼─► find equal entry? ── yes ─► absorb + merge → Handle(existing)
//!                                │                     └─ no ──► new Entry     → Handle(new)
//!                                ▼
//!                 HashMap<key hash, Vec<Entry>>
//!                                │
//! run_all_tasks() ───────────────┤  (one tick, serialized by the tick lock)
//!   1. step every entry: evict / idle / due
//!   2. start due entries (dedicated thread or pool)
//!   3. stop evicted entries outside the state lock
//!   4. wait: completion semaphore × awaited, then pool.wait()
//! ```
//!
//! ## Rules
//! - Equality requires the same concrete type, the same [`WorkKind`], equal key
//!   hashes and [`Work::same_work`]; items without a key hash never merge.
//! - Registration and ticking may be called from any thread.
//! - A tick returns only after every awaited unit it started has finished.
//! - Dropping the registry stops and joins every thread it spawned.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;

use crate::error::SchedulerError;
use crate::events::{Bus, Event, EventKind};
use crate::sync::Semaphore;
use crate::tasks::{ErasedWork, Handle, Shared, ThreadSpec, Work};

use super::builder::RegistryBuilder;
use super::config::Config;
use super::entry::{Entry, Runner, Started, Step, WorkKind};
use super::pool::WorkerPool;
use super::worker::DedicatedWorker;

/// Summary of one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Tick number, starting at 1.
    pub tick: u64,
    /// Units started during this tick.
    pub triggered: usize,
    /// Units this tick blocked on (awaited dedicated plus pooled).
    pub awaited: usize,
    /// Entries evicted during this tick.
    pub evicted: usize,
}

/// Point-in-time view of one entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryInfo {
    /// Item name.
    pub name: Arc<str>,
    /// Execution kind.
    pub kind: WorkKind,
    /// Run every `period` ticks.
    pub period: u32,
    /// Ticks left until the next run.
    pub remaining: u32,
    /// Consecutive ticks held only by the registry.
    pub unused: u32,
    /// Whether ticks wait for this item.
    pub wait: bool,
    /// Whether a unit of this item panicked.
    pub faulted: bool,
    /// Whether a dedicated thread has been started.
    pub spawned: bool,
}

#[derive(Default)]
struct State {
    entries: HashMap<u64, Vec<Entry>>,
    ticks: u64,
}

impl State {
    fn find_equal<T: Work>(&mut self, hash: u64, kind: WorkKind, candidate: &T) -> Option<&mut Entry> {
        let type_id = TypeId::of::<T>();
        self.entries.get_mut(&hash)?.iter_mut().find(|entry| {
            entry.kind == kind
                && entry.type_id == type_id
                && entry
                    .item
                    .as_any()
                    .downcast_ref::<Shared<T>>()
                    .is_some_and(|existing| existing.work().same_work(candidate))
        })
    }

    fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }
}

/// Deduplicating periodic scheduler.
///
/// # Example
/// ```
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use tickvisor::{Config, Registry, Work, WorkContext};
///
/// #[derive(Default)]
/// struct Uptime(AtomicU32);
///
/// impl Work for Uptime {
///     fn run(&self, _ctx: &WorkContext<'_>) {
///         self.0.fetch_add(1, Ordering::Relaxed);
///     }
/// }
///
/// let registry = Registry::new(Config::default())?;
/// let uptime = registry.register_pooled(1, Uptime::default())?;
/// registry.run_all_tasks()?;
/// assert_eq!(uptime.0.load(Ordering::Relaxed), 1);
/// # Ok::<(), tickvisor::SchedulerError>(())
/// ```
pub struct Registry {
    cfg: Config,
    state: Mutex<State>,
    tick_lock: Mutex<()>,
    completions: Arc<Semaphore>,
    pool: Option<WorkerPool>,
    bus: Bus,
    listener: Option<JoinHandle<()>>,
}

impl Registry {
    /// Creates a registry without subscribers.
    pub fn new(cfg: Config) -> Result<Self, SchedulerError> {
        Self::builder(cfg).build()
    }

    /// Returns a builder for a registry with subscribers.
    pub fn builder(cfg: Config) -> RegistryBuilder {
        RegistryBuilder::new(cfg)
    }

    pub(crate) fn from_parts(
        cfg: Config,
        pool: WorkerPool,
        bus: Bus,
        listener: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            cfg,
            state: Mutex::new(State::default()),
            tick_lock: Mutex::new(()),
            completions: Arc::new(Semaphore::new(0)),
            pool: Some(pool),
            bus,
            listener,
        }
    }

    /// Registers an item that runs on its own OS thread.
    ///
    /// If an equal threaded item is already registered, `item` is merged into
    /// it and a handle to the existing item is returned.
    pub fn register_threaded<T: Work>(
        &self,
        spec: ThreadSpec,
        item: T,
    ) -> Result<Handle<T>, SchedulerError> {
        self.register(WorkKind::Threaded, spec, item)
    }

    /// Registers an item that runs on the shared pool every `period` ticks.
    ///
    /// Pooled units are always awaited by the tick that starts them.
    pub fn register_pooled<T: Work>(&self, period: u32, item: T) -> Result<Handle<T>, SchedulerError> {
        self.register(WorkKind::Pooled, ThreadSpec::new(period).with_wait(true), item)
    }

    fn register<T: Work>(
        &self,
        kind: WorkKind,
        spec: ThreadSpec,
        item: T,
    ) -> Result<Handle<T>, SchedulerError> {
        if spec.period() == 0 {
            return Err(SchedulerError::InvalidPeriod {
                period: spec.period(),
            });
        }

        let mut state = self.state.lock();

        if let Some(hash) = item.key_hash() {
            if let Some(entry) = state.find_equal(hash, kind, &item) {
                entry.absorb(spec.period(), spec.wait());
                let name = Arc::clone(&entry.name);
                let period = entry.period();
                let handle = downcast::<T>(&entry.item)?;
                drop(state);

                handle.merge(item);
                tracing::debug!(item = %name, period, "registration merged");
                self.bus.publish(
                    Event::new(EventKind::ItemMerged)
                        .with_item(name)
                        .with_period(period),
                );
                return Ok(handle);
            }
        }

        let shared = Arc::new(Shared::new(item));
        let hash = shared
            .work()
            .key_hash()
            .unwrap_or(Arc::as_ptr(&shared) as usize as u64);
        let name: Arc<str> = Arc::from(shared.work().name());
        let erased: Arc<dyn ErasedWork> = shared.clone();

        let runner = match kind {
            WorkKind::Threaded => Runner::Thread(DedicatedWorker::new(
                Arc::clone(&name),
                &self.cfg.thread_prefix,
                Arc::downgrade(&erased),
                spec.wait(),
                spec.signal(),
                Arc::clone(&self.completions),
                self.bus.clone(),
            )?),
            WorkKind::Pooled => Runner::Pool,
        };

        state.entries.entry(hash).or_default().push(Entry::new(
            erased,
            Arc::clone(&name),
            TypeId::of::<T>(),
            spec.period(),
            runner,
        ));
        drop(state);

        tracing::debug!(item = %name, kind = kind.as_label(), period = spec.period(), "item registered");
        self.bus.publish(
            Event::new(EventKind::ItemRegistered)
                .with_item(name)
                .with_period(spec.period()),
        );
        Ok(Handle::from_shared(shared))
    }

    /// Runs one tick.
    ///
    /// Evicts items nobody else has held for `unused_max` ticks, starts every
    /// due item, then blocks until all awaited units have finished. If
    /// starting an item fails, the remaining items are still processed and
    /// the first error is returned after the wait.
    pub fn run_all_tasks(&self) -> Result<TickReport, SchedulerError> {
        let _tick = self.tick_lock.lock();
        let Some(pool) = self.pool.as_ref() else {
            return Ok(TickReport::default());
        };
        let unused_max = self.cfg.unused_max_clamped();

        let mut report = TickReport::default();
        let mut evicted = Vec::new();
        let mut awaited = 0usize;
        let mut first_err = None;

        {
            let mut state = self.state.lock();
            state.ticks += 1;
            let tick = state.ticks;
            report.tick = tick;

            for bucket in state.entries.values_mut() {
                let mut i = 0;
                while i < bucket.len() {
                    match bucket[i].step(unused_max) {
                        Step::Evict => {
                            evicted.push(bucket.swap_remove(i));
                            continue;
                        }
                        Step::Idle => {}
                        Step::Due => match bucket[i].start(tick, pool) {
                            Ok(Started::Skipped) => {}
                            Ok(Started::Awaited) => {
                                awaited += 1;
                                report.triggered += 1;
                            }
                            Ok(Started::Detached | Started::Pooled) => report.triggered += 1,
                            Err(e) => {
                                tracing::error!(item = %bucket[i].name, error = %e, "failed to start unit");
                                first_err.get_or_insert(e);
                            }
                        },
                    }
                    i += 1;
                }
            }
            state.entries.retain(|_, bucket| !bucket.is_empty());
        }

        report.evicted = evicted.len();
        for mut entry in evicted {
            if let Err(e) = entry.stop() {
                tracing::warn!(item = %entry.name, error = %e, "evicted worker did not stop cleanly");
            }
            tracing::debug!(item = %entry.name, tick = report.tick, "item evicted");
            self.bus.publish(
                Event::new(EventKind::ItemEvicted)
                    .with_item(Arc::clone(&entry.name))
                    .with_tick(report.tick),
            );
        }

        for _ in 0..awaited {
            self.completions.wait();
        }
        report.awaited = awaited + pool.wait();

        tracing::trace!(
            tick = report.tick,
            triggered = report.triggered,
            awaited = report.awaited,
            evicted = report.evicted,
            "tick completed"
        );
        self.bus.publish(
            Event::new(EventKind::TickCompleted)
                .with_tick(report.tick)
                .with_count(report.triggered),
        );

        match first_err {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// Entries currently registered, sorted by name.
    pub fn snapshot(&self) -> Vec<EntryInfo> {
        let state = self.state.lock();
        let mut out: Vec<EntryInfo> = state
            .entries
            .values()
            .flatten()
            .map(|entry| EntryInfo {
                name: Arc::clone(&entry.name),
                kind: entry.kind,
                period: entry.period(),
                remaining: entry.remaining(),
                unused: entry.unused(),
                wait: entry.waits(),
                faulted: entry.item.is_faulted(),
                spawned: entry.is_spawned(),
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Number of registered entries.
    pub fn len(&self) -> usize {
        self.state.lock().len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of ticks run so far.
    pub fn tick_count(&self) -> u64 {
        self.state.lock().ticks
    }

    /// The configuration this registry was built with.
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Subscribes to runtime events.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Stops every worker and the pool. Equivalent to dropping the registry.
    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.bus.publish(Event::new(EventKind::ShutdownRequested));
        tracing::debug!("registry shutting down");

        let entries: Vec<Entry> = self
            .state
            .get_mut()
            .entries
            .drain()
            .flat_map(|(_, bucket)| bucket)
            .collect();
        let stopped = entries.len();
        for mut entry in entries {
            if let Err(e) = entry.stop() {
                tracing::warn!(item = %entry.name, error = %e, "worker did not stop cleanly");
            }
        }

        if let Some(pool) = self.pool.take() {
            pool.shutdown();
        }

        self.bus
            .publish(Event::new(EventKind::ShutdownCompleted).with_count(stopped));
        tracing::debug!(stopped, "registry shut down");

        if let Some(listener) = self.listener.take() {
            if listener.join().is_err() {
                tracing::error!("event listener thread panicked");
            }
        }
    }
}

fn downcast<T: Work>(item: &Arc<dyn ErasedWork>) -> Result<Handle<T>, SchedulerError> {
    Arc::clone(item)
        .into_any()
        .downcast::<Shared<T>>()
        .map(Handle::from_shared)
        .map_err(|_| SchedulerError::TypeMismatch {
            expected: std::any::type_name::<T>(),
        })
}
