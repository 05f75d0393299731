//! # tickvisor
//!
//! **Tickvisor** is a tick-driven scheduler for periodic work.
//!
//! A host program owns a [`Registry`] and calls [`Registry::run_all_tasks`]
//! once per tick (for example once per display refresh). Each registered
//! item runs every `period` ticks, either on its own OS thread or on a small
//! shared pool. Registering an item equal to one already registered returns a
//! handle to the existing item instead of scheduling duplicate work, and items
//! nobody holds any more are evicted automatically.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   register_threaded(spec, item)        register_pooled(period, item)
//!              │                                     │
//!              ▼                                     ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Registry                                                         │
//! │  - entries keyed by key hash (dedup + merge)                      │
//! │  - per entry: period, remaining, unused                           │
//! │  - completion Semaphore (awaited dedicated units)                 │
//! └──────┬──────────────────┬──────────────────────────┬──────────────┘
//!        ▼                  ▼                          ▼
//!  ┌──────────────┐   ┌──────────────┐        ┌──────────────────┐
//!  │ Dedicated    │   │ Dedicated    │        │ WorkerPool       │
//!  │ worker (OS   │   │ worker +     │        │ N threads, FIFO  │
//!  │ thread)      │   │ signal pipe  │        │ queue, always    │
//!  └──────┬───────┘   └──────┬───────┘        │ awaited          │
//!         │                  │                └────────┬─────────┘
//!         │ Publishes events │                         │
//!         ▼                  ▼                         ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        Bus (broadcast channel)                    │
//! │                   (capacity: Config::bus_capacity)                │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                        listener thread ──► SubscriberSet
//!                                            (one thread per subscriber)
//! ```
//!
//! ### One tick
//! ```text
//! run_all_tasks()
//!   ├─► for each entry:
//!   │     ├─ held by a handle?   reset `unused`, else `unused += 1`
//!   │     ├─ unused >= unused_max → evict (stop + join its thread)
//!   │     └─ remaining == 0 → start a unit; remaining = period - 1
//!   ├─► wait for every awaited dedicated unit started this tick
//!   ├─► wait for the pool to drain
//!   └─► publish TickCompleted
//! ```
//!
//! ## Features
//! | Area              | Description                                              | Key types / traits                         |
//! |-------------------|----------------------------------------------------------|--------------------------------------------|
//! | **Work items**    | Periodic units, identity by key tuple, latest results.   | [`Work`], [`Keyed`], [`KeyedWork`], [`Latest`] |
//! | **Scheduling**    | Dedup, ticking, eviction, dedicated threads, pool.       | [`Registry`], [`ThreadSpec`], [`Handle`]   |
//! | **Signaling**     | Per-worker tick/terminate channel usable with `poll`.    | [`SignalReceiver`], [`Signal`]             |
//! | **Subscriber API**| Hook into runtime events.                                | [`Subscribe`], [`Event`]                   |
//! | **Errors**        | Typed scheduler errors.                                  | [`SchedulerError`]                         |
//! | **Configuration** | Pool size, eviction threshold, bus capacity.             | [`Config`]                                 |
//!
//! ## Optional features
//! - `logging`: exports a built-in [`LogWriter`] subscriber backed by `tracing`.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use tickvisor::{Config, Keyed, KeyedWork, Latest, Registry, ThreadSpec, WorkContext};
//!
//! #[derive(Default)]
//! struct FileSize(Latest<u64>);
//!
//! impl KeyedWork<(String,)> for FileSize {
//!     fn run(&self, (path,): &(String,), _ctx: &WorkContext<'_>) {
//!         let len = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
//!         self.0.set(len);
//!     }
//! }
//!
//! fn main() -> Result<(), tickvisor::SchedulerError> {
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn tickvisor::Subscribe>> = vec![Arc::new(tickvisor::LogWriter::default())];
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn tickvisor::Subscribe>> = Vec::new();
//!
//!     let registry = Registry::builder(Config::default())
//!         .with_subscribers(subs)
//!         .build()?;
//!
//!     let spec = ThreadSpec::new(2).with_wait(true);
//!     let a = registry.register_threaded(spec, Keyed::new(("/etc/hostname".to_string(),), FileSize::default()))?;
//!     let b = registry.register_threaded(spec, Keyed::new(("/etc/hostname".to_string(),), FileSize::default()))?;
//!     assert!(tickvisor::Handle::ptr_eq(&a, &b));
//!
//!     registry.run_all_tasks()?;
//!     let _size = a.0.get();
//!     Ok(())
//! }
//! ```
mod core;
mod error;
mod events;
mod subscribers;
mod sync;
mod tasks;

// ---- Public re-exports ----

pub use crate::core::{Config, EntryInfo, Registry, RegistryBuilder, TickReport, WorkKind};
pub use error::SchedulerError;
pub use events::{Bus, Event, EventKind};
pub use subscribers::{Subscribe, SubscriberSet};
pub use sync::{Semaphore, Signal, SignalReceiver};
pub use tasks::{
    Handle, KeyTuple, Keyed, KeyedWork, Latest, ThreadSpec, Work, WorkContext, field_hash,
    fold_key_hash,
};

// Optional: expose a simple built-in logger subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
