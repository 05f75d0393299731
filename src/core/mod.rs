//! Runtime core: registration, ticking and teardown.
//!
//! The only public entry point is [`Registry`], built from a [`Config`]
//! (optionally through [`RegistryBuilder`] to attach subscribers).
//!
//! Internal modules:
//! - [`entry`]: per-item schedule and liveness bookkeeping;
//! - [`worker`]: dedicated OS thread per threaded item;
//! - [`pool`]: fixed-size pool for pooled items;
//! - [`registry`]: deduplication, the tick algorithm and shutdown;
//! - [`builder`]: wiring of bus, pool and subscribers.

mod builder;
mod config;
mod entry;
mod pool;
mod registry;
mod worker;

pub use builder::RegistryBuilder;
pub use config::Config;
pub use entry::WorkKind;
pub use registry::{EntryInfo, Registry, TickReport};
