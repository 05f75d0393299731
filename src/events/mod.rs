//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to runtime events emitted by the registry, the
//! dedicated workers, the shared pool and the subscriber workers.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Registry` (register/merge/evict/tick/shutdown),
//!   dedicated workers (start/stop/fault/skipped ticks), pool threads (fault),
//!   `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the registry's listener thread, which fans out to the
//!   `SubscriberSet`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
