//! # Non-blocking event fan-out to multiple subscribers.
//!
//! Provides [`SubscriberSet`] — distributes events to multiple subscribers
//! without blocking the publisher.
//!
//! ## Architecture
//! ```text
//! emit(event)
//!     │
//!     ├──► [queue 1] ──► thread 1 ──► subscriber1.on_event()
//!     │    (bounded)         └──────► panic → SubscriberPanicked
//!     ├──► [queue 2] ──► thread 2 ──► subscriber2.on_event()
//!     │    (bounded)
//!     └──► [queue N] ──► thread N ──► subscriberN.on_event()
//!          (bounded)
//! ```
//!
//! ## Rules
//! - **No cross-subscriber ordering**: subscriber A may process event N while B processes N+5
//! - **Overflow**: event dropped for that subscriber only, `SubscriberOverflow` published
//! - **Non-blocking**: `emit()` returns immediately (uses `try_send`)
//! - **Isolation**: slow/panicking subscriber doesn't affect others
//! - **Per-subscriber FIFO**: each subscriber sees events in order
//!
//! Queues are `tokio::sync::mpsc` channels drained with `blocking_recv` on
//! plain OS threads; no async runtime is required.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tokio::sync::mpsc;

use crate::error::SchedulerError;
use crate::events::{Bus, Event};
use crate::subscribers::Subscribe;

/// Per-subscriber channel metadata.
struct SubscriberChannel {
    name: &'static str,
    sender: mpsc::Sender<Arc<Event>>,
}

/// Fan-out coordinator for multiple event subscribers.
pub struct SubscriberSet {
    channels: Vec<SubscriberChannel>,
    workers: Vec<(&'static str, JoinHandle<()>)>,
    bus: Bus,
}

impl SubscriberSet {
    /// Creates a new set and spawns one worker thread per subscriber.
    ///
    /// Threads are named `{prefix}-sub-{subscriber name}`.
    pub fn new(
        subs: Vec<Arc<dyn Subscribe>>,
        bus: Bus,
        prefix: &str,
    ) -> Result<Self, SchedulerError> {
        let mut channels = Vec::with_capacity(subs.len());
        let mut workers = Vec::with_capacity(subs.len());

        for sub in subs {
            let cap = sub.queue_capacity().max(1);
            let name = sub.name();
            let (tx, mut rx) = mpsc::channel::<Arc<Event>>(cap);
            let bus_for_worker = bus.clone();
            let thread_name = format!("{prefix}-sub-{name}");

            let handle = thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || {
                    while let Some(ev) = rx.blocking_recv() {
                        let res = catch_unwind(AssertUnwindSafe(|| sub.on_event(ev.as_ref())));
                        if let Err(panic) = res {
                            let info = panic_message(panic.as_ref());
                            tracing::error!(subscriber = name, %info, "subscriber panicked");
                            bus_for_worker.publish(Event::subscriber_panicked(name, info));
                        }
                    }
                })
                .map_err(|source| SchedulerError::Spawn {
                    name: thread_name,
                    source,
                })?;

            channels.push(SubscriberChannel { name, sender: tx });
            workers.push((name, handle));
        }

        Ok(Self {
            channels,
            workers,
            bus,
        })
    }

    /// Fan-out one event to all subscribers (non-blocking).
    ///
    /// If a subscriber's queue is **full** or **closed**, the event is dropped for it
    /// and a `SubscriberOverflow` event is published. Overflow events are never
    /// re-reported, so a stuck subscriber cannot flood the bus.
    pub fn emit(&self, event: &Event) {
        let ev = Arc::new(event.clone());
        for channel in &self.channels {
            let reason = match channel.sender.try_send(Arc::clone(&ev)) {
                Ok(()) => continue,
                Err(mpsc::error::TrySendError::Full(_)) => "full",
                Err(mpsc::error::TrySendError::Closed(_)) => "closed",
            };
            tracing::warn!(subscriber = channel.name, reason, "subscriber dropped event");
            if !event.is_subscriber_overflow() {
                self.bus
                    .publish(Event::subscriber_overflow(channel.name, reason));
            }
        }
    }

    /// Graceful shutdown: close all queues and join worker threads.
    ///
    /// Returns how many worker threads ended in a panic that escaped the
    /// per-event guard.
    pub fn shutdown(self) -> usize {
        drop(self.channels);
        let mut failed = 0;
        for (name, h) in self.workers {
            if let Err(panic) = h.join() {
                let info = panic_message(panic.as_ref());
                tracing::error!(subscriber = name, %info, "subscriber worker thread panicked");
                failed += 1;
            }
        }
        failed
    }

    /// True if there are no subscribers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Number of subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
