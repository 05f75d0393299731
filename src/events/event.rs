//! # Runtime events emitted by the registry and its workers.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Registration events**: an item was inserted, merged or evicted
//! - **Worker events**: dedicated threads starting/stopping, faulted units, dropped tick markers
//! - **Tick events**: one `run_all_tasks` pass completed
//! - **Runtime events**: subscriber overflow/panic, shutdown
//!
//! The [`Event`] struct carries additional metadata such as timestamps, item
//! name, period, tick number and reasons.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use tickvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::ItemMerged)
//!     .with_item("net-poller")
//!     .with_period(2)
//!     .with_tick(7);
//!
//! assert_eq!(ev.kind, EventKind::ItemMerged);
//! assert_eq!(ev.item.as_deref(), Some("net-poller"));
//! assert_eq!(ev.period, Some(2));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `item`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `item`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Registration events ===
    /// A new entry was inserted into the registry.
    ///
    /// Sets:
    /// - `item`: work item name
    /// - `period`: activation period in ticks
    ItemRegistered,

    /// A registration collapsed into an existing equal entry.
    ///
    /// Sets:
    /// - `item`: work item name
    /// - `period`: effective period after the merge
    ItemMerged,

    /// An entry with no external holders aged out and was removed.
    ///
    /// Sets:
    /// - `item`: work item name
    /// - `tick`: tick during which the entry was removed
    ItemEvicted,

    // === Worker events ===
    /// A dedicated worker thread was spawned (first trigger).
    ///
    /// Sets:
    /// - `item`: work item name
    WorkerStarted,

    /// A dedicated worker thread was stopped and joined.
    ///
    /// Sets:
    /// - `item`: work item name
    /// - `reason`: set when the join reported a panic
    WorkerStopped,

    /// A unit of work panicked; the item will not be triggered again.
    ///
    /// Sets:
    /// - `item`: work item name
    /// - `tick`: tick that triggered the failing unit
    /// - `reason`: panic message
    WorkFaulted,

    /// A tick marker could not be written to a full signaling channel.
    ///
    /// Sets:
    /// - `item`: work item name
    /// - `tick`: tick number
    TickSkipped,

    // === Tick events ===
    /// One `run_all_tasks` pass returned.
    ///
    /// Sets:
    /// - `tick`: tick number (1-based)
    /// - `count`: number of triggered items
    TickCompleted,

    // === Shutdown events ===
    /// Registry teardown started.
    ShutdownRequested,

    /// Every worker and pool thread was joined.
    ///
    /// Sets:
    /// - `count`: number of entries stopped
    ShutdownCompleted,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,

    /// Event classification.
    pub kind: EventKind,
    /// Name of the work item (or subscriber), if applicable.
    pub item: Option<Arc<str>>,
    /// Activation period in ticks.
    pub period: Option<u32>,
    /// Tick number the event belongs to.
    pub tick: Option<u64>,
    /// Generic counter (triggered items, stopped entries).
    pub count: Option<usize>,
    /// Human-readable reason (panics, overflow details, etc.).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            item: None,
            period: None,
            tick: None,
            count: None,
            reason: None,
        }
    }

    /// Attaches a work item name.
    #[inline]
    pub fn with_item(mut self, item: impl Into<Arc<str>>) -> Self {
        self.item = Some(item.into());
        self
    }

    /// Attaches an activation period.
    #[inline]
    pub fn with_period(mut self, period: u32) -> Self {
        self.period = Some(period);
        self
    }

    /// Attaches a tick number.
    #[inline]
    pub fn with_tick(mut self, tick: u64) -> Self {
        self.tick = Some(tick);
        self
    }

    /// Attaches a counter.
    #[inline]
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_item(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_item(subscriber)
            .with_reason(info)
    }

    /// Returns `true` for [`EventKind::SubscriberOverflow`] events.
    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }

    /// Returns `true` for [`EventKind::SubscriberPanicked`] events.
    #[inline]
    pub fn is_subscriber_panic(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberPanicked)
    }
}
