//! # LogWriter — event printer backed by `tracing`
//!
//! A minimal subscriber that renders incoming [`Event`]s as one log line each.
//! Lifecycle noise (registrations, ticks) goes to `debug`, problems to `warn`/`error`.
//!
//! ## Example output
//! ```text
//! [registered] item="net" period=1
//! [merged] item="net" period=1
//! [worker-started] item="net"
//! [tick] tick=3 triggered=4
//! [tick-skipped] item="x11" tick=9
//! [faulted] item="curl" tick=12 reason="connection reset"
//! [evicted] item="net" tick=20
//! [shutdown-requested]
//! [shutdown-completed] stopped=3
//! ```

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Subscribe for LogWriter {
    fn on_event(&self, e: &Event) {
        let item = e.item.as_deref().unwrap_or("-");
        match e.kind {
            EventKind::ItemRegistered => {
                tracing::debug!("[registered] item={item:?} period={:?}", e.period);
            }
            EventKind::ItemMerged => {
                tracing::debug!("[merged] item={item:?} period={:?}", e.period);
            }
            EventKind::ItemEvicted => {
                tracing::info!("[evicted] item={item:?} tick={:?}", e.tick);
            }
            EventKind::WorkerStarted => {
                tracing::debug!("[worker-started] item={item:?}");
            }
            EventKind::WorkerStopped => match e.reason.as_deref() {
                Some(reason) => tracing::error!("[worker-stopped] item={item:?} reason={reason:?}"),
                None => tracing::debug!("[worker-stopped] item={item:?}"),
            },
            EventKind::WorkFaulted => {
                tracing::error!(
                    "[faulted] item={item:?} tick={:?} reason={:?}",
                    e.tick,
                    e.reason.as_deref().unwrap_or("unknown")
                );
            }
            EventKind::TickSkipped => {
                tracing::warn!("[tick-skipped] item={item:?} tick={:?}", e.tick);
            }
            EventKind::TickCompleted => {
                tracing::trace!("[tick] tick={:?} triggered={:?}", e.tick, e.count);
            }
            EventKind::SubscriberOverflow => {
                tracing::warn!(
                    "[subscriber-overflow] subscriber={item} reason={:?}",
                    e.reason
                );
            }
            EventKind::SubscriberPanicked => {
                tracing::error!(
                    "[subscriber-panicked] subscriber={item} info={}",
                    e.reason.as_deref().unwrap_or("unknown"),
                );
            }
            EventKind::ShutdownRequested => {
                tracing::info!("[shutdown-requested]");
            }
            EventKind::ShutdownCompleted => {
                tracing::info!("[shutdown-completed] stopped={:?}", e.count);
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
