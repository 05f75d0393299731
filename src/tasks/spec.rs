//! # Registration parameters for dedicated-thread work.
//!
//! [`ThreadSpec`] bundles what the registry needs besides the item itself:
//! - `period`: run every `period` ticks (at least 1);
//! - `wait`: whether `run_all_tasks` blocks until the triggered unit finishes;
//! - `signal`: whether the worker gets a signaling channel that carries one
//!   `Next` per trigger and a final `Done` on stop.

/// Parameters of a dedicated-thread registration.
///
/// # Example
/// ```
/// use tickvisor::ThreadSpec;
///
/// let spec = ThreadSpec::new(3).with_wait(true);
/// assert_eq!(spec.period(), 3);
/// assert!(spec.wait());
/// assert!(!spec.signal());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ThreadSpec {
    period: u32,
    wait: bool,
    signal: bool,
}

impl ThreadSpec {
    /// Fire-and-forget registration running every `period` ticks.
    ///
    /// A zero period is rejected at registration time.
    pub const fn new(period: u32) -> Self {
        Self {
            period,
            wait: false,
            signal: false,
        }
    }

    /// Sets whether the tick waits for this item's unit to complete.
    pub const fn with_wait(mut self, wait: bool) -> Self {
        self.wait = wait;
        self
    }

    /// Sets whether the worker gets a signaling channel.
    pub const fn with_signal(mut self, signal: bool) -> Self {
        self.signal = signal;
        self
    }

    /// Run every `period` ticks.
    pub const fn period(&self) -> u32 {
        self.period
    }

    /// Tick blocks on completion.
    pub const fn wait(&self) -> bool {
        self.wait
    }

    /// Worker owns a signaling channel.
    pub const fn signal(&self) -> bool {
        self.signal
    }
}
