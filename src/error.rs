//! Error types used by the tickvisor scheduler.
//!
//! [`SchedulerError`] covers everything the scheduler itself can report:
//! - **construction errors** raised synchronously by `register_*`;
//! - **resource errors** (thread spawn, signaling pipe) raised at
//!   registration or trigger time;
//! - **signal errors** seen by a work item reading its signaling channel.
//!
//! Failures *inside* a unit of work are not errors of this type: a work item
//! encodes its own recoverable failures in its result, and a panic escaping
//! `run` is caught at the worker boundary and reported as
//! [`EventKind::WorkFaulted`](crate::EventKind::WorkFaulted).
//!
//! `as_label` / `as_message` give stable strings for logs and metrics.

use std::io;

use thiserror::Error;

/// # Errors produced by the scheduler.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// A work item was registered with a period of zero ticks.
    #[error("invalid period {period}: must be at least 1 tick")]
    InvalidPeriod {
        /// The rejected period.
        period: u32,
    },

    /// The canonical entry for a registration could not be viewed as the requested type.
    #[error("registered entry is not a `{expected}`")]
    TypeMismatch {
        /// Type name the caller asked for.
        expected: &'static str,
    },

    /// An OS thread (dedicated worker or pool thread) could not be spawned.
    #[error("failed to spawn thread `{name}`: {source}")]
    Spawn {
        /// Name of the thread that failed to start.
        name: String,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// The signaling channel could not be created, reconfigured or written.
    #[error("signal channel failure: {source}")]
    Channel {
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// A byte read from the signaling channel is neither a tick nor a terminate marker.
    #[error("unknown signal byte {byte:#04x}")]
    UnknownSignal {
        /// The offending byte.
        byte: u8,
    },

    /// The write side of the signaling channel is gone.
    #[error("signal channel closed")]
    ChannelClosed,
}

impl SchedulerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use tickvisor::SchedulerError;
    ///
    /// let err = SchedulerError::InvalidPeriod { period: 0 };
    /// assert_eq!(err.as_label(), "invalid_period");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            SchedulerError::InvalidPeriod { .. } => "invalid_period",
            SchedulerError::TypeMismatch { .. } => "type_mismatch",
            SchedulerError::Spawn { .. } => "spawn_failed",
            SchedulerError::Channel { .. } => "channel_failed",
            SchedulerError::UnknownSignal { .. } => "unknown_signal",
            SchedulerError::ChannelClosed => "channel_closed",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            SchedulerError::InvalidPeriod { period } => format!("period={period}"),
            SchedulerError::TypeMismatch { expected } => format!("expected={expected}"),
            SchedulerError::Spawn { name, source } => format!("thread={name} error={source}"),
            SchedulerError::Channel { source } => format!("error={source}"),
            SchedulerError::UnknownSignal { byte } => format!("byte={byte:#04x}"),
            SchedulerError::ChannelClosed => "write side closed".to_string(),
        }
    }

    /// Indicates whether the error comes from OS resource exhaustion or failure
    /// (as opposed to a programming error at the call site).
    ///
    /// # Example
    /// ```
    /// use tickvisor::SchedulerError;
    ///
    /// assert!(!SchedulerError::InvalidPeriod { period: 0 }.is_resource());
    /// assert!(SchedulerError::ChannelClosed.is_resource());
    /// ```
    pub fn is_resource(&self) -> bool {
        matches!(
            self,
            SchedulerError::Spawn { .. }
                | SchedulerError::Channel { .. }
                | SchedulerError::ChannelClosed
        )
    }

    pub(crate) fn channel(source: impl Into<io::Error>) -> Self {
        SchedulerError::Channel {
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_stable() {
        let spawn = SchedulerError::Spawn {
            name: "tick-net".into(),
            source: io::Error::other("boom"),
        };
        assert_eq!(spawn.as_label(), "spawn_failed");
        assert_eq!(spawn.as_message(), "thread=tick-net error=boom");
        assert_eq!(
            SchedulerError::UnknownSignal { byte: b'?' }.as_message(),
            "byte=0x3f"
        );
    }

    #[test]
    fn test_display_includes_details() {
        let err = SchedulerError::TypeMismatch { expected: "Poller" };
        assert_eq!(err.to_string(), "registered entry is not a `Poller`");
    }
}
