//! # Event subscribers for the tickvisor registry.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`]
//! fan-out and built-in implementations for handling runtime events
//! broadcast through the [`Bus`](crate::events::Bus).
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   Registry / workers ── publish(Event) ──► Bus ──► listener thread
//!                                                        │
//!                                                        ▼
//!                                                  SubscriberSet::emit
//!                                            ┌───────────┼───────────┐
//!                                            ▼           ▼           ▼
//!                                        LogWriter    Metrics     Custom
//! ```

#[cfg(feature = "logging")]
mod embedded;
mod set;
mod subscriber;

#[cfg(feature = "logging")]
pub use embedded::LogWriter;
pub use set::SubscriberSet;
pub(crate) use set::panic_message;
pub use subscriber::Subscribe;
