//! # Built-in subscribers
//!
//! - [`LogWriter`]: renders events as `tracing` lines.

mod log;

pub use log::LogWriter;
