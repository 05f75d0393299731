//! Thread handshake primitives.
//!
//! - [`Semaphore`] blocking counting semaphore (start / completion handshakes)
//! - [`SignalReceiver`] / [`Signal`] byte channel a worker can multiplex with `poll`

mod semaphore;
mod signal;

pub use semaphore::Semaphore;
pub use signal::{Signal, SignalReceiver};

pub(crate) use signal::{SignalSender, channel};
