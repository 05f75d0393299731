//! # Signaling channel for readiness multiplexing.
//!
//! A dedicated worker may ask for a signaling channel next to its start
//! semaphore. The channel is an OS pipe carrying one byte per signal:
//!
//! ```text
//! coordinator (SignalSender)                 worker thread (SignalReceiver)
//!   trigger()  ── 'T' (non-blocking) ──►  pipe  ──► poll()/select() wakes
//!   stop()     ── 'X' (blocking)     ──►  pipe  ──► recv() == Signal::Done
//! ```
//!
//! The read side exposes its file descriptor through [`AsFd`] so that a work
//! item whose unit of work is itself an event loop (a display connection, a
//! socket) can wait on both its own descriptor and the scheduler signal.
//!
//! ## Rules
//! - Tick markers are written non-blocking: if the pipe is full the marker is
//!   dropped and reported, the start semaphore still carries the tick.
//! - The terminate marker is written with the write side switched to
//!   blocking, so it is delivered even when the pipe buffer is full.
//! - Both ends are closed exactly once, after the worker thread was joined.

use std::io::{self, ErrorKind, PipeReader, PipeWriter, Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};

use nix::fcntl::{FcntlArg, OFlag, fcntl};

use crate::error::SchedulerError;

const TICK: u8 = b'T';
const TERMINATE: u8 = b'X';

/// Signal observed on the read side of the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// The scheduler triggered the next unit of work.
    Next,
    /// The worker is being stopped; return from `run` promptly.
    Done,
}

impl Signal {
    fn decode(byte: u8) -> Result<Self, SchedulerError> {
        match byte {
            TICK => Ok(Signal::Next),
            TERMINATE => Ok(Signal::Done),
            other => Err(SchedulerError::UnknownSignal { byte: other }),
        }
    }
}

/// Creates a connected sender/receiver pair.
///
/// The write side starts in non-blocking mode.
pub(crate) fn channel() -> Result<(SignalSender, SignalReceiver), SchedulerError> {
    let (reader, writer) = io::pipe().map_err(SchedulerError::channel)?;
    set_nonblocking(&writer, true)?;
    Ok((SignalSender { writer }, SignalReceiver { reader }))
}

fn set_nonblocking(fd: &impl AsRawFd, on: bool) -> Result<(), SchedulerError> {
    let raw = fd.as_raw_fd();
    let bits = fcntl(raw, FcntlArg::F_GETFL).map_err(SchedulerError::channel)?;
    let mut flags = OFlag::from_bits_truncate(bits);
    flags.set(OFlag::O_NONBLOCK, on);
    fcntl(raw, FcntlArg::F_SETFL(flags)).map_err(SchedulerError::channel)?;
    Ok(())
}

/// Write side, owned by the coordinating thread.
#[derive(Debug)]
pub(crate) struct SignalSender {
    writer: PipeWriter,
}

impl SignalSender {
    /// Writes one tick marker without blocking.
    ///
    /// Returns `Ok(false)` when the pipe buffer is full and the marker was dropped.
    pub(crate) fn send_tick(&mut self) -> Result<bool, SchedulerError> {
        loop {
            match self.writer.write(&[TICK]) {
                Ok(1) => return Ok(true),
                Ok(_) => return Ok(false),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(SchedulerError::channel(e)),
            }
        }
    }

    /// Switches the write side to blocking mode and writes the terminate marker.
    pub(crate) fn send_terminate(&mut self) -> Result<(), SchedulerError> {
        set_nonblocking(&self.writer, false)?;
        self.writer
            .write_all(&[TERMINATE])
            .map_err(SchedulerError::channel)
    }
}

/// Read side, handed to the work item through its [`WorkContext`](crate::WorkContext).
///
/// ## Example
/// ```no_run
/// use std::os::fd::AsFd;
/// use tickvisor::{Signal, Work, WorkContext};
///
/// struct Display;
///
/// impl Work for Display {
///     fn run(&self, ctx: &WorkContext<'_>) {
///         let Some(signal) = ctx.signal() else { return };
///         let _fd = signal.as_fd(); // multiplex with the display connection
///         match signal.recv() {
///             Ok(Signal::Next) => { /* redraw */ }
///             Ok(Signal::Done) | Err(_) => {}
///         }
///     }
/// }
/// ```
#[derive(Debug)]
pub struct SignalReceiver {
    reader: PipeReader,
}

impl SignalReceiver {
    /// Reads one signal, blocking until a byte is available.
    ///
    /// Poll the descriptor first when the call must not block.
    pub fn recv(&self) -> Result<Signal, SchedulerError> {
        let mut buf = [0u8; 1];
        loop {
            match (&self.reader).read(&mut buf) {
                Ok(0) => return Err(SchedulerError::ChannelClosed),
                Ok(_) => return Signal::decode(buf[0]),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(SchedulerError::channel(e)),
            }
        }
    }

    /// Discards every pending byte and returns how many were discarded.
    ///
    /// Switches the read side to non-blocking mode; only called by the
    /// worker thread on its way out, so that a blocking terminate write
    /// can always complete.
    pub(crate) fn drain(&self) -> Result<usize, SchedulerError> {
        set_nonblocking(&self.reader, true)?;
        let mut buf = [0u8; 64];
        let mut total = 0;
        loop {
            match (&self.reader).read(&mut buf) {
                Ok(0) => return Ok(total),
                Ok(n) => total += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(total),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(SchedulerError::channel(e)),
            }
        }
    }
}

impl AsFd for SignalReceiver {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.reader.as_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_tick_then_terminate_in_order() {
        let (mut tx, rx) = channel().unwrap();
        assert!(tx.send_tick().unwrap());
        tx.send_terminate().unwrap();
        assert_eq!(rx.recv().unwrap(), Signal::Next);
        assert_eq!(rx.recv().unwrap(), Signal::Done);
    }

    #[test]
    fn test_full_pipe_drops_tick_marker() {
        let (mut tx, rx) = channel().unwrap();
        let mut sent = 0usize;
        while tx.send_tick().unwrap() {
            sent += 1;
            assert!(sent < 10_000_000, "pipe never filled");
        }
        assert!(sent > 0);
        assert_eq!(rx.drain().unwrap(), sent);
    }

    #[test]
    fn test_terminate_is_delivered_when_pipe_is_full() {
        let (mut tx, rx) = channel().unwrap();
        while tx.send_tick().unwrap() {}

        let reader = thread::spawn(move || {
            let mut last = Signal::Next;
            while last != Signal::Done {
                last = rx.recv().unwrap();
            }
            last
        });
        tx.send_terminate().unwrap();
        assert_eq!(reader.join().unwrap(), Signal::Done);
    }

    #[test]
    fn test_closed_writer_reports_channel_closed() {
        let (tx, rx) = channel().unwrap();
        drop(tx);
        assert!(matches!(rx.recv(), Err(SchedulerError::ChannelClosed)));
    }

    #[test]
    fn test_unknown_byte_is_rejected() {
        assert!(matches!(
            Signal::decode(b'?'),
            Err(SchedulerError::UnknownSignal { byte: b'?' })
        ));
    }
}
