//! # Counting semaphore for thread handshakes.
//!
//! [`Semaphore`] is the blocking wait/post primitive used between the
//! coordinating thread and the worker threads:
//! - a dedicated worker parks on its private *start* semaphore between ticks;
//! - the registry parks on the shared *completion* semaphore until every
//!   tick-synchronous item has finished;
//! - the shared pool counts finished units on its own semaphore.
//!
//! Unlike `tokio::sync::Semaphore` this one blocks the OS thread and has no
//! permits-as-guards API: `post` and `wait` are independent calls made from
//! different threads.

use parking_lot::{Condvar, Mutex};

/// Blocking counting semaphore.
#[derive(Debug, Default)]
pub struct Semaphore {
    count: Mutex<usize>,
    cv: Condvar,
}

impl Semaphore {
    /// Creates a semaphore with `initial` available counts.
    pub fn new(initial: usize) -> Self {
        Self {
            count: Mutex::new(initial),
            cv: Condvar::new(),
        }
    }

    /// Increments the count and wakes one waiter.
    pub fn post(&self) {
        let mut count = self.count.lock();
        *count += 1;
        self.cv.notify_one();
    }

    /// Increments the count by `n` and wakes up to `n` waiters.
    pub fn post_n(&self, n: usize) {
        if n == 0 {
            return;
        }
        let mut count = self.count.lock();
        *count += n;
        if n == 1 {
            self.cv.notify_one();
        } else {
            self.cv.notify_all();
        }
    }

    /// Blocks until the count is positive, then decrements it.
    pub fn wait(&self) {
        let mut count = self.count.lock();
        while *count == 0 {
            self.cv.wait(&mut count);
        }
        *count -= 1;
    }

    /// Decrements the count if it is positive; never blocks.
    ///
    /// Returns `true` when a count was taken.
    pub fn try_wait(&self) -> bool {
        let mut count = self.count.lock();
        if *count == 0 {
            false
        } else {
            *count -= 1;
            true
        }
    }

    /// Takes every available count at once and returns how many were taken.
    pub fn drain(&self) -> usize {
        let mut count = self.count.lock();
        std::mem::take(&mut *count)
    }

    /// Current count (racy by nature, meant for diagnostics and tests).
    pub fn available(&self) -> usize {
        *self.count.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_post_then_wait_does_not_block() {
        let sem = Semaphore::new(0);
        sem.post();
        sem.wait();
        assert_eq!(sem.available(), 0);
    }

    #[test]
    fn test_try_wait_on_empty() {
        let sem = Semaphore::new(0);
        assert!(!sem.try_wait());
        sem.post_n(2);
        assert!(sem.try_wait());
        assert!(sem.try_wait());
        assert!(!sem.try_wait());
    }

    #[test]
    fn test_drain_takes_everything() {
        let sem = Semaphore::new(3);
        assert_eq!(sem.drain(), 3);
        assert_eq!(sem.drain(), 0);
    }

    #[test]
    fn test_wait_blocks_until_posted() {
        let sem = Arc::new(Semaphore::new(0));
        let poster = Arc::clone(&sem);
        let h = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            poster.post();
        });
        sem.wait();
        h.join().unwrap();
        assert_eq!(sem.available(), 0);
    }

    #[test]
    fn test_post_n_wakes_multiple_waiters() {
        let sem = Arc::new(Semaphore::new(0));
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let s = Arc::clone(&sem);
                thread::spawn(move || s.wait())
            })
            .collect();
        thread::sleep(Duration::from_millis(10));
        sem.post_n(4);
        for w in waiters {
            w.join().unwrap();
        }
        assert_eq!(sem.available(), 0);
    }
}
