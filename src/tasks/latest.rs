//! # Latest-result cell.
//!
//! [`Latest`] stores the most recent result of a periodic unit so that holders
//! can read it at any time between ticks. Writes come from whichever thread
//! runs the unit; reads come from handle holders. Every write bumps a version
//! counter, which lets readers tell whether anything was produced since they
//! last looked.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Mutex-guarded latest value with a write counter.
///
/// # Example
/// ```
/// use tickvisor::Latest;
///
/// let cell = Latest::new(0u32);
/// assert_eq!(cell.version(), 0);
/// cell.set(42);
/// assert_eq!(cell.get(), 42);
/// assert_eq!(cell.version(), 1);
/// ```
#[derive(Debug, Default)]
pub struct Latest<R> {
    value: Mutex<R>,
    version: AtomicU64,
}

impl<R> Latest<R> {
    /// Creates a cell holding `initial` at version 0.
    pub fn new(initial: R) -> Self {
        Self {
            value: Mutex::new(initial),
            version: AtomicU64::new(0),
        }
    }

    /// Replaces the value.
    pub fn set(&self, value: R) {
        drop(self.replace(value));
    }

    /// Replaces the value and returns the previous one.
    pub fn replace(&self, value: R) -> R {
        let mut guard = self.value.lock();
        let old = std::mem::replace(&mut *guard, value);
        self.version.fetch_add(1, Ordering::AcqRel);
        old
    }

    /// Runs `f` with a reference to the current value.
    pub fn with<T>(&self, f: impl FnOnce(&R) -> T) -> T {
        let guard = self.value.lock();
        f(&*guard)
    }

    /// Number of writes so far.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}

impl<R: Clone> Latest<R> {
    /// Returns a copy of the current value.
    pub fn get(&self) -> R {
        self.value.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn test_replace_returns_previous() {
        let cell = Latest::new(String::from("a"));
        assert_eq!(cell.replace("b".into()), "a");
        assert_eq!(cell.with(|s| s.len()), 1);
        assert_eq!(cell.get(), "b");
        assert_eq!(cell.version(), 1);
    }

    #[test]
    fn test_writes_from_other_threads_are_visible() {
        let cell = Arc::new(Latest::<u64>::default());
        let writers: Vec<_> = (0..4)
            .map(|i| {
                let cell = Arc::clone(&cell);
                thread::spawn(move || cell.set(i))
            })
            .collect();
        for w in writers {
            w.join().unwrap();
        }
        assert_eq!(cell.version(), 4);
        assert!(cell.get() < 4);
    }
}
