//! # Registry configuration.
//!
//! Provides [`Config`], the centralized settings for a [`Registry`](crate::Registry).
//!
//! ## Clamping
//! Every numeric field has a minimum; use the `*_clamped` accessors instead of
//! reading fields directly so that out-of-range values never reach the runtime.
//! - `pool_size = 0` → 1 pool thread
//! - `unused_max = 0` → evict after 1 unheld tick
//! - `bus_capacity = 0` → 1 slot

/// Configuration for the scheduler runtime.
///
/// ## Field semantics
/// - `pool_size`: number of shared pool threads (min 1)
/// - `unused_max`: consecutive unheld ticks before eviction (min 1)
/// - `bus_capacity`: event bus ring buffer size (min 1)
/// - `thread_prefix`: prefix of every OS thread name spawned by the registry
///
/// ## Notes
/// All fields are public for flexibility. Prefer the helper accessors.
#[derive(Clone, Debug)]
pub struct Config {
    /// Number of threads in the shared pool.
    pub pool_size: usize,

    /// Consecutive ticks an item may be held only by the registry before it
    /// is evicted.
    ///
    /// Counted on every tick, independently of the item's period.
    pub unused_max: u32,

    /// Capacity of the event bus broadcast channel ring buffer.
    ///
    /// A listener lagging more than `bus_capacity` events behind skips the
    /// oldest ones.
    pub bus_capacity: usize,

    /// Prefix for worker, pool and subscriber thread names.
    pub thread_prefix: String,
}

impl Config {
    /// Returns the pool size clamped to a minimum of 1.
    #[inline]
    pub fn pool_size_clamped(&self) -> usize {
        self.pool_size.max(1)
    }

    /// Returns the eviction threshold clamped to a minimum of 1.
    #[inline]
    pub fn unused_max_clamped(&self) -> u32 {
        self.unused_max.max(1)
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `pool_size = 2`
    /// - `unused_max = 5`
    /// - `bus_capacity = 1024`
    /// - `thread_prefix = "tick"`
    fn default() -> Self {
        Self {
            pool_size: 2,
            unused_max: 5,
            bus_capacity: 1024,
            thread_prefix: "tick".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.pool_size_clamped(), 2);
        assert_eq!(cfg.unused_max_clamped(), 5);
        assert_eq!(cfg.bus_capacity_clamped(), 1024);
        assert_eq!(cfg.thread_prefix, "tick");
    }

    #[test]
    fn test_zero_values_are_clamped() {
        let cfg = Config {
            pool_size: 0,
            unused_max: 0,
            bus_capacity: 0,
            ..Config::default()
        };
        assert_eq!(cfg.pool_size_clamped(), 1);
        assert_eq!(cfg.unused_max_clamped(), 1);
        assert_eq!(cfg.bus_capacity_clamped(), 1);
    }
}
