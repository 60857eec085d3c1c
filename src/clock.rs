//! Monotonic time source used for hysteresis, boost and cooldown deadlines.
//!
//! Timestamps are `Duration`s since the clock's own epoch so they can be
//! stored in atomics (as milliseconds) and advanced by hand in tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Source of monotonic timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;
}

/// Wall-clock backed implementation, epoch is construction time.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Hand-driven clock for simulations and tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(at: Duration) -> Self {
        Self {
            now_ms: AtomicU64::new(as_millis(at)),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now_ms.fetch_add(as_millis(by), Ordering::SeqCst);
    }

    pub fn set(&self, at: Duration) {
        self.now_ms.store(as_millis(at), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_millis(self.now_ms.load(Ordering::SeqCst))
    }
}

/// Converts a timestamp to the millisecond representation kept in atomics.
pub fn as_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
