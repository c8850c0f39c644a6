//! Injectable time source.
//!
//! Everything that reads the current time takes a `&dyn Clock` so tests can
//! pin `now` to a fixed value and decay math stays reproducible.

use std::sync::atomic::{AtomicI64, Ordering};

/// Milliseconds since the Unix epoch.
pub type Millis = i64;

/// Time source consumed by the router, guardians, and recall index.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> Millis;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> Millis {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Fixed clock for tests. `advance` moves time forward without sleeping.
#[derive(Debug, Default)]
pub struct FixedClock {
    now: AtomicI64,
}

impl FixedClock {
    pub fn at(now: Millis) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    pub fn set(&self, now: Millis) {
        self.now.store(now, Ordering::Relaxed);
    }

    pub fn advance(&self, delta_ms: Millis) {
        self.now.fetch_add(delta_ms, Ordering::Relaxed);
    }
}

impl Clock for FixedClock {
    fn now_millis(&self) -> Millis {
        self.now.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_advances() {
        let clock = FixedClock::at(1_000);
        assert_eq!(clock.now_millis(), 1_000);
        clock.advance(500);
        assert_eq!(clock.now_millis(), 1_500);
    }

    #[test]
    fn system_clock_is_nonzero() {
        assert!(SystemClock.now_millis() > 0);
    }
}
