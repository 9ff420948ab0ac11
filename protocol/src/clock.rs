//! # Commit Clocks
//!
//! Every committed block carries one timestamp (Unix seconds) and every
//! event emitted inside that block reports it. The timestamp comes from a
//! [`Clock`] at commit time, not from whenever the caller built the
//! transaction.
//!
//! [`SystemClock`] reads wall time. [`ManualClock`] is pinned by hand so
//! tests can assert exact event timestamps.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Source of commit timestamps.
pub trait Clock: Send + Sync {
    /// Current time in Unix seconds.
    fn now(&self) -> u64;
}

/// Wall-clock time via `chrono`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        chrono::Utc::now().timestamp().max(0) as u64
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start)),
        }
    }

    /// Pins the timestamp the next commit will observe.
    pub fn set(&self, timestamp: u64) {
        self.now.store(timestamp, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new(100);
        let other = clock.clone();
        clock.set(10_000_000_000);
        assert_eq!(other.now(), 10_000_000_000);
        other.advance(5);
        assert_eq!(clock.now(), 10_000_000_005);
    }

    #[test]
    fn system_clock_is_after_2020() {
        assert!(SystemClock.now() > 1_577_836_800);
    }
}
