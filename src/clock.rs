//! Monotonic time sources.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Source of monotonic, sub-millisecond timestamps.
pub trait Clock: Send + Sync {
    /// Milliseconds since the clock's origin.
    fn now_ms(&self) -> f64;
}

/// Wall-clock backed monotonic clock. The origin is the moment of creation,
/// which for a session is roughly page load.
#[derive(Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Manually driven clock for replay and tests.
///
/// Stores the f64 bit pattern in an atomic so it can be shared between the
/// session and a benchmark running on a blocking worker.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_bits: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: f64) -> Self {
        Self {
            now_bits: AtomicU64::new(start_ms.to_bits()),
        }
    }

    /// Move the clock forward. Negative or non-finite steps are ignored.
    pub fn advance(&self, ms: f64) {
        if !ms.is_finite() || ms <= 0.0 {
            return;
        }
        let _ = self
            .now_bits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |bits| {
                Some((f64::from_bits(bits) + ms).to_bits())
            });
    }

    /// Jump to an absolute time. Never moves backwards.
    pub fn set(&self, ms: f64) {
        if !ms.is_finite() {
            return;
        }
        let _ = self
            .now_bits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |bits| {
                let current = f64::from_bits(bits);
                (ms > current).then(|| ms.to_bits())
            });
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        f64::from_bits(self.now_bits.load(Ordering::SeqCst))
    }
}
