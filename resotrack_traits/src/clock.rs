use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const SECS_PER_HOUR: f64 = 3600.0;

/// Monotonic clock abstraction for acquisition pacing and run time.
///
/// - now(): returns a monotonic Instant
/// - sleep(): sleeps for the provided duration (implementations may simulate)
/// - hours_since(): elapsed run time in hours, the time axis of a reader's series
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, d: Duration);

    /// Milliseconds elapsed since `epoch`, saturating at 0 on underflow.
    fn ms_since(&self, epoch: Instant) -> u64 {
        let dur = self.now().saturating_duration_since(epoch);
        dur.as_millis().min(u128::from(u64::MAX)) as u64
    }

    /// Hours elapsed since `epoch` as a float, saturating at 0.
    fn hours_since(&self, epoch: Instant) -> f64 {
        self.now().saturating_duration_since(epoch).as_secs_f64() / SECS_PER_HOUR
    }
}

/// Real-time monotonic clock backed by std::time::Instant.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn sleep(&self, d: Duration) {
        if d.is_zero() {
            return;
        }
        thread::sleep(d);
    }
}

/// Deterministic clock whose time only moves when told to.
///
/// now() = origin + offset; sleep(d) advances the offset by d without blocking.
/// Clones share the same offset, so a test can keep one handle and give
/// another to the code under test.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    pub fn advance(&self, d: Duration) {
        if let Ok(mut off) = self.offset.lock() {
            *off = off.saturating_add(d);
        }
    }

    pub fn advance_hours(&self, hours: f64) {
        if hours.is_finite() && hours > 0.0 {
            self.advance(Duration::from_secs_f64(hours * SECS_PER_HOUR));
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.offset.lock().map(|g| *g).unwrap_or(Duration::ZERO)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn sleep(&self, d: Duration) {
        self.advance(d);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_sleep_advances_shared_time() {
        let clock = ManualClock::new();
        let handle = clock.clone();
        let epoch = clock.now();
        handle.sleep(Duration::from_secs(1800));
        assert_eq!(clock.ms_since(epoch), 1_800_000);
        assert!((clock.hours_since(epoch) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn hours_since_saturates_before_epoch() {
        let clock = ManualClock::new();
        clock.advance_hours(2.0);
        let later = clock.now();
        let clock2 = ManualClock::new();
        assert_eq!(clock2.hours_since(later + Duration::from_secs(10)), 0.0);
    }
}
