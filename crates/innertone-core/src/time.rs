//! Time primitives for InnerTone
//!
//! Every time-dependent component (animation, keep-alive, call timer) reads
//! time through the [`Clock`] trait so tests can drive it deterministically.

use std::ops::{Add, Sub};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Session time - microseconds since the clock origin
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug)]
pub struct SessionTime(pub i64);

impl SessionTime {
    pub const ZERO: SessionTime = SessionTime(0);

    #[inline]
    pub fn from_micros(micros: i64) -> Self {
        SessionTime(micros)
    }

    #[inline]
    pub fn from_millis(millis: i64) -> Self {
        SessionTime(millis * 1000)
    }

    #[inline]
    pub fn from_secs_f64(secs: f64) -> Self {
        SessionTime((secs * 1_000_000.0) as i64)
    }

    #[inline]
    pub fn as_micros(self) -> i64 {
        self.0
    }

    #[inline]
    pub fn as_millis(self) -> i64 {
        self.0 / 1000
    }

    #[inline]
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    #[inline]
    pub fn as_secs_f32(self) -> f32 {
        self.as_secs_f64() as f32
    }

    /// Duration elapsed since `earlier`, zero if `earlier` is in the future
    #[inline]
    pub fn saturating_since(self, earlier: SessionTime) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0).max(0) as u64)
    }
}

impl Add<Duration> for SessionTime {
    type Output = SessionTime;

    #[inline]
    fn add(self, rhs: Duration) -> Self::Output {
        SessionTime(self.0.saturating_add(rhs.as_micros() as i64))
    }
}

impl Sub<Duration> for SessionTime {
    type Output = SessionTime;

    #[inline]
    fn sub(self, rhs: Duration) -> Self::Output {
        SessionTime(self.0.saturating_sub(rhs.as_micros() as i64))
    }
}

/// Source of session time
pub trait Clock: Send + Sync {
    fn now(&self) -> SessionTime;
}

/// Monotonic wall clock anchored at construction
#[derive(Clone, Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> SessionTime {
        SessionTime(self.origin.elapsed().as_micros() as i64)
    }
}

/// Manually advanced clock; clones share the same time
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    micros: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.micros
            .fetch_add(by.as_micros() as i64, Ordering::SeqCst);
    }

    pub fn set(&self, at: SessionTime) {
        self.micros.store(at.0, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SessionTime {
        SessionTime(self.micros.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_time_conversions() {
        let t = SessionTime::from_millis(1500);
        assert_eq!(t.as_micros(), 1_500_000);
        assert!((t.as_secs_f64() - 1.5).abs() < 1e-9);
        assert_eq!((t + Duration::from_millis(500)).as_millis(), 2000);
        assert_eq!((t - Duration::from_secs(2)).as_millis(), -500);
    }

    #[test]
    fn test_saturating_since_never_negative() {
        let a = SessionTime::from_millis(10);
        let b = SessionTime::from_millis(30);
        assert_eq!(b.saturating_since(a), Duration::from_millis(20));
        assert_eq!(a.saturating_since(b), Duration::ZERO);
    }

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new();
        let view = clock.clone();
        clock.advance(Duration::from_millis(250));
        assert_eq!(view.now(), SessionTime::from_millis(250));
        view.set(SessionTime::from_millis(5));
        assert_eq!(clock.now().as_millis(), 5);
    }

    #[test]
    fn test_system_clock_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
