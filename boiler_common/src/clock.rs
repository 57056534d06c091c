//! Clock abstraction.
//!
//! Everything on the control path measures time through this trait rather
//! than calling `SystemTime`/`Instant` directly, so tests can advance time
//! deterministically instead of racing the wall clock. Wall time is only
//! ever used for log timestamps and on-disk state-file age checks; every
//! integrator, slew limiter, EMA, and duty-cycle timer on the control path
//! uses `monotonic()`.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Source of wall-clock and monotonic time.
///
/// `wall()` may jump (NTP step, DST, operator changing the system clock).
/// `monotonic()` never goes backwards and is unaffected by wall-clock
/// adjustments; all inter-tick deltas must be computed from it.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Seconds since the Unix epoch, wall-clock time.
    fn wall(&self) -> f64;

    /// Seconds since an arbitrary, clock-specific origin. Only differences
    /// between two calls are meaningful.
    fn monotonic(&self) -> f64;
}

/// Production clock backed by `SystemTime` and `Instant`.
#[derive(Debug, Clone, Default)]
pub struct RealClock {
    origin: Option<Instant>,
}

impl RealClock {
    pub fn new() -> Self {
        Self {
            origin: Some(Instant::now()),
        }
    }
}

impl Clock for RealClock {
    fn wall(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64()
    }

    fn monotonic(&self) -> f64 {
        let origin = self.origin.unwrap_or_else(Instant::now);
        Instant::now().saturating_duration_since(origin).as_secs_f64()
    }
}

#[derive(Debug)]
struct FakeClockState {
    wall: f64,
    mono: f64,
}

/// Deterministic clock for tests. `advance()` moves both wall and
/// monotonic time forward by the same amount; `jump_wall()` moves only
/// wall time, to exercise the "NTP step must not affect control" invariant.
#[derive(Debug, Clone)]
pub struct FakeClock {
    state: Arc<Mutex<FakeClockState>>,
}

impl FakeClock {
    pub fn new(start_wall: f64) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeClockState {
                wall: start_wall,
                mono: 0.0,
            })),
        }
    }

    /// Advance both wall and monotonic time by `dt` seconds. Panics on
    /// negative `dt` — monotonic time must never go backwards.
    pub fn advance(&self, dt: f64) {
        assert!(dt >= 0.0, "FakeClock::advance requires dt >= 0");
        let mut s = self.state.lock().expect("fake clock poisoned");
        s.wall += dt;
        s.mono += dt;
    }

    /// Shift wall-clock time only (simulates an NTP step / DST change)
    /// without touching monotonic time.
    pub fn jump_wall(&self, delta: f64) {
        let mut s = self.state.lock().expect("fake clock poisoned");
        s.wall += delta;
    }
}

impl Clock for FakeClock {
    fn wall(&self) -> f64 {
        self.state.lock().expect("fake clock poisoned").wall
    }

    fn monotonic(&self) -> f64 {
        self.state.lock().expect("fake clock poisoned").mono
    }
}

/// Convert a `Duration` to fractional seconds without panicking on
/// unusually large durations.
pub fn duration_secs(d: Duration) -> f64 {
    d.as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_clock_advances_both_axes_together() {
        let clock = FakeClock::new(1_000.0);
        assert_eq!(clock.wall(), 1_000.0);
        assert_eq!(clock.monotonic(), 0.0);
        clock.advance(5.0);
        assert_eq!(clock.wall(), 1_005.0);
        assert_eq!(clock.monotonic(), 5.0);
    }

    #[test]
    fn wall_jump_does_not_move_monotonic() {
        let clock = FakeClock::new(0.0);
        clock.advance(10.0);
        clock.jump_wall(3600.0);
        assert_eq!(clock.monotonic(), 10.0);
        assert_eq!(clock.wall(), 3_610.0);
    }

    #[test]
    #[should_panic(expected = "dt >= 0")]
    fn negative_advance_panics() {
        let clock = FakeClock::new(0.0);
        clock.advance(-1.0);
    }

    #[test]
    fn real_clock_monotonic_is_nondecreasing() {
        let clock = RealClock::new();
        let a = clock.monotonic();
        let b = clock.monotonic();
        assert!(b >= a);
    }
}
