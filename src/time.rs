//! Time sources used by frame timing and pose prediction.
//!
//! Real sessions run on a monotonic wall clock; debug sessions run on a
//! virtual clock whose vsync waits advance time instantly, so headless
//! test loops do not sleep.

use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

/// Absolute-time source. Timestamps are seconds since an arbitrary epoch
/// fixed for the lifetime of the source.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> f64;

    /// Block until the given absolute time, returning the time actually
    /// reached. Returns immediately if the time is already past.
    fn wait_until(&self, abs_time: f64) -> f64;
}

/// Steady clock backed by `Instant`, epoch at construction.
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicClock {
    fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    fn wait_until(&self, abs_time: f64) -> f64 {
        let now = self.now();
        if abs_time > now {
            std::thread::sleep(Duration::from_secs_f64(abs_time - now));
        }
        self.now()
    }
}

/// Virtual clock for debug sessions. `wait_until` jumps time forward
/// without sleeping; `now` never moves backwards.
pub struct SimulatedClock {
    now: Mutex<f64>,
}

impl SimulatedClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(0.0),
        }
    }

    /// Advance virtual time by `dt` seconds.
    pub fn advance(&self, dt: f64) {
        if let Ok(mut now) = self.now.lock() {
            *now += dt.max(0.0);
        }
    }
}

impl Default for SimulatedClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SimulatedClock {
    fn now(&self) -> f64 {
        match self.now.lock() {
            Ok(now) => *now,
            Err(_) => 0.0,
        }
    }

    fn wait_until(&self, abs_time: f64) -> f64 {
        match self.now.lock() {
            Ok(mut now) => {
                if abs_time > *now {
                    *now = abs_time;
                }
                *now
            }
            Err(_) => abs_time,
        }
    }
}

fn shared_clock() -> &'static MonotonicClock {
    static CLOCK: OnceLock<MonotonicClock> = OnceLock::new();
    CLOCK.get_or_init(MonotonicClock::new)
}

/// Global high-resolution time in seconds, on the same basis as sensor
/// sample timestamps for real sessions.
pub fn now_seconds() -> f64 {
    shared_clock().now()
}

/// Sleep until the given absolute time on the global clock.
pub fn wait_till_time(abs_time: f64) -> f64 {
    shared_clock().wait_until(abs_time)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_clock_moves_forward() {
        let clock = MonotonicClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn simulated_wait_advances_without_sleeping() {
        let clock = SimulatedClock::new();
        assert_eq!(clock.now(), 0.0);
        let reached = clock.wait_until(5.0);
        assert_eq!(reached, 5.0);
        assert_eq!(clock.now(), 5.0);
        // Waiting for the past is a no-op.
        assert_eq!(clock.wait_until(1.0), 5.0);
    }

    #[test]
    fn simulated_advance_accumulates() {
        let clock = SimulatedClock::new();
        clock.advance(0.25);
        clock.advance(0.25);
        assert!((clock.now() - 0.5).abs() < 1e-12);
    }
}
