//! Time source for the poll loop.
//!
//! The loop never calls `std::thread::sleep` or `Local::now` directly, so
//! tests can drive many iterations without waiting.

use std::time::Duration;

use chrono::{DateTime, Local};

pub trait Clock {
    /// Current local time, used for report headers.
    fn now(&self) -> DateTime<Local>;

    /// Blocks the loop for `duration`.
    fn sleep(&mut self, duration: Duration);
}

/// Wall clock backed by the OS.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }

    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Deterministic clock: `sleep` returns immediately and advances `now`.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: DateTime<Local>,
    sleeps: Vec<Duration>,
}

impl ManualClock {
    pub fn starting_at(now: DateTime<Local>) -> Self {
        Self {
            now,
            sleeps: Vec::new(),
        }
    }

    /// Every duration passed to `sleep`, in order.
    pub fn sleeps(&self) -> &[Duration] {
        &self.sleeps
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        self.now
    }

    fn sleep(&mut self, duration: Duration) {
        self.sleeps.push(duration);
        if let Ok(delta) = chrono::Duration::from_std(duration) {
            self.now += delta;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn manual_clock_advances_on_sleep() {
        let start = Local.with_ymd_and_hms(2024, 3, 19, 10, 5, 39).unwrap();
        let mut clock = ManualClock::starting_at(start);

        clock.sleep(Duration::from_secs(1));
        clock.sleep(Duration::from_millis(500));

        assert_eq!(
            clock.sleeps(),
            &[Duration::from_secs(1), Duration::from_millis(500)]
        );
        assert_eq!(clock.now() - start, chrono::Duration::milliseconds(1500));
    }
}
