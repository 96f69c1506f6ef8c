//! Wall-clock source for capture timestamps.
//!
//! State types never read the system time themselves; the session passes
//! `now` in, so tests can drive time explicitly.

use chrono::{DateTime, Utc};

/// Source of capture timestamps.
pub trait Clock {
    /// Current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Real system time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that advances a fixed step on every read.
#[cfg(test)]
#[derive(Debug)]
pub struct StepClock {
    current: std::cell::Cell<DateTime<Utc>>,
    step: chrono::Duration,
}

#[cfg(test)]
impl StepClock {
    /// Start at 2024-05-01 20:00 UTC, one second per read.
    pub fn new() -> Self {
        use chrono::TimeZone;
        Self {
            current: std::cell::Cell::new(Utc.with_ymd_and_hms(2024, 5, 1, 20, 0, 0).unwrap()),
            step: chrono::Duration::seconds(1),
        }
    }
}

#[cfg(test)]
impl Clock for StepClock {
    fn now(&self) -> DateTime<Utc> {
        let now = self.current.get();
        self.current.set(now + self.step);
        now
    }
}
