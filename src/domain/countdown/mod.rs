//! Countdown to the sale deadline.

pub mod clock;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub use clock::CountdownClock;

const SECS_PER_MINUTE: u64 = 60;
const SECS_PER_HOUR: u64 = 60 * SECS_PER_MINUTE;
const SECS_PER_DAY: u64 = 24 * SECS_PER_HOUR;

/// Remaining time split into day/hour/minute/second buckets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Countdown {
    pub days: u64,
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
}

impl Countdown {
    pub const ZERO: Countdown = Countdown {
        days: 0,
        hours: 0,
        minutes: 0,
        seconds: 0,
    };

    pub fn from_secs(remaining: u64) -> Self {
        Self {
            days: remaining / SECS_PER_DAY,
            hours: (remaining % SECS_PER_DAY) / SECS_PER_HOUR,
            minutes: (remaining % SECS_PER_HOUR) / SECS_PER_MINUTE,
            seconds: remaining % SECS_PER_MINUTE,
        }
    }

    pub fn total_secs(&self) -> u64 {
        self.days * SECS_PER_DAY
            + self.hours * SECS_PER_HOUR
            + self.minutes * SECS_PER_MINUTE
            + self.seconds
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl std::fmt::Display for Countdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}d {:02}h {:02}m {:02}s",
            self.days, self.hours, self.minutes, self.seconds
        )
    }
}

/// Time left until `deadline`, clamped at zero once it has passed.
pub fn tick(deadline: DateTime<Utc>, now: DateTime<Utc>) -> Countdown {
    let remaining = (deadline - now).num_seconds();
    if remaining <= 0 {
        return Countdown::ZERO;
    }
    Countdown::from_secs(remaining as u64)
}
