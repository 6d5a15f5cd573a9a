//! Time source for verification.
//!
//! A verification reads the clock exactly once; the resulting [`CheckTime`]
//! supplies both the calendar date used for expiry and the audit timestamp.

use chrono::{DateTime, Local, NaiveDate, NaiveTime, Utc};
use std::sync::{Mutex, PoisonError};

/// One reading of the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckTime {
    /// Host-local calendar date, compared against `expiryDate`.
    pub date: NaiveDate,
    /// Instant of the reading.
    pub at: DateTime<Utc>,
}

impl CheckTime {
    /// Reading taken from a local timestamp.
    #[must_use]
    pub fn from_local(now: DateTime<Local>) -> Self {
        Self {
            date: now.date_naive(),
            at: now.with_timezone(&Utc),
        }
    }

    /// Reading for noon UTC on `date`.
    #[must_use]
    pub fn on(date: NaiveDate) -> Self {
        Self {
            date,
            at: date.and_time(NaiveTime::MIN).and_utc() + chrono::Duration::hours(12),
        }
    }

    /// Returns this reading with its date raised to at least `floor`.
    #[must_use]
    pub fn not_before(self, floor: NaiveDate) -> Self {
        Self {
            date: self.date.max(floor),
            at: self.at,
        }
    }
}

/// Source of [`CheckTime`] readings.
pub trait Clock: Send + Sync {
    fn now(&self) -> CheckTime;
}

/// The host's wall clock in its local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> CheckTime {
        CheckTime::from_local(Local::now())
    }
}

/// A clock that stays on a set date until moved.
#[derive(Debug)]
pub struct ManualClock {
    date: Mutex<NaiveDate>,
}

impl ManualClock {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date: Mutex::new(date),
        }
    }

    /// Moves the clock to `date`, forwards or backwards.
    pub fn set(&self, date: NaiveDate) {
        *self.date.lock().unwrap_or_else(PoisonError::into_inner) = date;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> CheckTime {
        CheckTime::on(*self.date.lock().unwrap_or_else(PoisonError::into_inner))
    }
}
