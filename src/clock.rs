//! Wall-clock source for recency checks.
//!
//! The engine reads "now" through [`Clock`] so tests can pin it with
//! [`FixedClock`] while tokio's paused timer drives the sleeps.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

/// Source of the current UTC time.
pub trait Clock: Send + Sync {
    /// Current time in UTC, without zone.
    fn now_utc(&self) -> NaiveDateTime;
}

/// Reads the system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> NaiveDateTime {
        Utc::now().naive_utc()
    }
}

/// Clock that only moves when told to. Millisecond resolution.
///
/// ```
/// use chrono::{Duration, NaiveDate};
/// use otp_watch::{Clock, FixedClock};
///
/// let start = NaiveDate::from_ymd_opt(2026, 7, 17).unwrap().and_hms_opt(9, 0, 0).unwrap();
/// let clock = FixedClock::new(start);
/// clock.advance(Duration::seconds(90));
/// assert_eq!(clock.now_utc(), start + Duration::seconds(90));
/// ```
#[derive(Debug)]
pub struct FixedClock {
    millis: AtomicI64,
}

impl FixedClock {
    /// Creates a clock reading `now`.
    #[must_use]
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            millis: AtomicI64::new(now.and_utc().timestamp_millis()),
        }
    }

    /// Moves the clock to `now`.
    pub fn set(&self, now: NaiveDateTime) {
        self.millis
            .store(now.and_utc().timestamp_millis(), Ordering::SeqCst);
    }

    /// Moves the clock forward (or back, for a negative `by`).
    pub fn advance(&self, by: Duration) {
        self.millis.fetch_add(by.num_milliseconds(), Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_utc(&self) -> NaiveDateTime {
        DateTime::<Utc>::from_timestamp_millis(self.millis.load(Ordering::SeqCst))
            .map(|dt| dt.naive_utc())
            .unwrap_or_default()
    }
}
