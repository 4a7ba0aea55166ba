//! Wall clock and the thresholds derived from it.
//!
//! The selector never reads the time itself. Callers derive [`Thresholds`]
//! from "now" in the user's time zone and pass them in; [`Thresholds::next_boundary`]
//! tells them when the derived values change next (the start of the next day).

use std::sync::Mutex;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Cut-offs the selector evaluates against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Tasks scheduled at or before this local wall-clock time are eligible.
    pub scheduled_before: NaiveDateTime,
    /// Recurring tasks completed before this instant count as open again.
    pub done_before: DateTime<Utc>,
    /// Local date of the day that began at `done_before`; recurrence rules
    /// are matched against it.
    pub today: NaiveDate,
}

impl Thresholds {
    /// Thresholds for `now`, where a day begins at `day_start` local time.
    pub fn at<Tz: TimeZone>(now: &DateTime<Tz>, day_start: NaiveTime) -> Self {
        let local = now.naive_local();
        let begin = day_begin(local, day_start);
        Self {
            scheduled_before: local,
            done_before: local_to_utc(now, begin),
            today: begin.date(),
        }
    }

    /// Instant at which thresholds derived for `now` stop being current.
    pub fn next_boundary<Tz: TimeZone>(now: &DateTime<Tz>, day_start: NaiveTime) -> DateTime<Utc> {
        let begin = day_begin(now.naive_local(), day_start);
        local_to_utc(now, begin + Duration::days(1))
    }
}

/// Start of the (possibly shifted) day containing `local`.
fn day_begin(local: NaiveDateTime, day_start: NaiveTime) -> NaiveDateTime {
    let date = if local.time() >= day_start {
        local.date()
    } else {
        local.date() - Duration::days(1)
    };
    date.and_time(day_start)
}

/// Resolve a local wall-clock time in `now`'s zone. Times skipped by a DST
/// jump fall back to `now`'s offset.
fn local_to_utc<Tz: TimeZone>(now: &DateTime<Tz>, local: NaiveDateTime) -> DateTime<Utc> {
    match now.timezone().from_local_datetime(&local).earliest() {
        Some(dt) => dt.with_timezone(&Utc),
        None => {
            let offset = i64::from(now.offset().fix().local_minus_utc());
            Utc.from_utc_datetime(&(local - Duration::seconds(offset)))
        }
    }
}
