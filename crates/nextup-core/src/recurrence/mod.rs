//! Recurrence rules and the calendar matching engine.
//!
//! A [`Recurrence`] describes which dates a recurring task is due on. A task
//! may carry several rules; a date matches when any of them does, which is
//! how "every Tuesday and Wednesday" is written as two weekly rules.
//!
//! ## Ordinal
//!
//! The `ordinal` field records which week of its month the start date falls
//! in: `(day - 1) / 7 + 1`, so 1..=5. The value [`LAST_WEEK`] (6) instead
//! anchors the rule to the end of the month and is only accepted for start
//! dates in the last seven days of their month. The two encodings differ
//! only when the target month has a different length than the start month:
//!
//! | start        | ordinal | target month | anchored day        |
//! |--------------|---------|--------------|---------------------|
//! | Mar 31       | 5       | June         | 30 (clamped)        |
//! | Mar 31       | 6       | June         | 30 (month end)      |
//! | Feb 29       | 5       | March        | 29                  |
//! | Feb 29       | 6       | March        | 31 (month end)      |
//! | Feb 29 2020  | 5       | Feb 2023     | 28 (clamped)        |
//!
//! For `WeekOfMonth` rules the ordinal selects the n-th occurrence of the
//! start's weekday, or the last occurrence when it is [`LAST_WEEK`].
//!
//! Matching is pure and never fails; malformed rules are rejected by
//! [`Recurrence::validate`] when they are created.

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::RuleError;
use crate::task::TaskId;

/// Ordinal value anchoring a rule to the end of the month.
pub const LAST_WEEK: i32 = 6;

/// Number of periods [`next_occurrence`] scans before giving up.
const SCAN_PERIODS: i64 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceKind {
    /// Every `step` days.
    Day,
    /// Every `step` weeks on the start's weekday.
    Week,
    /// Every `step` months on the start's day of month.
    DayOfMonth,
    /// Every `step` months on the n-th (or last) start weekday.
    WeekOfMonth,
    /// Every `step` years on the start's month and day.
    Year,
}

impl RecurrenceKind {
    /// Kinds whose match depends on month length, and therefore on the ordinal.
    pub fn is_month_anchored(self) -> bool {
        matches!(
            self,
            RecurrenceKind::DayOfMonth | RecurrenceKind::WeekOfMonth | RecurrenceKind::Year
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RecurrenceKind::Day => "day",
            RecurrenceKind::Week => "week",
            RecurrenceKind::DayOfMonth => "day_of_month",
            RecurrenceKind::WeekOfMonth => "week_of_month",
            RecurrenceKind::Year => "year",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "day" => Some(RecurrenceKind::Day),
            "week" => Some(RecurrenceKind::Week),
            "day_of_month" => Some(RecurrenceKind::DayOfMonth),
            "week_of_month" => Some(RecurrenceKind::WeekOfMonth),
            "year" => Some(RecurrenceKind::Year),
            _ => None,
        }
    }
}

/// A calendar pattern: kind, start, interval and month anchoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Recurrence {
    pub start: NaiveDate,
    pub kind: RecurrenceKind,
    pub step: i32,
    pub ordinal: i32,
}

/// A recurrence owned by a task, as persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub task_id: TaskId,
    #[serde(flatten)]
    pub recurrence: Recurrence,
}

impl Recurrence {
    /// Rule anchored on the start's week of month.
    pub fn new(start: NaiveDate, kind: RecurrenceKind, step: i32) -> Self {
        Self {
            start,
            kind,
            step,
            ordinal: week_of_month(start),
        }
    }

    /// Rule anchored on the end of the month. Valid only when `start` lies in
    /// the last week of its month.
    pub fn anchored_to_month_end(start: NaiveDate, kind: RecurrenceKind, step: i32) -> Self {
        Self {
            start,
            kind,
            step,
            ordinal: LAST_WEEK,
        }
    }

    pub fn is_month_end_anchored(&self) -> bool {
        self.ordinal == LAST_WEEK
    }

    /// Check that the rule is well formed and that its ordinal is the one an
    /// editor would derive again from the start date.
    pub fn validate(&self) -> Result<(), RuleError> {
        if self.step <= 0 {
            return Err(RuleError::NonPositiveStep(self.step));
        }
        if !(1..=LAST_WEEK).contains(&self.ordinal) {
            return Err(RuleError::OrdinalOutOfRange(self.ordinal));
        }
        if !self.kind.is_month_anchored() {
            return Ok(());
        }
        if self.ordinal == LAST_WEEK {
            if !is_last_week(self.start) {
                return Err(RuleError::NotMonthEnd(self.start));
            }
        } else {
            let expected = week_of_month(self.start);
            if self.ordinal != expected {
                return Err(RuleError::OrdinalMismatch {
                    ordinal: self.ordinal,
                    start: self.start,
                    expected,
                });
            }
        }
        Ok(())
    }

    pub fn owned_by(self, task_id: TaskId) -> RecurrenceRule {
        RecurrenceRule {
            task_id,
            recurrence: self,
        }
    }

    /// Whether this rule fires on `date`.
    pub fn matches(&self, date: NaiveDate) -> bool {
        if date < self.start || self.step <= 0 {
            return false;
        }
        let step = i64::from(self.step);
        let start = self.start;

        match self.kind {
            RecurrenceKind::Day => (date - start).num_days() % step == 0,
            RecurrenceKind::Week => {
                date.weekday() == start.weekday() && ((date - start).num_days() / 7) % step == 0
            }
            RecurrenceKind::DayOfMonth => {
                i64::from(months_between(start, date)) % step == 0
                    && date.day() == self.anchored_day(date.year(), date.month())
            }
            RecurrenceKind::WeekOfMonth => {
                if i64::from(months_between(start, date)) % step != 0
                    || date.weekday() != start.weekday()
                {
                    return false;
                }
                if self.ordinal == LAST_WEEK {
                    is_last_week(date)
                } else {
                    week_of_month(date) == self.ordinal
                }
            }
            RecurrenceKind::Year => {
                i64::from(date.year() - start.year()) % step == 0
                    && date.month() == start.month()
                    && date.day() == self.anchored_day(date.year(), date.month())
            }
        }
    }

    /// Day of the target month this rule lands on.
    fn anchored_day(&self, year: i32, month: u32) -> u32 {
        let len = month_len(year, month);
        if self.ordinal == LAST_WEEK {
            let from_end = month_len(self.start.year(), self.start.month()) - self.start.day();
            len.saturating_sub(from_end).max(1)
        } else {
            self.start.day().min(len)
        }
    }

    /// Upper bound on the gap between two occurrences, in days.
    fn period_days(&self) -> i64 {
        let step = i64::from(self.step.max(1));
        match self.kind {
            RecurrenceKind::Day => step,
            RecurrenceKind::Week => 7 * step,
            // A fifth weekday only exists in some months.
            RecurrenceKind::WeekOfMonth => 31 * step * 12,
            RecurrenceKind::DayOfMonth => 31 * step,
            RecurrenceKind::Year => 366 * step,
        }
    }
}

/// True if any rule fires on `date`.
pub fn matches<'a, I>(rules: I, date: NaiveDate) -> bool
where
    I: IntoIterator<Item = &'a Recurrence>,
{
    rules.into_iter().any(|r| r.matches(date))
}

/// First date on or after `from` on which any rule fires.
///
/// Returns `None` for an empty rule set, or when nothing fires within a
/// bounded horizon (which only happens for malformed rules).
pub fn next_occurrence(rules: &[Recurrence], from: NaiveDate) -> Option<NaiveDate> {
    let earliest = rules.iter().map(|r| r.start).min()?;
    let horizon = rules.iter().map(Recurrence::period_days).max()? * SCAN_PERIODS;
    let first = from.max(earliest);

    first
        .iter_days()
        .take(usize::try_from(horizon).unwrap_or(usize::MAX))
        .find(|d| matches(rules, *d))
}

/// Every date in `from..=to` on which any rule fires.
pub fn occurrences_between(rules: &[Recurrence], from: NaiveDate, to: NaiveDate) -> Vec<NaiveDate> {
    if rules.is_empty() || to < from {
        return Vec::new();
    }
    let days = (to - from).num_days() + 1;
    (0..days)
        .map(|offset| from + Duration::days(offset))
        .filter(|d| matches(rules, *d))
        .collect()
}

/// 1-based week of the month `date` falls in (1..=5).
pub fn week_of_month(date: NaiveDate) -> i32 {
    // day() is at most 31, so this always fits.
    ((date.day() - 1) / 7 + 1) as i32
}

/// True when `date` is among the last seven days of its month, i.e. the last
/// occurrence of its weekday in that month.
pub fn is_last_week(date: NaiveDate) -> bool {
    date.day() + 7 > month_len(date.year(), date.month())
}

/// Number of days in `month` of `year`.
pub fn month_len(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    match (
        NaiveDate::from_ymd_opt(year, month, 1),
        NaiveDate::from_ymd_opt(next_year, next_month, 1),
    ) {
        (Some(first), Some(next)) => (next - first).num_days() as u32,
        _ => 30,
    }
}

fn months_between(start: NaiveDate, date: NaiveDate) -> i32 {
    (date.year() - start.year()) * 12 + date.month() as i32 - start.month() as i32
}
