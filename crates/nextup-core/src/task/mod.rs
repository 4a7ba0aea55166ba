//! Task records and the value types used to create and edit them.
//!
//! A task is a single actionable item. Tasks are linked into linear chains by
//! the [`crate::hierarchy`] index; recurrence lives in [`crate::recurrence`].
//! This module only holds data and the small predicates the selector needs.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;
use crate::recurrence::Recurrence;

/// Task identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub i64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(TaskId)
    }
}

/// A calendar date with an optional time of day.
///
/// Used for deadlines and scheduled-at values. Ordering is by date, then
/// time, with a missing time sorting after every explicit time on that date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateSpec {
    pub date: NaiveDate,
    #[serde(default)]
    pub time: Option<NaiveTime>,
}

impl DateSpec {
    pub fn on(date: NaiveDate) -> Self {
        Self { date, time: None }
    }

    pub fn at(date: NaiveDate, time: NaiveTime) -> Self {
        Self {
            date,
            time: Some(time),
        }
    }

    /// Wall-clock instant from which this value counts as reached.
    ///
    /// A date without a time is reached at the start of that day.
    pub fn effective_at(&self) -> NaiveDateTime {
        self.date.and_time(self.time.unwrap_or(NaiveTime::MIN))
    }
}

impl Ord for DateSpec {
    fn cmp(&self, other: &Self) -> Ordering {
        self.date
            .cmp(&other.date)
            .then_with(|| nulls_last(&self.time, &other.time))
    }
}

impl PartialOrd for DateSpec {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for DateSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.time {
            Some(t) => write!(f, "{} {}", self.date, t.format("%H:%M")),
            None => write!(f, "{}", self.date),
        }
    }
}

impl FromStr for DateSpec {
    type Err = ValidationError;

    /// Accepts `YYYY-MM-DD` or `YYYY-MM-DD HH:MM` (a `T` separator also works).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || ValidationError::InvalidValue {
            field: "date".into(),
            message: format!("expected YYYY-MM-DD[ HH:MM], got '{s}'"),
        };
        let (date_part, time_part) = match s.split_once(|c: char| c == ' ' || c == 'T') {
            Some((d, t)) => (d, Some(t)),
            None => (s, None),
        };
        let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map_err(|_| invalid())?;
        let time = match time_part {
            Some(t) => Some(NaiveTime::parse_from_str(t.trim(), "%H:%M").map_err(|_| invalid())?),
            None => None,
        };
        Ok(Self { date, time })
    }
}

/// Compare two optional values with `None` after every `Some`.
pub(crate) fn nulls_last<T: Ord>(a: &Option<T>, b: &Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// A task record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Date (and optionally time) the task should be finished by.
    pub deadline: Option<DateSpec>,
    /// The task is not actionable before this point.
    pub scheduled_at: Option<DateSpec>,
    /// Last completion. Never cleared automatically for recurring tasks.
    pub done_at: Option<DateTime<Utc>>,
    /// Opaque reference to a category owned by the surrounding application.
    pub category: Option<i64>,
    /// True iff at least one recurrence rule is attached to the task.
    #[serde(default)]
    pub recurring: bool,
}

impl Task {
    pub fn is_open(&self) -> bool {
        self.done_at.is_none()
    }

    /// Whether the task still needs doing as of the `done_before` threshold.
    ///
    /// A recurring task only needs doing on days its rules fire
    /// (`fires_today`), and then only if it was not completed at or after
    /// the threshold.
    pub fn is_incomplete(&self, done_before: DateTime<Utc>, fires_today: bool) -> bool {
        if self.recurring {
            return fires_today && self.done_at.map_or(true, |done| done < done_before);
        }
        self.done_at.is_none()
    }

    /// Whether the scheduling gate lets this task through.
    pub fn is_schedulable(&self, scheduled_before: NaiveDateTime) -> bool {
        self.scheduled_at
            .map_or(true, |s| s.effective_at() <= scheduled_before)
    }
}

/// Editable fields of a task, submitted as a whole on create and update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFields {
    pub name: String,
    pub deadline: Option<DateSpec>,
    pub scheduled_at: Option<DateSpec>,
    pub category: Option<i64>,
}

impl TaskFields {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Trim the name and reject blank ones.
    pub fn validated(mut self) -> Result<Self, ValidationError> {
        let trimmed = self.name.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::Empty("name"));
        }
        if trimmed.len() != self.name.len() {
            self.name = trimmed.to_string();
        }
        Ok(self)
    }
}

/// Everything needed to create a task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewTask {
    pub fields: TaskFields,
    pub rules: Vec<Recurrence>,
    pub parent: Option<TaskId>,
}

impl NewTask {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            fields: TaskFields::named(name),
            ..Self::default()
        }
    }

    pub fn parent(mut self, parent: TaskId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn deadline(mut self, deadline: DateSpec) -> Self {
        self.fields.deadline = Some(deadline);
        self
    }

    pub fn scheduled_at(mut self, scheduled_at: DateSpec) -> Self {
        self.fields.scheduled_at = Some(scheduled_at);
        self
    }

    pub fn category(mut self, category: i64) -> Self {
        self.fields.category = Some(category);
        self
    }

    pub fn rule(mut self, rule: Recurrence) -> Self {
        self.rules.push(rule);
        self
    }
}

/// What to do with a task's parent link on update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "parent", rename_all = "snake_case")]
pub enum ParentUpdate {
    /// Leave the chain untouched.
    Keep,
    /// Move the task (and its successors) under a new parent.
    Replace(TaskId),
    /// Cut the task (and its successors) loose into its own chain.
    Remove,
}

impl Default for ParentUpdate {
    fn default() -> Self {
        ParentUpdate::Keep
    }
}
