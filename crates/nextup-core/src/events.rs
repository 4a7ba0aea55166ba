use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::task::TaskId;

/// Every committed mutation produces an Event.
/// Subscribers receive them after the store write and the in-memory update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    TaskCreated {
        id: TaskId,
        parent: Option<TaskId>,
        at: DateTime<Utc>,
    },
    TaskUpdated {
        id: TaskId,
        /// True when the task moved to another chain position.
        reparented: bool,
        at: DateTime<Utc>,
    },
    TaskDeleted {
        id: TaskId,
        at: DateTime<Utc>,
    },
    TaskCompleted {
        id: TaskId,
        at: DateTime<Utc>,
    },
    TaskReopened {
        id: TaskId,
        at: DateTime<Utc>,
    },
    /// The recomputed current task differs from the previous one.
    CurrentChanged {
        previous: Option<TaskId>,
        current: Option<TaskId>,
    },
}

impl Event {
    /// Task the event is about, if any.
    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            Event::TaskCreated { id, .. }
            | Event::TaskUpdated { id, .. }
            | Event::TaskDeleted { id, .. }
            | Event::TaskCompleted { id, .. }
            | Event::TaskReopened { id, .. } => Some(*id),
            Event::CurrentChanged { current, .. } => *current,
        }
    }
}
