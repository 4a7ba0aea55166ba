//! The persistence boundary.
//!
//! A [`TaskStore`] only moves rows; every rule about what the rows mean lives
//! in the planner. One [`Commit`] carries everything a single operation
//! changes and must land atomically.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::hierarchy::{EdgeChanges, HierarchyEdge};
use crate::recurrence::RecurrenceRule;
use crate::task::{Task, TaskId};

/// Full persisted state, as loaded at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub tasks: Vec<Task>,
    pub rules: Vec<RecurrenceRule>,
    pub edges: Vec<HierarchyEdge>,
}

/// Rule rows removed and added by one operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleChanges {
    pub removed: Vec<RecurrenceRule>,
    pub added: Vec<RecurrenceRule>,
}

impl RuleChanges {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }
}

/// Everything one operation writes.
///
/// Stores apply the parts in this order: task upserts, rule removals, rule
/// additions, edge removals, edge insertions, task deletions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Commit {
    pub upserts: Vec<Task>,
    pub deleted: Vec<TaskId>,
    pub rules: RuleChanges,
    pub edges: EdgeChanges,
}

pub trait TaskStore {
    fn load(&self) -> Result<Snapshot>;

    /// Write `commit` atomically: either all of it or none of it.
    fn commit(&mut self, commit: &Commit) -> Result<()>;
}

impl<S: TaskStore + ?Sized> TaskStore for Box<S> {
    fn load(&self) -> Result<Snapshot> {
        (**self).load()
    }

    fn commit(&mut self, commit: &Commit) -> Result<()> {
        (**self).commit(commit)
    }
}

/// Store kept entirely in memory. Used by tests and throwaway sessions.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tasks: BTreeMap<TaskId, Task>,
    rules: Vec<RecurrenceRule>,
    edges: BTreeMap<(TaskId, TaskId), u32>,
    commits: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of commits applied so far.
    pub fn commits(&self) -> usize {
        self.commits
    }
}

impl TaskStore for MemoryStore {
    fn load(&self) -> Result<Snapshot> {
        Ok(Snapshot {
            tasks: self.tasks.values().cloned().collect(),
            rules: self.rules.clone(),
            edges: self
                .edges
                .iter()
                .map(|((a, d), depth)| HierarchyEdge::new(*a, *d, *depth))
                .collect(),
        })
    }

    fn commit(&mut self, commit: &Commit) -> Result<()> {
        for task in &commit.upserts {
            self.tasks.insert(task.id, task.clone());
        }
        for rule in &commit.rules.removed {
            if let Some(pos) = self.rules.iter().position(|r| r == rule) {
                self.rules.remove(pos);
            }
        }
        self.rules.extend(commit.rules.added.iter().copied());
        for edge in &commit.edges.removed {
            self.edges.remove(&(edge.ancestor, edge.descendant));
        }
        for edge in &commit.edges.inserted {
            self.edges
                .insert((edge.ancestor, edge.descendant), edge.depth);
        }
        for id in &commit.deleted {
            self.tasks.remove(id);
            self.rules.retain(|r| r.task_id != *id);
        }
        self.commits += 1;
        Ok(())
    }
}
