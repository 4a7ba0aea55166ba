//! Current-task selection.
//!
//! Tasks are walked in priority order; for each one the selector finds the
//! frontier of its chain, i.e. the incomplete task nearest to it (every
//! earlier chain member being done). The first frontier that passes the
//! scheduling gate is the current task. A chain therefore keeps the rank of
//! its most urgent member while the returned task advances along the chain
//! as earlier members get done.
//!
//! A recurring task only takes part on days one of its rules fires.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::clock::Thresholds;
use crate::hierarchy::HierarchyIndex;
use crate::recurrence::{self, Recurrence};
use crate::task::{nulls_last, Task, TaskId};

/// Total order used to rank tasks:
/// `(scheduled_at nulls-last, deadline nulls-last, created_at, id)`.
pub fn compare_priority(a: &Task, b: &Task) -> Ordering {
    nulls_last(&a.scheduled_at, &b.scheduled_at)
        .then_with(|| nulls_last(&a.deadline, &b.deadline))
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Tasks sorted by [`compare_priority`].
pub fn by_priority<'a, I>(tasks: I) -> Vec<&'a Task>
where
    I: IntoIterator<Item = &'a Task>,
{
    let mut ordered: Vec<&Task> = tasks.into_iter().collect();
    ordered.sort_by(|a, b| compare_priority(a, b));
    ordered
}

fn needs_doing(
    task: &Task,
    rules: &BTreeMap<TaskId, Vec<Recurrence>>,
    thresholds: &Thresholds,
) -> bool {
    let fires_today = task.recurring
        && rules
            .get(&task.id)
            .is_some_and(|r| recurrence::matches(r, thresholds.today));
    task.is_incomplete(thresholds.done_before, fires_today)
}

/// The incomplete chain member closest to `id`, looking only at `id` and
/// its ancestors.
pub fn frontier<'a>(
    id: TaskId,
    tasks: &'a BTreeMap<TaskId, Task>,
    rules: &BTreeMap<TaskId, Vec<Recurrence>>,
    index: &HierarchyIndex,
    thresholds: &Thresholds,
) -> Option<&'a Task> {
    index
        .ancestors_of(id)
        .into_iter()
        .filter_map(|(ancestor, depth)| tasks.get(&ancestor).map(|t| (t, depth)))
        .filter(|(t, _)| needs_doing(t, rules, thresholds))
        .max_by_key(|(_, depth)| *depth)
        .map(|(t, _)| t)
}

/// The single actionable task right now, if any.
pub fn select_current<'a>(
    tasks: &'a BTreeMap<TaskId, Task>,
    rules: &BTreeMap<TaskId, Vec<Recurrence>>,
    index: &HierarchyIndex,
    thresholds: &Thresholds,
) -> Option<&'a Task> {
    by_priority(tasks.values())
        .into_iter()
        .filter_map(|t| frontier(t.id, tasks, rules, index, thresholds))
        .find(|f| f.is_schedulable(thresholds.scheduled_before))
}
