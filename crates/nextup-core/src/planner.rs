//! The single writer over tasks, rules and the hierarchy.
//!
//! Every mutation runs validate → plan → verify against the index → store
//! commit → in-memory update → event → current-task recompute. A failed step
//! before the store commit leaves both the store and the in-memory state
//! untouched.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use tokio::sync::{broadcast, watch};

use crate::clock::{Clock, Thresholds};
use crate::error::{CoreError, Result};
use crate::events::Event;
use crate::hierarchy::{EdgeChanges, HierarchyIndex};
use crate::recurrence::{self, Recurrence, RecurrenceRule};
use crate::selector::{by_priority, select_current};
use crate::storage::{Commit, RuleChanges, TaskStore};
use crate::task::{NewTask, ParentUpdate, Task, TaskFields, TaskId};

const EVENT_CAPACITY: usize = 64;

/// Rows to remove and add to turn `old` into `new`, treating both as
/// multisets.
fn diff_rules(task_id: TaskId, old: &[Recurrence], new: &[Recurrence]) -> RuleChanges {
    let mut remaining: Vec<Recurrence> = new.to_vec();
    let mut removed = Vec::new();
    for rule in old {
        match remaining.iter().position(|r| r == rule) {
            Some(pos) => {
                remaining.remove(pos);
            }
            None => removed.push(rule.owned_by(task_id)),
        }
    }
    RuleChanges {
        removed,
        added: remaining.into_iter().map(|r| r.owned_by(task_id)).collect(),
    }
}

fn validate_rules(rules: &[Recurrence]) -> Result<()> {
    for rule in rules {
        rule.validate()?;
    }
    Ok(())
}

pub struct Planner<S: TaskStore> {
    store: S,
    clock: Arc<dyn Clock>,
    tasks: BTreeMap<TaskId, Task>,
    rules: BTreeMap<TaskId, Vec<Recurrence>>,
    index: HierarchyIndex,
    thresholds: Thresholds,
    current: watch::Sender<Option<Task>>,
    events: broadcast::Sender<Event>,
}

impl<S: TaskStore> Planner<S> {
    /// Load everything from `store` and verify that tasks, rules and edges
    /// agree with each other.
    ///
    /// # Errors
    /// Returns `InvariantViolation` if the persisted state is inconsistent,
    /// or the store's error if loading fails.
    pub fn open(store: S, clock: Arc<dyn Clock>, thresholds: Thresholds) -> Result<Self> {
        let snapshot = store.load()?;
        let index = HierarchyIndex::from_edges(snapshot.edges)?;

        let mut rules: BTreeMap<TaskId, Vec<Recurrence>> = BTreeMap::new();
        for RecurrenceRule {
            task_id,
            recurrence,
        } in snapshot.rules
        {
            rules.entry(task_id).or_default().push(recurrence);
        }

        let mut tasks = BTreeMap::new();
        for mut task in snapshot.tasks {
            if !index.contains(task.id) {
                return Err(inconsistent(format!("task {} has no self edge", task.id)));
            }
            task.recurring = rules.contains_key(&task.id);
            tasks.insert(task.id, task);
        }
        if index.len() != tasks.len() {
            return Err(inconsistent(format!(
                "{} indexed tasks but {} task rows",
                index.len(),
                tasks.len()
            )));
        }
        if let Some(orphan) = rules.keys().find(|id| !tasks.contains_key(id)) {
            return Err(inconsistent(format!("rules reference missing task {orphan}")));
        }

        let initial = select_current(&tasks, &rules, &index, &thresholds).cloned();
        let (current, _) = watch::channel(initial);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        tracing::debug!(tasks = tasks.len(), rules = rules.len(), "planner opened");
        Ok(Self {
            store,
            clock,
            tasks,
            rules,
            index,
            thresholds,
            current,
            events,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn index(&self) -> &HierarchyIndex {
        &self.index
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    /// All tasks, ordered by id.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> + '_ {
        self.tasks.values()
    }

    pub fn rules_of(&self, id: TaskId) -> &[Recurrence] {
        self.rules.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Tasks of `id`'s chain, head first. Empty for unknown ids.
    pub fn chain_of(&self, id: TaskId) -> Vec<&Task> {
        self.index
            .chain(id)
            .into_iter()
            .filter_map(|member| self.tasks.get(&member))
            .collect()
    }

    fn require(&self, id: TaskId) -> Result<&Task> {
        self.tasks.get(&id).ok_or(CoreError::UnknownId(id))
    }

    fn next_id(&self) -> TaskId {
        TaskId(self.tasks.keys().next_back().map_or(1, |last| last.0 + 1))
    }

    /// Write `commit` and then mirror its edge changes in the index.
    ///
    /// The edge changes are verified first so that the store never holds a
    /// commit the index would refuse.
    fn persist(&mut self, commit: &Commit) -> Result<()> {
        self.index.verify(&commit.edges)?;
        self.store.commit(commit)?;
        self.index.apply(&commit.edges)?;
        tracing::debug!(
            upserts = commit.upserts.len(),
            deleted = commit.deleted.len(),
            edges_removed = commit.edges.removed.len(),
            edges_inserted = commit.edges.inserted.len(),
            "commit applied"
        );
        Ok(())
    }

    fn publish(&self, event: Event) {
        // Having no subscribers is not an error.
        let _ = self.events.send(event);
    }

    /// Recompute the current task and notify watchers if it changed.
    fn refresh(&mut self) {
        let next =
            select_current(&self.tasks, &self.rules, &self.index, &self.thresholds).cloned();
        let mut previous = None;
        let changed = self.current.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            previous = current.as_ref().map(|t| t.id);
            *current = next.clone();
            true
        });
        let next_id = next.as_ref().map(|t| t.id);
        if changed && previous != next_id {
            tracing::debug!(?previous, current = ?next_id, "current task changed");
            self.publish(Event::CurrentChanged {
                previous,
                current: next_id,
            });
        }
    }

    /// Create a task, appended to the tail of `new.parent`'s chain if given.
    pub fn create_task(&mut self, new: NewTask) -> Result<Task> {
        let fields = new.fields.validated()?;
        validate_rules(&new.rules)?;
        if let Some(parent) = new.parent {
            self.require(parent)?;
        }

        let id = self.next_id();
        let edges = self.index.plan_attach(id, new.parent)?;
        let now = self.clock.now();
        let task = Task {
            id,
            name: fields.name,
            created_at: now,
            updated_at: now,
            deadline: fields.deadline,
            scheduled_at: fields.scheduled_at,
            done_at: None,
            category: fields.category,
            recurring: !new.rules.is_empty(),
        };

        let commit = Commit {
            upserts: vec![task.clone()],
            rules: diff_rules(id, &[], &new.rules),
            edges,
            ..Commit::default()
        };
        self.persist(&commit)?;

        self.tasks.insert(id, task.clone());
        if !new.rules.is_empty() {
            self.rules.insert(id, new.rules);
        }
        self.publish(Event::TaskCreated {
            id,
            parent: new.parent,
            at: now,
        });
        self.refresh();
        Ok(task)
    }

    /// Replace a task's editable fields and rules, and optionally move it.
    ///
    /// `Replace` with the current parent and `Remove` on a chain head leave
    /// the hierarchy untouched.
    pub fn update_task(
        &mut self,
        id: TaskId,
        fields: TaskFields,
        rules: Vec<Recurrence>,
        parent: ParentUpdate,
    ) -> Result<Task> {
        let existing = self.require(id)?.clone();
        let fields = fields.validated()?;
        validate_rules(&rules)?;

        let old_parent = self.index.parent_of(id);
        let target = match parent {
            ParentUpdate::Keep => None,
            ParentUpdate::Replace(p) if Some(p) == old_parent => None,
            ParentUpdate::Replace(p) => Some(Some(p)),
            ParentUpdate::Remove if old_parent.is_none() => None,
            ParentUpdate::Remove => Some(None),
        };
        let edges = match target {
            Some(new_parent) => self.index.plan_reparent(id, old_parent, new_parent)?,
            None => EdgeChanges::default(),
        };

        let now = self.clock.now();
        let task = Task {
            name: fields.name,
            deadline: fields.deadline,
            scheduled_at: fields.scheduled_at,
            category: fields.category,
            updated_at: now,
            recurring: !rules.is_empty(),
            ..existing
        };

        let commit = Commit {
            upserts: vec![task.clone()],
            rules: diff_rules(id, self.rules_of(id), &rules),
            edges,
            ..Commit::default()
        };
        self.persist(&commit)?;

        self.tasks.insert(id, task.clone());
        if rules.is_empty() {
            self.rules.remove(&id);
        } else {
            self.rules.insert(id, rules);
        }
        self.publish(Event::TaskUpdated {
            id,
            reparented: target.is_some(),
            at: now,
        });
        self.refresh();
        Ok(task)
    }

    /// Delete a task and its rules; its predecessor and successor are joined.
    pub fn delete_task(&mut self, id: TaskId) -> Result<Task> {
        let task = self.require(id)?.clone();
        let edges = self.index.plan_detach(id)?;
        let commit = Commit {
            deleted: vec![id],
            rules: diff_rules(id, self.rules_of(id), &[]),
            edges,
            ..Commit::default()
        };
        self.persist(&commit)?;

        self.tasks.remove(&id);
        self.rules.remove(&id);
        self.publish(Event::TaskDeleted {
            id,
            at: self.clock.now(),
        });
        self.refresh();
        Ok(task)
    }

    /// Record a completion now.
    ///
    /// A non-recurring task that is already done keeps its original
    /// completion time.
    pub fn mark_done(&mut self, id: TaskId) -> Result<Task> {
        let existing = self.require(id)?;
        if existing.done_at.is_some() && !existing.recurring {
            return Ok(existing.clone());
        }
        let now = self.clock.now();
        let task = Task {
            done_at: Some(now),
            updated_at: now,
            ..existing.clone()
        };
        self.write_task(task, Event::TaskCompleted { id, at: now })
    }

    /// Clear the completion. No-op for open tasks.
    pub fn mark_undone(&mut self, id: TaskId) -> Result<Task> {
        let existing = self.require(id)?;
        if existing.done_at.is_none() {
            return Ok(existing.clone());
        }
        let now = self.clock.now();
        let task = Task {
            done_at: None,
            updated_at: now,
            ..existing.clone()
        };
        self.write_task(task, Event::TaskReopened { id, at: now })
    }

    fn write_task(&mut self, task: Task, event: Event) -> Result<Task> {
        let commit = Commit {
            upserts: vec![task.clone()],
            ..Commit::default()
        };
        self.persist(&commit)?;
        self.tasks.insert(task.id, task.clone());
        self.publish(event);
        self.refresh();
        Ok(task)
    }

    /// The current task under arbitrary thresholds. Does not touch the feed.
    pub fn current_task(&self, thresholds: &Thresholds) -> Option<Task> {
        select_current(&self.tasks, &self.rules, &self.index, thresholds).cloned()
    }

    /// Move the feed to new thresholds.
    pub fn set_thresholds(&mut self, thresholds: Thresholds) {
        self.thresholds = thresholds;
        self.refresh();
    }

    /// Derive thresholds from the clock in `tz` and apply them.
    ///
    /// Returns the instant at which they must be derived again.
    pub fn sync_thresholds<Tz: TimeZone>(&mut self, tz: &Tz, day_start: NaiveTime) -> DateTime<Utc> {
        let now = self.clock.now().with_timezone(tz);
        self.set_thresholds(Thresholds::at(&now, day_start));
        Thresholds::next_boundary(&now, day_start)
    }

    /// Receiver that always holds the current task for the latest commit.
    pub fn watch_current(&self) -> watch::Receiver<Option<Task>> {
        self.current.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Tasks that may become the parent of `excluding_chain_of` (or of a new
    /// task when `None`), filtered by a case-insensitive name substring and
    /// ordered by priority.
    pub fn candidate_parents(&self, excluding_chain_of: Option<TaskId>, query: &str) -> Vec<&Task> {
        let excluded = excluding_chain_of
            .map(|id| self.index.chain_excluding(id))
            .unwrap_or_default();
        let query = query.trim().to_lowercase();
        by_priority(
            self.tasks
                .values()
                .filter(|t| !excluded.contains(&t.id))
                .filter(|t| t.name.to_lowercase().contains(&query)),
        )
    }

    /// Next date on or after `from` that one of the task's rules fires.
    pub fn next_due(&self, id: TaskId, from: NaiveDate) -> Result<Option<NaiveDate>> {
        self.require(id)?;
        Ok(recurrence::next_occurrence(self.rules_of(id), from))
    }
}

fn inconsistent(message: String) -> CoreError {
    tracing::error!(%message, "persisted state is inconsistent");
    CoreError::InvariantViolation(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::DatabaseError;
    use crate::hierarchy::HierarchyEdge;
    use crate::recurrence::RecurrenceKind;
    use crate::storage::{MemoryStore, Snapshot};
    use crate::task::DateSpec;
    use chrono::{Duration, NaiveDateTime};

    fn at(s: &str) -> DateTime<Utc> {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M")
            .unwrap()
            .and_utc()
    }

    fn thresholds(now: &str, day_start: &str) -> Thresholds {
        Thresholds {
            scheduled_before: at(now).naive_utc(),
            done_before: at(day_start),
            today: at(day_start).date_naive(),
        }
    }

    fn planner_at(now: &str) -> (Planner<MemoryStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(at(now)));
        let planner = Planner::open(
            MemoryStore::new(),
            clock.clone(),
            thresholds(now, "2024-08-24 00:00"),
        )
        .unwrap();
        (planner, clock)
    }

    fn current_id<S: TaskStore>(planner: &Planner<S>) -> Option<TaskId> {
        planner.watch_current().borrow().as_ref().map(|t| t.id)
    }

    #[test]
    fn first_created_is_current_until_done() {
        let (mut planner, clock) = planner_at("2024-08-24 09:00");
        let t1 = planner.create_task(NewTask::new("T1")).unwrap();
        clock.advance(Duration::minutes(1));
        let t2 = planner.create_task(NewTask::new("T2")).unwrap();

        assert_eq!(t1.id, TaskId(1));
        assert_eq!(t2.id, TaskId(2));
        assert_eq!(current_id(&planner), Some(t1.id));

        planner.mark_done(t1.id).unwrap();
        assert_eq!(current_id(&planner), Some(t2.id));
    }

    #[test]
    fn recurring_task_reactivates_when_threshold_passes_completion() {
        let (mut planner, clock) = planner_at("2024-08-24 09:00");
        let daily = Recurrence::new(
            NaiveDate::from_ymd_opt(2024, 8, 1).unwrap(),
            RecurrenceKind::Day,
            1,
        );
        let t1 = planner.create_task(NewTask::new("water plants").rule(daily)).unwrap();
        clock.advance(Duration::minutes(1));
        let t2 = planner.create_task(NewTask::new("write report")).unwrap();
        assert!(t1.recurring);

        clock.advance(Duration::minutes(5));
        planner.mark_done(t1.id).unwrap();
        assert_eq!(current_id(&planner), Some(t2.id));

        // Completion 09:06 is before the next day's start: open again.
        planner.set_thresholds(thresholds("2024-08-25 08:00", "2024-08-25 00:00"));
        assert_eq!(current_id(&planner), Some(t1.id));

        // A recurring task always records the new completion.
        clock.set(at("2024-08-25 08:30"));
        let done = planner.mark_done(t1.id).unwrap();
        assert_eq!(done.done_at, Some(at("2024-08-25 08:30")));
        assert_eq!(current_id(&planner), Some(t2.id));
    }

    #[test]
    fn weekly_task_is_not_current_between_occurrences() {
        // 2024-08-19 is a Monday.
        let (mut planner, clock) = planner_at("2024-08-19 09:00");
        planner.set_thresholds(thresholds("2024-08-19 09:00", "2024-08-19 00:00"));
        let monday = NaiveDate::from_ymd_opt(2024, 8, 19).unwrap();
        let weekly = Recurrence::new(monday, RecurrenceKind::Week, 1);
        let t = planner.create_task(NewTask::new("team sync").rule(weekly)).unwrap();
        assert_eq!(current_id(&planner), Some(t.id));
        planner.mark_done(t.id).unwrap();
        assert_eq!(current_id(&planner), None);

        clock.set(at("2024-08-20 09:00"));
        planner.sync_thresholds(&Utc, NaiveTime::MIN);
        assert_eq!(current_id(&planner), None);

        clock.set(at("2024-08-26 09:00"));
        planner.sync_thresholds(&Utc, NaiveTime::MIN);
        assert_eq!(current_id(&planner), Some(t.id));
    }

    #[test]
    fn recurring_task_waits_for_its_first_occurrence() {
        let (mut planner, clock) = planner_at("2024-08-19 09:00");
        let christmas = NaiveDate::from_ymd_opt(2024, 12, 25).unwrap();
        let yearly = Recurrence::new(christmas, RecurrenceKind::Year, 1);
        let t = planner.create_task(NewTask::new("call family").rule(yearly)).unwrap();
        assert_eq!(current_id(&planner), None);

        clock.set(at("2024-12-25 08:00"));
        planner.sync_thresholds(&Utc, NaiveTime::MIN);
        assert_eq!(current_id(&planner), Some(t.id));
    }

    #[test]
    fn future_scheduled_task_is_never_current() {
        let (mut planner, _clock) = planner_at("2024-08-24 09:00");
        let later = NewTask::new("later").scheduled_at("2024-08-24 10:00".parse().unwrap());
        planner.create_task(later).unwrap();
        assert_eq!(current_id(&planner), None);

        planner.set_thresholds(thresholds("2024-08-24 10:00", "2024-08-24 00:00"));
        assert_eq!(current_id(&planner), Some(TaskId(1)));
    }

    #[test]
    fn repeated_mark_done_is_a_no_op() {
        let (mut planner, clock) = planner_at("2024-08-24 09:00");
        let t1 = planner.create_task(NewTask::new("T1")).unwrap();
        planner.create_task(NewTask::new("T2")).unwrap();

        let first = planner.mark_done(t1.id).unwrap();
        let commits = planner.store().commits();
        let current = planner.current_task(&planner.thresholds());

        clock.advance(Duration::hours(1));
        let second = planner.mark_done(t1.id).unwrap();
        assert_eq!(second.done_at, first.done_at);
        assert_eq!(planner.store().commits(), commits);
        assert_eq!(planner.current_task(&planner.thresholds()), current);
    }

    #[test]
    fn chain_member_becomes_current_in_order() {
        let (mut planner, clock) = planner_at("2024-08-24 09:00");
        let a = planner.create_task(NewTask::new("outline")).unwrap();
        clock.advance(Duration::minutes(1));
        let other = planner.create_task(NewTask::new("unrelated")).unwrap();
        clock.advance(Duration::minutes(1));
        let b = planner.create_task(NewTask::new("draft").parent(a.id)).unwrap();
        // Attaching under `a` again lands at the tail, after `b`.
        let c = planner.create_task(NewTask::new("publish").parent(a.id)).unwrap();

        let chain: Vec<TaskId> = planner.chain_of(c.id).iter().map(|t| t.id).collect();
        assert_eq!(chain, vec![a.id, b.id, c.id]);

        assert_eq!(current_id(&planner), Some(a.id));
        planner.mark_done(a.id).unwrap();
        // `b` ranks by its own creation time, after `other`.
        assert_eq!(current_id(&planner), Some(other.id));
        planner.mark_done(other.id).unwrap();
        assert_eq!(current_id(&planner), Some(b.id));
        planner.mark_done(b.id).unwrap();
        assert_eq!(current_id(&planner), Some(c.id));
    }

    #[test]
    fn update_moves_task_between_chains() {
        let (mut planner, _clock) = planner_at("2024-08-24 09:00");
        let a = planner.create_task(NewTask::new("a")).unwrap();
        let b = planner.create_task(NewTask::new("b").parent(a.id)).unwrap();
        let x = planner.create_task(NewTask::new("x")).unwrap();

        let mut events = planner.subscribe();
        planner
            .update_task(b.id, TaskFields::named("b"), vec![], ParentUpdate::Replace(x.id))
            .unwrap();
        assert_eq!(planner.index().parent_of(b.id), Some(x.id));
        assert_eq!(planner.index().child_of(a.id), None);
        planner.index().check_invariants().unwrap();
        assert!(matches!(
            events.try_recv().unwrap(),
            Event::TaskUpdated { reparented: true, .. }
        ));

        planner
            .update_task(b.id, TaskFields::named("b"), vec![], ParentUpdate::Replace(x.id))
            .unwrap();
        assert!(matches!(
            events.try_recv().unwrap(),
            Event::TaskUpdated { reparented: false, .. }
        ));

        planner
            .update_task(b.id, TaskFields::named("b"), vec![], ParentUpdate::Remove)
            .unwrap();
        assert_eq!(planner.index().parent_of(b.id), None);
        assert_eq!(planner.chain_of(b.id).len(), 1);
    }

    #[test]
    fn update_rejects_cycles_without_side_effects() {
        let (mut planner, _clock) = planner_at("2024-08-24 09:00");
        let a = planner.create_task(NewTask::new("a")).unwrap();
        let b = planner.create_task(NewTask::new("b").parent(a.id)).unwrap();
        let commits = planner.store().commits();

        let err = planner
            .update_task(a.id, TaskFields::named("renamed"), vec![], ParentUpdate::Replace(b.id))
            .unwrap_err();
        assert!(matches!(err, CoreError::CycleRejected { .. }));
        assert_eq!(planner.task(a.id).unwrap().name, "a");
        assert_eq!(planner.store().commits(), commits);
    }

    #[test]
    fn update_diffs_rules() {
        let (mut planner, _clock) = planner_at("2024-08-24 09:00");
        let start = NaiveDate::from_ymd_opt(2024, 8, 22).unwrap();
        let daily = Recurrence::new(start, RecurrenceKind::Day, 2);
        let weekly = Recurrence::new(start, RecurrenceKind::Week, 1);
        let t = planner.create_task(NewTask::new("t").rule(daily)).unwrap();

        planner
            .update_task(t.id, TaskFields::named("t"), vec![daily, weekly], ParentUpdate::Keep)
            .unwrap();
        let snapshot = planner.store().load().unwrap();
        assert_eq!(snapshot.rules.len(), 2);

        let updated = planner
            .update_task(t.id, TaskFields::named("t"), vec![], ParentUpdate::Keep)
            .unwrap();
        assert!(!updated.recurring);
        assert!(planner.store().load().unwrap().rules.is_empty());
        assert!(planner.rules_of(t.id).is_empty());
    }

    #[test]
    fn invalid_input_is_rejected() {
        let (mut planner, _clock) = planner_at("2024-08-24 09:00");
        assert!(matches!(
            planner.create_task(NewTask::new("   ")),
            Err(CoreError::Validation(_))
        ));

        let bad = Recurrence {
            step: 0,
            ..Recurrence::new(NaiveDate::from_ymd_opt(2024, 8, 1).unwrap(), RecurrenceKind::Day, 1)
        };
        assert!(matches!(
            planner.create_task(NewTask::new("x").rule(bad)),
            Err(CoreError::InvalidRule(_))
        ));
        assert!(matches!(
            planner.create_task(NewTask::new("x").parent(TaskId(9))),
            Err(CoreError::UnknownId(TaskId(9)))
        ));
        assert!(matches!(planner.mark_done(TaskId(9)), Err(CoreError::UnknownId(_))));
        assert_eq!(planner.tasks().count(), 0);
    }

    #[test]
    fn delete_rejoins_chain_and_reports() {
        let (mut planner, _clock) = planner_at("2024-08-24 09:00");
        let a = planner.create_task(NewTask::new("a")).unwrap();
        let b = planner.create_task(NewTask::new("b").parent(a.id)).unwrap();
        let c = planner.create_task(NewTask::new("c").parent(b.id)).unwrap();
        let mut events = planner.subscribe();

        planner.delete_task(b.id).unwrap();
        assert_eq!(planner.index().depth(a.id, c.id), Some(1));
        assert!(planner.task(b.id).is_none());
        assert!(matches!(events.try_recv().unwrap(), Event::TaskDeleted { id, .. } if id == b.id));

        // Ids are never reused while a higher id exists.
        let d = planner.create_task(NewTask::new("d")).unwrap();
        assert_eq!(d.id, TaskId(4));
    }

    #[test]
    fn candidate_parents_exclude_own_chain() {
        let (mut planner, clock) = planner_at("2024-08-24 09:00");
        let a = planner.create_task(NewTask::new("Plan trip")).unwrap();
        let b = planner.create_task(NewTask::new("Book train").parent(a.id)).unwrap();
        clock.advance(Duration::minutes(1));
        let c = planner
            .create_task(NewTask::new("Book hotel").deadline(DateSpec::on(
                NaiveDate::from_ymd_opt(2024, 9, 1).unwrap(),
            )))
            .unwrap();
        planner.create_task(NewTask::new("Laundry")).unwrap();

        let ids: Vec<TaskId> = planner
            .candidate_parents(Some(a.id), "book")
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec![c.id]);

        let ids: Vec<TaskId> = planner
            .candidate_parents(None, "BOOK")
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec![c.id, b.id]);
        assert_eq!(planner.candidate_parents(None, "").len(), 4);
    }

    #[test]
    fn current_changed_event_follows_selection() {
        let (mut planner, _clock) = planner_at("2024-08-24 09:00");
        let mut events = planner.subscribe();
        let t = planner.create_task(NewTask::new("only")).unwrap();

        assert!(matches!(events.try_recv().unwrap(), Event::TaskCreated { .. }));
        assert_eq!(
            events.try_recv().unwrap(),
            Event::CurrentChanged {
                previous: None,
                current: Some(t.id)
            }
        );

        planner.mark_done(t.id).unwrap();
        assert!(matches!(events.try_recv().unwrap(), Event::TaskCompleted { .. }));
        assert_eq!(
            events.try_recv().unwrap(),
            Event::CurrentChanged {
                previous: Some(t.id),
                current: None
            }
        );

        planner.mark_undone(t.id).unwrap();
        assert!(matches!(events.try_recv().unwrap(), Event::TaskReopened { .. }));
    }

    #[test]
    fn next_due_uses_task_rules() {
        let (mut planner, _clock) = planner_at("2024-08-24 09:00");
        let rule = Recurrence::new(
            NaiveDate::from_ymd_opt(2024, 8, 22).unwrap(),
            RecurrenceKind::Day,
            2,
        );
        let t = planner.create_task(NewTask::new("t").rule(rule)).unwrap();
        let plain = planner.create_task(NewTask::new("plain")).unwrap();

        let from = NaiveDate::from_ymd_opt(2024, 8, 25).unwrap();
        assert_eq!(
            planner.next_due(t.id, from).unwrap(),
            NaiveDate::from_ymd_opt(2024, 8, 26)
        );
        assert_eq!(planner.next_due(plain.id, from).unwrap(), None);
        assert!(planner.next_due(TaskId(99), from).is_err());
    }

    struct FailingStore {
        inner: MemoryStore,
        fail: bool,
    }

    impl TaskStore for FailingStore {
        fn load(&self) -> Result<Snapshot> {
            self.inner.load()
        }

        fn commit(&mut self, commit: &Commit) -> Result<()> {
            if self.fail {
                return Err(DatabaseError::Locked.into());
            }
            self.inner.commit(commit)
        }
    }

    #[test]
    fn failed_commit_leaves_state_untouched() {
        let clock = Arc::new(ManualClock::new(at("2024-08-24 09:00")));
        let store = FailingStore {
            inner: MemoryStore::new(),
            fail: false,
        };
        let mut planner =
            Planner::open(store, clock, thresholds("2024-08-24 09:00", "2024-08-24 00:00"))
                .unwrap();
        let a = planner.create_task(NewTask::new("a")).unwrap();
        let b = planner.create_task(NewTask::new("b").parent(a.id)).unwrap();
        let index_before = planner.index().clone();

        planner.store.fail = true;
        assert!(planner.delete_task(a.id).is_err());
        assert!(planner.mark_done(b.id).is_err());
        assert!(planner.create_task(NewTask::new("c").parent(b.id)).is_err());

        assert_eq!(planner.index(), &index_before);
        assert_eq!(planner.tasks().count(), 2);
        assert!(planner.task(b.id).unwrap().is_open());
        assert_eq!(current_id(&planner), Some(a.id));
    }

    #[test]
    fn refused_edge_changes_never_reach_the_store() {
        let (mut planner, _clock) = planner_at("2024-08-24 09:00");
        let a = planner.create_task(NewTask::new("a")).unwrap();
        let commits = planner.store().commits();
        let index_before = planner.index().clone();

        // Inserting the existing self edge again collides.
        let commit = Commit {
            edges: EdgeChanges {
                removed: vec![],
                inserted: vec![HierarchyEdge::new(a.id, a.id, 0)],
            },
            ..Commit::default()
        };
        assert!(matches!(
            planner.persist(&commit),
            Err(CoreError::InvariantViolation(_))
        ));
        assert_eq!(planner.store().commits(), commits);
        assert_eq!(planner.index(), &index_before);
    }

    #[test]
    fn open_rejects_inconsistent_snapshot() {
        let mut store = MemoryStore::new();
        let now = at("2024-08-24 09:00");
        store
            .commit(&Commit {
                upserts: vec![Task {
                    id: TaskId(1),
                    name: "orphan".into(),
                    created_at: now,
                    updated_at: now,
                    deadline: None,
                    scheduled_at: None,
                    done_at: None,
                    category: None,
                    recurring: false,
                }],
                ..Commit::default()
            })
            .unwrap();
        let clock = Arc::new(ManualClock::new(now));
        let result = Planner::open(store, clock, thresholds("2024-08-24 09:00", "2024-08-24 00:00"));
        assert!(matches!(result, Err(CoreError::InvariantViolation(_))));
    }
}
