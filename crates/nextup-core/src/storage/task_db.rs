//! SQLite-based storage for tasks, recurrence rules and the closure table.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rusqlite::{params, Connection, Transaction};

use super::data_dir;
use super::migrations;
use super::store::{Commit, Snapshot, TaskStore};
use crate::error::{DatabaseError, Result};
use crate::hierarchy::HierarchyEdge;
use crate::recurrence::{Recurrence, RecurrenceKind, RecurrenceRule};
use crate::task::{DateSpec, Task, TaskId};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M";

fn corrupt(table: &'static str, message: impl Into<String>) -> DatabaseError {
    DatabaseError::CorruptRow {
        table,
        message: message.into(),
    }
}

fn parse_datetime(table: &'static str, s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| corrupt(table, format!("bad timestamp '{s}': {e}")))
}

fn parse_date(table: &'static str, s: &str) -> Result<NaiveDate, DatabaseError> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .map_err(|e| corrupt(table, format!("bad date '{s}': {e}")))
}

fn parse_date_spec(
    date: Option<String>,
    time: Option<String>,
) -> Result<Option<DateSpec>, DatabaseError> {
    let Some(date) = date else {
        return Ok(None);
    };
    let date = parse_date("tasks", &date)?;
    let time = match time {
        Some(t) => Some(
            NaiveTime::parse_from_str(&t, TIME_FORMAT)
                .map_err(|e| corrupt("tasks", format!("bad time '{t}': {e}")))?,
        ),
        None => None,
    };
    Ok(Some(DateSpec { date, time }))
}

fn format_date_spec(spec: Option<DateSpec>) -> (Option<String>, Option<String>) {
    match spec {
        Some(s) => (
            Some(s.date.format(DATE_FORMAT).to_string()),
            s.time.map(|t| t.format(TIME_FORMAT).to_string()),
        ),
        None => (None, None),
    }
}

/// Raw `tasks` row before decoding.
struct TaskRow {
    id: i64,
    name: String,
    created_at: String,
    updated_at: String,
    deadline_date: Option<String>,
    deadline_time: Option<String>,
    scheduled_date: Option<String>,
    scheduled_time: Option<String>,
    done_at: Option<String>,
    category_id: Option<i64>,
}

impl TaskRow {
    fn decode(self, recurring: &BTreeSet<TaskId>) -> Result<Task, DatabaseError> {
        let id = TaskId(self.id);
        Ok(Task {
            id,
            name: self.name,
            created_at: parse_datetime("tasks", &self.created_at)?,
            updated_at: parse_datetime("tasks", &self.updated_at)?,
            deadline: parse_date_spec(self.deadline_date, self.deadline_time)?,
            scheduled_at: parse_date_spec(self.scheduled_date, self.scheduled_time)?,
            done_at: self
                .done_at
                .as_deref()
                .map(|s| parse_datetime("tasks", s))
                .transpose()?,
            category: self.category_id,
            recurring: recurring.contains(&id),
        })
    }
}

/// SQLite database for task storage.
///
/// Every [`Commit`] runs inside one transaction.
pub struct TaskDb {
    conn: Connection,
}

impl TaskDb {
    /// Open the database at `~/.config/nextup/nextup.db`.
    ///
    /// Creates tables if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> crate::error::Result<Self> {
        let path = data_dir()?.join("nextup.db");
        Self::open_at(&path)
    }

    /// Open (or create) the database at `path`.
    pub fn open_at(path: &Path) -> crate::error::Result<Self> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        tracing::debug!(path = %path.display(), "task database opened");
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> crate::error::Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    fn migrate(&self) -> Result<(), DatabaseError> {
        migrations::migrate(&self.conn)
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))
    }

    fn load_rules(&self) -> crate::error::Result<Vec<RecurrenceRule>> {
        let mut stmt = self.conn.prepare(
            "SELECT task_id, start_date, kind, step, ordinal
             FROM recurrence_rules
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i32>(3)?,
                row.get::<_, i32>(4)?,
            ))
        })?;

        let mut rules = Vec::new();
        for row in rows {
            let (task_id, start, kind, step, ordinal) = row?;
            let kind = RecurrenceKind::parse(&kind)
                .ok_or_else(|| corrupt("recurrence_rules", format!("unknown kind '{kind}'")))?;
            rules.push(RecurrenceRule {
                task_id: TaskId(task_id),
                recurrence: Recurrence {
                    start: parse_date("recurrence_rules", &start)?,
                    kind,
                    step,
                    ordinal,
                },
            });
        }
        Ok(rules)
    }

    fn load_edges(&self) -> crate::error::Result<Vec<HierarchyEdge>> {
        let mut stmt = self.conn.prepare(
            "SELECT ancestor, descendant, depth FROM task_hierarchy
             ORDER BY ancestor, descendant",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(HierarchyEdge::new(
                TaskId(row.get(0)?),
                TaskId(row.get(1)?),
                row.get(2)?,
            ))
        })?;
        let mut edges = Vec::new();
        for row in rows {
            edges.push(row?);
        }
        Ok(edges)
    }

    fn load_tasks(&self, recurring: &BTreeSet<TaskId>) -> crate::error::Result<Vec<Task>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, created_at, updated_at,
                    deadline_date, deadline_time, scheduled_date, scheduled_time,
                    done_at, category_id
             FROM tasks
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(TaskRow {
                id: row.get(0)?,
                name: row.get(1)?,
                created_at: row.get(2)?,
                updated_at: row.get(3)?,
                deadline_date: row.get(4)?,
                deadline_time: row.get(5)?,
                scheduled_date: row.get(6)?,
                scheduled_time: row.get(7)?,
                done_at: row.get(8)?,
                category_id: row.get(9)?,
            })
        })?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row?.decode(recurring)?);
        }
        Ok(tasks)
    }
}

fn upsert_task(tx: &Transaction<'_>, task: &Task) -> rusqlite::Result<()> {
    let (deadline_date, deadline_time) = format_date_spec(task.deadline);
    let (scheduled_date, scheduled_time) = format_date_spec(task.scheduled_at);
    tx.execute(
        "INSERT INTO tasks (id, name, created_at, updated_at,
                            deadline_date, deadline_time, scheduled_date, scheduled_time,
                            done_at, category_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            updated_at = excluded.updated_at,
            deadline_date = excluded.deadline_date,
            deadline_time = excluded.deadline_time,
            scheduled_date = excluded.scheduled_date,
            scheduled_time = excluded.scheduled_time,
            done_at = excluded.done_at,
            category_id = excluded.category_id",
        params![
            task.id.0,
            task.name,
            task.created_at.to_rfc3339(),
            task.updated_at.to_rfc3339(),
            deadline_date,
            deadline_time,
            scheduled_date,
            scheduled_time,
            task.done_at.map(|d| d.to_rfc3339()),
            task.category,
        ],
    )?;
    Ok(())
}

fn rule_params(rule: &RecurrenceRule) -> (i64, String, &'static str, i32, i32) {
    let r = &rule.recurrence;
    (
        rule.task_id.0,
        r.start.format(DATE_FORMAT).to_string(),
        r.kind.as_str(),
        r.step,
        r.ordinal,
    )
}

impl TaskStore for TaskDb {
    fn load(&self) -> crate::error::Result<Snapshot> {
        let rules = self.load_rules()?;
        let recurring: BTreeSet<TaskId> = rules.iter().map(|r| r.task_id).collect();
        Ok(Snapshot {
            tasks: self.load_tasks(&recurring)?,
            rules,
            edges: self.load_edges()?,
        })
    }

    fn commit(&mut self, commit: &Commit) -> crate::error::Result<()> {
        let tx = self.conn.transaction()?;

        for task in &commit.upserts {
            upsert_task(&tx, task)?;
        }

        for rule in &commit.rules.removed {
            let (task_id, start, kind, step, ordinal) = rule_params(rule);
            tx.execute(
                "DELETE FROM recurrence_rules WHERE id = (
                    SELECT id FROM recurrence_rules
                    WHERE task_id = ?1 AND start_date = ?2 AND kind = ?3
                      AND step = ?4 AND ordinal = ?5
                    LIMIT 1
                 )",
                params![task_id, start, kind, step, ordinal],
            )?;
        }
        for rule in &commit.rules.added {
            let (task_id, start, kind, step, ordinal) = rule_params(rule);
            tx.execute(
                "INSERT INTO recurrence_rules (task_id, start_date, kind, step, ordinal)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![task_id, start, kind, step, ordinal],
            )?;
        }

        for edge in &commit.edges.removed {
            tx.execute(
                "DELETE FROM task_hierarchy WHERE ancestor = ?1 AND descendant = ?2",
                params![edge.ancestor.0, edge.descendant.0],
            )?;
        }
        for edge in &commit.edges.inserted {
            tx.execute(
                "INSERT INTO task_hierarchy (ancestor, descendant, depth) VALUES (?1, ?2, ?3)",
                params![edge.ancestor.0, edge.descendant.0, edge.depth],
            )?;
        }

        for id in &commit.deleted {
            tx.execute("DELETE FROM recurrence_rules WHERE task_id = ?1", params![id.0])?;
            tx.execute("DELETE FROM tasks WHERE id = ?1", params![id.0])?;
        }

        tx.commit()?;
        Ok(())
    }
}
