//! Task management commands for CLI.

use std::path::Path;
use std::str::FromStr;

use chrono::{Local, NaiveDate};
use clap::{Args, Subcommand, ValueEnum};
use nextup_core::{
    DateSpec, NewTask, ParentUpdate, Planner, Recurrence, RecurrenceKind, TaskDb, TaskFields,
    TaskId,
};

use super::{open_planner, print_json, CmdResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Repeat {
    Day,
    Week,
    DayOfMonth,
    WeekOfMonth,
    Year,
}

impl From<Repeat> for RecurrenceKind {
    fn from(repeat: Repeat) -> Self {
        match repeat {
            Repeat::Day => RecurrenceKind::Day,
            Repeat::Week => RecurrenceKind::Week,
            Repeat::DayOfMonth => RecurrenceKind::DayOfMonth,
            Repeat::WeekOfMonth => RecurrenceKind::WeekOfMonth,
            Repeat::Year => RecurrenceKind::Year,
        }
    }
}

/// One `--repeat` value: `KIND[@YYYY-MM-DD]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RepeatSpec {
    kind: Repeat,
    start: Option<NaiveDate>,
}

impl FromStr for RepeatSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, start) = match s.split_once('@') {
            Some((kind, start)) => (kind, Some(start)),
            None => (s, None),
        };
        let kind = <Repeat as ValueEnum>::from_str(kind.trim(), true)?;
        let start = start
            .map(|d| {
                NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d")
                    .map_err(|e| format!("invalid start date {d:?}: {e}"))
            })
            .transpose()?;
        Ok(Self { kind, start })
    }
}

/// Recurrence options shared by `add` and `edit`.
#[derive(Args, Debug)]
pub struct RepeatArgs {
    /// Repeat on a calendar pattern (day, week, day-of-month, week-of-month,
    /// year), optionally starting at a date. Give it more than once to
    /// combine patterns.
    #[arg(long, value_name = "KIND[@YYYY-MM-DD]")]
    repeat: Vec<RepeatSpec>,
    /// Every N days/weeks/months/years
    #[arg(long, default_value_t = 1)]
    every: i32,
    /// First date of patterns without their own (default: scheduled date, else today)
    #[arg(long, value_name = "YYYY-MM-DD")]
    repeat_from: Option<NaiveDate>,
    /// Anchor monthly and yearly patterns to the end of the month
    #[arg(long)]
    month_end: bool,
}

impl RepeatArgs {
    fn rules(&self, scheduled: Option<DateSpec>) -> Vec<Recurrence> {
        self.build(&self.repeat, scheduled)
    }

    fn build(&self, specs: &[RepeatSpec], scheduled: Option<DateSpec>) -> Vec<Recurrence> {
        let default_start = self
            .repeat_from
            .or(scheduled.map(|s| s.date))
            .unwrap_or_else(|| Local::now().date_naive());
        specs
            .iter()
            .map(|spec| {
                let start = spec.start.unwrap_or(default_start);
                let kind = RecurrenceKind::from(spec.kind);
                if self.month_end {
                    Recurrence::anchored_to_month_end(start, kind, self.every)
                } else {
                    Recurrence::new(start, kind, self.every)
                }
            })
            .collect()
    }
}

#[derive(Subcommand)]
pub enum TaskAction {
    /// Create a new task
    Add {
        /// Task name
        name: String,
        /// Append to the chain of this task
        #[arg(long, value_name = "ID")]
        parent: Option<TaskId>,
        /// Deadline (YYYY-MM-DD[ HH:MM])
        #[arg(long)]
        deadline: Option<DateSpec>,
        /// Not actionable before (YYYY-MM-DD[ HH:MM])
        #[arg(long)]
        scheduled: Option<DateSpec>,
        /// Category reference
        #[arg(long)]
        category: Option<i64>,
        #[command(flatten)]
        repeat: RepeatArgs,
    },
    /// List tasks
    List {
        /// Only tasks that were never completed
        #[arg(long)]
        open: bool,
    },
    /// Show a task with its rules and chain
    Show {
        /// Task ID
        id: TaskId,
    },
    /// Update a task
    Edit {
        /// Task ID
        id: TaskId,
        /// New name
        #[arg(long)]
        name: Option<String>,
        /// New deadline
        #[arg(long, conflicts_with = "clear_deadline")]
        deadline: Option<DateSpec>,
        #[arg(long)]
        clear_deadline: bool,
        /// New scheduled date
        #[arg(long, conflicts_with = "clear_scheduled")]
        scheduled: Option<DateSpec>,
        #[arg(long)]
        clear_scheduled: bool,
        /// New category
        #[arg(long, conflicts_with = "clear_category")]
        category: Option<i64>,
        #[arg(long)]
        clear_category: bool,
        /// Move the task (and its successors) under this task
        #[arg(long, value_name = "ID", conflicts_with = "detach")]
        parent: Option<TaskId>,
        /// Cut the task (and its successors) into a chain of their own
        #[arg(long)]
        detach: bool,
        /// Drop every recurrence rule
        #[arg(long, conflicts_with_all = ["repeat", "add_repeat"])]
        no_repeat: bool,
        /// Keep the existing rules and add this pattern
        #[arg(long, value_name = "KIND[@YYYY-MM-DD]")]
        add_repeat: Vec<RepeatSpec>,
        #[command(flatten)]
        repeat: RepeatArgs,
    },
    /// Delete a task
    Delete {
        /// Task ID
        id: TaskId,
    },
    /// Mark a task done
    Done {
        /// Task ID
        id: TaskId,
    },
    /// Mark a task not done
    Undone {
        /// Task ID
        id: TaskId,
    },
}

pub fn run(action: TaskAction, db: Option<&Path>) -> CmdResult {
    let mut planner = open_planner(db)?;
    execute(&mut planner, action)
}

pub(crate) fn execute(planner: &mut Planner<TaskDb>, action: TaskAction) -> CmdResult {
    match action {
        TaskAction::Add {
            name,
            parent,
            deadline,
            scheduled,
            category,
            repeat,
        } => {
            let task = planner.create_task(NewTask {
                fields: TaskFields {
                    name,
                    deadline,
                    scheduled_at: scheduled,
                    category,
                },
                rules: repeat.rules(scheduled),
                parent,
            })?;
            println!("Task created: {}", task.id);
            print_json(&task)?;
        }
        TaskAction::List { open } => {
            let tasks: Vec<_> = planner.tasks().filter(|t| !open || t.is_open()).collect();
            print_json(&tasks)?;
        }
        TaskAction::Show { id } => {
            let task = planner.task(id).ok_or(format!("Task not found: {id}"))?;
            let chain: Vec<TaskId> = planner.chain_of(id).iter().map(|t| t.id).collect();
            let next_due = planner.next_due(id, Local::now().date_naive())?;
            print_json(&serde_json::json!({
                "task": task,
                "rules": planner.rules_of(id),
                "chain": chain,
                "next_due": next_due,
            }))?;
        }
        TaskAction::Edit {
            id,
            name,
            deadline,
            clear_deadline,
            scheduled,
            clear_scheduled,
            category,
            clear_category,
            parent,
            detach,
            no_repeat,
            add_repeat,
            repeat,
        } => {
            let existing = planner.task(id).ok_or(format!("Task not found: {id}"))?;

            let fields = TaskFields {
                name: name.unwrap_or_else(|| existing.name.clone()),
                deadline: if clear_deadline {
                    None
                } else {
                    deadline.or(existing.deadline)
                },
                scheduled_at: if clear_scheduled {
                    None
                } else {
                    scheduled.or(existing.scheduled_at)
                },
                category: if clear_category {
                    None
                } else {
                    category.or(existing.category)
                },
            };
            let mut rules = if no_repeat {
                Vec::new()
            } else if repeat.repeat.is_empty() {
                planner.rules_of(id).to_vec()
            } else {
                repeat.rules(fields.scheduled_at)
            };
            rules.extend(repeat.build(&add_repeat, fields.scheduled_at));
            let parent = match (parent, detach) {
                (Some(p), _) => ParentUpdate::Replace(p),
                (None, true) => ParentUpdate::Remove,
                (None, false) => ParentUpdate::Keep,
            };

            let task = planner.update_task(id, fields, rules, parent)?;
            println!("Task updated:");
            print_json(&task)?;
        }
        TaskAction::Delete { id } => {
            planner.delete_task(id)?;
            println!("Task deleted: {id}");
        }
        TaskAction::Done { id } => {
            let task = planner.mark_done(id)?;
            print_json(&task)?;
        }
        TaskAction::Undone { id } => {
            let task = planner.mark_undone(id)?;
            print_json(&task)?;
        }
    }
    Ok(())
}
