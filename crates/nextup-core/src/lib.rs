//! # Nextup Core Library
//!
//! This library provides the core logic of the Nextup task manager: out of
//! chains of dependent, possibly recurring tasks it selects the one task that
//! is actionable right now. All operations are available through the `nextup`
//! CLI binary, which is a thin layer over this crate.
//!
//! ## Architecture
//!
//! - **Hierarchy**: a closure table over linear task chains
//! - **Recurrence**: calendar rules deciding whether a task recurs on a date
//! - **Selector**: a pure function from tasks, chains and thresholds to the
//!   current task
//! - **Planner**: the single writer that validates, persists, and publishes
//!   changes and the current task
//! - **Storage**: SQLite task storage and TOML-based configuration
//!
//! ## Key Components
//!
//! - [`Planner`]: mutation entry point and current-task feed
//! - [`HierarchyIndex`]: chain closure table
//! - [`Recurrence`]: recurrence rule
//! - [`TaskDb`]: SQLite persistence
//! - [`Config`]: Application configuration management

pub mod clock;
pub mod error;
pub mod events;
pub mod hierarchy;
pub mod planner;
pub mod recurrence;
pub mod selector;
pub mod storage;
pub mod task;

pub use clock::{Clock, ManualClock, SystemClock, Thresholds};
pub use error::{ConfigError, CoreError, DatabaseError, RuleError, ValidationError};
pub use events::Event;
pub use hierarchy::{EdgeChanges, HierarchyEdge, HierarchyIndex};
pub use planner::Planner;
pub use recurrence::{Recurrence, RecurrenceKind, RecurrenceRule};
pub use selector::select_current;
pub use storage::{Config, MemoryStore, TaskDb, TaskStore};
pub use task::{DateSpec, NewTask, ParentUpdate, Task, TaskFields, TaskId};
