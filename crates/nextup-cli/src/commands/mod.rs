pub mod completions;
pub mod config;
pub mod current;
pub mod parents;
pub mod task;

use std::path::Path;
use std::sync::Arc;

use chrono::Local;
use nextup_core::{Config, Planner, SystemClock, TaskDb, Thresholds};

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Open the planner over `db`, or over the configured database.
///
/// Thresholds are derived from the local time and `day.starts_at`.
pub fn open_planner(db: Option<&Path>) -> Result<Planner<TaskDb>, Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let path = match db {
        Some(path) => path.to_path_buf(),
        None => config.database_path()?,
    };
    tracing::debug!(path = %path.display(), "opening task database");
    let store = TaskDb::open_at(&path)?;
    let thresholds = Thresholds::at(&Local::now(), config.day_start()?);
    Ok(Planner::open(store, Arc::new(SystemClock), thresholds)?)
}

pub fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> CmdResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
