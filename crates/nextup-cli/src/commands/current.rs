use std::path::Path;

use chrono::{Local, NaiveDateTime, TimeZone};
use nextup_core::{Config, Thresholds};

use super::{open_planner, print_json, CmdResult};

fn parse_local(at: &str) -> Result<chrono::DateTime<Local>, Box<dyn std::error::Error>> {
    let naive = NaiveDateTime::parse_from_str(at.trim(), "%Y-%m-%d %H:%M")
        .map_err(|e| format!("invalid time '{at}': {e}"))?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| format!("'{at}' does not exist in the local time zone").into())
}

/// Print the current task as JSON (`null` when there is none).
pub fn run(at: Option<&str>, db: Option<&Path>) -> CmdResult {
    let planner = open_planner(db)?;
    let current = match at {
        Some(at) => {
            let day_start = Config::load()?.day_start()?;
            let thresholds = Thresholds::at(&parse_local(at)?, day_start);
            planner.current_task(&thresholds)
        }
        None => planner.watch_current().borrow().clone(),
    };
    print_json(&current)
}
