use std::path::Path;

use nextup_core::TaskId;

use super::{open_planner, print_json, CmdResult};

pub fn run(query: &str, for_task: Option<TaskId>, db: Option<&Path>) -> CmdResult {
    let planner = open_planner(db)?;
    if let Some(id) = for_task {
        if planner.task(id).is_none() {
            return Err(format!("Task not found: {id}").into());
        }
    }
    print_json(&planner.candidate_parents(for_task, query))
}
