pub mod abort;
pub mod list;
pub mod resume;
pub mod run;
pub mod status;

use crate::Exit;
use colored::Colorize;
use diskflow_core::{RunStatus, WorkflowRun};
use uuid::Uuid;

/// Run ids are UUIDs; any other string names no stored run
pub fn parse_run_id(raw: &str) -> Option<Uuid> {
    Uuid::parse_str(raw.trim()).ok()
}

pub fn unknown_run(raw: &str) -> Exit {
    eprintln!("{} Unknown workflow run: {}", "Error:".red().bold(), raw);
    Exit::NotFound
}

/// Exit code reflecting how a driven run ended
pub fn exit_for(run: &WorkflowRun) -> Exit {
    match run.status {
        RunStatus::Completed => Exit::Success,
        _ => Exit::Failure,
    }
}
