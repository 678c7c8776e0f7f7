use colored::{ColoredString, Colorize};
use diskflow_core::{RunStatus, StepStatus, WorkflowRun};

pub fn run_status(status: RunStatus) -> ColoredString {
    colorize_run_status(status.to_string(), status)
}

/// Run status padded to `width` before coloring, for tables
pub fn run_status_cell(status: RunStatus, width: usize) -> ColoredString {
    colorize_run_status(format!("{:<width$}", status.to_string()), status)
}

fn colorize_run_status(text: String, status: RunStatus) -> ColoredString {
    match status {
        RunStatus::Completed => text.green(),
        RunStatus::Failed => text.red(),
        RunStatus::Aborted => text.yellow(),
        RunStatus::Running => text.cyan(),
        RunStatus::Pending => text.dimmed(),
    }
}

fn step_status(status: StepStatus) -> ColoredString {
    let text = format!("{:<12}", status.to_string());
    match status {
        StepStatus::Succeeded => text.green(),
        StepStatus::Failed => text.red(),
        StepStatus::Running => text.cyan(),
        StepStatus::NotStarted => text.dimmed(),
    }
}

/// Step a run would continue with, for listings
pub fn current_step(run: &WorkflowRun) -> String {
    run.next_step()
        .map(|kind| kind.to_string())
        .unwrap_or_else(|| "-".to_string())
}

pub fn print_run(run: &WorkflowRun) {
    let params = &run.params;
    println!("{} {}", "Run".bold(), run.id.to_string().cyan());
    println!("  Disk:     {} ({})", params.disk_name, params.resource_group);
    println!("  VM:       {} (LUN {})", params.vm_name, params.lun);
    println!(
        "  Size:     {} GB → {} GB ({}, {})",
        params.initial_size_gb, params.target_size_gb, params.sku, params.location
    );
    println!("  Status:   {}", run_status(run.status));
    println!(
        "  Created:  {}",
        run.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!(
        "  Updated:  {}",
        run.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!();
    println!(
        "{}",
        format!("  {:<8} {:<12} {:<9} {}", "STEP", "STATUS", "ATTEMPTS", "LAST ERROR").bold()
    );
    println!("  {}", "─".repeat(60).dimmed());

    for step in &run.steps {
        let error = step
            .last_error
            .as_ref()
            .map(|e| e.to_string())
            .unwrap_or_default();
        println!(
            "  {:<8} {} {:<9} {}",
            step.kind.to_string(),
            step_status(step.status),
            step.attempt_count,
            error.red()
        );
    }
}

/// One-paragraph outcome after `run` or `resume`
pub fn print_outcome(run: &WorkflowRun) {
    println!();
    match run.status {
        RunStatus::Completed => {
            println!(
                "{}",
                format!("✓ Run {} completed", run.id).green().bold()
            );
        }
        RunStatus::Failed => {
            println!("{}", format!("✗ Run {} failed", run.id).red().bold());
            if let Some(step) = run.failed_step() {
                println!("  Step:  {}", step.kind.to_string().cyan());
                if let Some(error) = &step.last_error {
                    println!("  Kind:  {} ({})", error.kind.yellow(), error.class);
                    println!("  Error: {}", error.message);
                }
            }
            print_resume_hint(run);
        }
        RunStatus::Aborted => {
            println!(
                "{}",
                format!("⚠ Run {} aborted before {}", run.id, current_step(run))
                    .yellow()
                    .bold()
            );
            print_resume_hint(run);
        }
        RunStatus::Pending | RunStatus::Running => {
            println!("Run {} is {}", run.id, run_status(run.status));
        }
    }
}

fn print_resume_hint(run: &WorkflowRun) {
    println!();
    println!("  Resume with: {}", format!("diskflow resume --id {}", run.id).cyan());
}
