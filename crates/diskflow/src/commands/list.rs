use crate::Exit;
use crate::context::AppContext;
use crate::output;
use colored::Colorize;
use diskflow_core::StateStore;

pub async fn handle(ctx: &AppContext) -> anyhow::Result<Exit> {
    let runs = ctx.store.list().await?;

    if runs.is_empty() {
        println!("{}", "No workflow runs".dimmed());
        return Ok(Exit::Success);
    }

    println!(
        "{}",
        format!(
            "{:<36}  {:<20} {:<10} {:<8} {}",
            "ID", "DISK", "STATUS", "STEP", "UPDATED"
        )
        .bold()
    );
    println!("{}", "─".repeat(100).dimmed());

    for run in &runs {
        println!(
            "{:<36}  {:<20} {} {:<8} {}",
            run.id,
            run.params.disk_name,
            output::run_status_cell(run.status, 10),
            output::current_step(run),
            run.updated_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
        );
    }

    println!();
    println!("{} run(s)", runs.len());
    Ok(Exit::Success)
}
