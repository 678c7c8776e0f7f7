use crate::Exit;
use crate::context::AppContext;
use colored::Colorize;
use diskflow_core::AbortSignal;
use uuid::Uuid;

pub async fn handle(ctx: &AppContext, id: Uuid) -> anyhow::Result<Exit> {
    let engine = ctx.engine(AbortSignal::new())?;

    match engine.abort(id).await {
        Ok(run) => {
            println!("{}", format!("⚠ Run {} aborted", run.id).yellow().bold());
            println!("  Resume with: {}", format!("diskflow resume --id {}", run.id).cyan());
            Ok(Exit::Success)
        }
        Err(err) if err.is_locked() => {
            eprintln!(
                "{} {}\n  Stop the process driving the run (Ctrl-C) instead.",
                "Error:".red().bold(),
                err
            );
            Ok(Exit::Failure)
        }
        Err(err) => Err(err.into()),
    }
}
