use crate::Exit;
use crate::commands::exit_for;
use crate::context::{self, AppContext};
use crate::output;
use colored::Colorize;
use diskflow_core::{AbortSignal, StepKind};
use uuid::Uuid;

pub async fn handle(ctx: &AppContext, id: Uuid, from: Option<StepKind>) -> anyhow::Result<Exit> {
    match from {
        Some(step) => println!(
            "{}",
            format!("Resuming run {} from {}...", id, step).blue()
        ),
        None => println!("{}", format!("Resuming run {}...", id).blue()),
    }

    ctx.verify_provider().await?;
    let abort = AbortSignal::new();
    let engine = ctx.engine(abort.clone())?;
    context::abort_on_ctrl_c(abort);

    let run = engine.resume_from(id, from).await?;
    output::print_outcome(&run);
    Ok(exit_for(&run))
}
