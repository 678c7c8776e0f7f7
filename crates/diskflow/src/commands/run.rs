use crate::Exit;
use crate::commands::exit_for;
use crate::context::{self, AppContext};
use crate::output;
use colored::Colorize;
use diskflow_core::{AbortSignal, WorkflowParams};

pub struct RunArgs {
    pub resource_group: String,
    pub vm: String,
    pub disk: String,
    pub size: u32,
    pub target_size: u32,
    pub sku: Option<String>,
    pub location: Option<String>,
    pub lun: Option<u32>,
}

pub async fn handle(ctx: &AppContext, args: RunArgs) -> anyhow::Result<Exit> {
    if args.target_size < args.size {
        eprintln!(
            "{} --target-size ({} GB) must not be smaller than --size ({} GB); disks can only grow",
            "Error:".red().bold(),
            args.target_size,
            args.size
        );
        return Ok(Exit::Usage);
    }

    let defaults = &ctx.config.defaults;
    let params = WorkflowParams::new(
        args.resource_group,
        args.vm,
        args.disk,
        args.size,
        args.target_size,
    )
    .with_sku(args.sku.unwrap_or_else(|| defaults.sku.clone()))
    .with_location(args.location.unwrap_or_else(|| defaults.location.clone()))
    .with_lun(args.lun.unwrap_or(defaults.lun));

    println!("{}", "Starting disk workflow...".blue());
    println!(
        "Disk: {} ({} GB → {} GB) on {} in {}",
        params.disk_name.cyan(),
        params.initial_size_gb,
        params.target_size_gb,
        params.vm_name.cyan(),
        params.resource_group.cyan()
    );

    ctx.verify_provider().await?;
    let abort = AbortSignal::new();
    let engine = ctx.engine(abort.clone())?;
    context::abort_on_ctrl_c(abort);

    let run = engine.run(params).await?;
    output::print_outcome(&run);
    Ok(exit_for(&run))
}
