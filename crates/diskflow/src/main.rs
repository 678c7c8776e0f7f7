mod commands;
mod context;
mod output;

use clap::{Parser, Subcommand};
use colored::Colorize;
use context::AppContext;
use diskflow_core::{StepKind, WorkflowError};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "diskflow")]
#[command(version)]
#[command(about = "Resumable create → attach → resize → detach → delete workflows for cloud disks", long_about = None)]
struct Cli {
    /// Config file (default: ./diskflow.yaml, then ~/.config/diskflow/config.yaml)
    #[arg(long, global = true, env = "DISKFLOW_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Directory holding workflow run records
    #[arg(long, global = true, env = "DISKFLOW_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new workflow run
    Run {
        /// Resource group holding the VM and the disk
        #[arg(short = 'g', long)]
        resource_group: String,
        /// VM to attach the disk to
        #[arg(long)]
        vm: String,
        /// Name of the disk to create
        #[arg(long)]
        disk: String,
        /// Initial disk size in GB
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        size: u32,
        /// Size in GB to grow the disk to while attached
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        target_size: u32,
        /// Disk SKU (default from config: Standard_LRS)
        #[arg(long)]
        sku: Option<String>,
        /// Region (default from config: eastus)
        #[arg(long)]
        location: Option<String>,
        /// LUN to attach at (default from config: 0)
        #[arg(long)]
        lun: Option<u32>,
    },
    /// Continue a failed, aborted or interrupted run
    Resume {
        /// Run ID
        #[arg(long)]
        id: String,
        /// Step expected to run next (create, attach, resize, detach, delete)
        #[arg(long)]
        from: Option<StepKind>,
    },
    /// Show a run
    Status {
        /// Run ID
        #[arg(long)]
        id: String,
        /// Print the stored record as JSON
        #[arg(long)]
        json: bool,
    },
    /// List all runs
    List,
    /// Mark a run as aborted
    Abort {
        /// Run ID
        #[arg(long)]
        id: String,
    },
}

/// Process exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Success = 0,
    Failure = 1,
    Usage = 2,
    NotFound = 3,
}

impl Exit {
    fn for_error(err: &anyhow::Error) -> Self {
        match err.downcast_ref::<WorkflowError>() {
            Some(WorkflowError::UnknownRun(_)) => Exit::NotFound,
            Some(e) if e.is_invalid_workflow() => Exit::Usage,
            Some(WorkflowError::InvalidParams(_)) => Exit::Usage,
            _ => Exit::Failure,
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn dispatch(cli: Cli) -> anyhow::Result<Exit> {
    let ctx = AppContext::load(cli.config.as_deref(), cli.state_dir)?;

    match cli.command {
        Commands::Run {
            resource_group,
            vm,
            disk,
            size,
            target_size,
            sku,
            location,
            lun,
        } => {
            let args = commands::run::RunArgs {
                resource_group,
                vm,
                disk,
                size,
                target_size,
                sku,
                location,
                lun,
            };
            commands::run::handle(&ctx, args).await
        }
        Commands::Resume { id, from } => match commands::parse_run_id(&id) {
            Some(id) => commands::resume::handle(&ctx, id, from).await,
            None => Ok(commands::unknown_run(&id)),
        },
        Commands::Status { id, json } => match commands::parse_run_id(&id) {
            Some(id) => commands::status::handle(&ctx, id, json).await,
            None => Ok(commands::unknown_run(&id)),
        },
        Commands::List => commands::list::handle(&ctx).await,
        Commands::Abort { id } => match commands::parse_run_id(&id) {
            Some(id) => commands::abort::handle(&ctx, id).await,
            None => Ok(commands::unknown_run(&id)),
        },
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let exit = match dispatch(cli).await {
        Ok(exit) => exit,
        Err(err) => {
            eprintln!("{} {:#}", "Error:".red().bold(), err);
            Exit::for_error(&err)
        }
    };

    std::process::exit(exit as i32);
}
