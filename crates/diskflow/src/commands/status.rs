use crate::Exit;
use crate::context::AppContext;
use crate::output;
use diskflow_core::{StateStore, StoreError, WorkflowError};
use uuid::Uuid;

pub async fn handle(ctx: &AppContext, id: Uuid, json: bool) -> anyhow::Result<Exit> {
    let run = match ctx.store.load(id).await {
        Ok(run) => run,
        Err(StoreError::NotFound(_)) => return Err(WorkflowError::UnknownRun(id).into()),
        Err(e) => return Err(WorkflowError::from(e).into()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        output::print_run(&run);
    }
    Ok(Exit::Success)
}
