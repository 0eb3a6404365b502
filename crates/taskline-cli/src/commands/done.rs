use std::path::PathBuf;

use taskline_core::{CommandSink, FieldChanges, TaskStatus};

use crate::commands::common::{open_workspace, resolve_task, sync_after_mutation};
use crate::error::CliError;

pub async fn run_done(id: &str, data_dir: Option<PathBuf>) -> Result<(), CliError> {
    let workspace = open_workspace(data_dir).await?;
    let task = resolve_task(id, &workspace.engine).await?;

    if task.status == TaskStatus::Completed {
        println!("{}", task.id);
        return Ok(());
    }

    workspace
        .engine
        .update_task(
            task.id.clone(),
            FieldChanges::default().status(TaskStatus::Completed),
        )
        .await?;
    sync_after_mutation(&workspace).await;
    println!("{}", task.id);
    Ok(())
}
