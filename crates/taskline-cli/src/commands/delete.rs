use std::path::PathBuf;

use taskline_core::CommandSink;

use crate::commands::common::{open_workspace, resolve_task, sync_after_mutation};
use crate::error::CliError;

pub async fn run_delete(
    id: &str,
    reason: Option<String>,
    data_dir: Option<PathBuf>,
) -> Result<(), CliError> {
    let workspace = open_workspace(data_dir).await?;
    let task = resolve_task(id, &workspace.engine).await?;

    let reason = taskline_core::util::normalize_text_option(reason);
    workspace.engine.delete_task(task.id.clone(), reason).await?;
    sync_after_mutation(&workspace).await;
    println!("{}", task.id);
    Ok(())
}
