use std::path::PathBuf;

use taskline_core::{CommandSink, FolderId, TaskDraft};

use crate::commands::common::{
    normalize_title, open_workspace, parse_due, parse_status, sync_after_mutation,
};
use crate::error::CliError;

pub struct AddArgs {
    pub title: Vec<String>,
    pub description: Option<String>,
    pub due: Option<String>,
    pub folder: Option<String>,
    pub status: Option<String>,
}

pub async fn run_add(args: AddArgs, data_dir: Option<PathBuf>) -> Result<(), CliError> {
    let title = normalize_title(&args.title)?;
    let workspace = open_workspace(data_dir).await?;

    let mut draft = TaskDraft::new(title);
    draft.description = taskline_core::util::normalize_text_option(args.description);
    draft.folder_id = taskline_core::util::normalize_text_option(args.folder).map(FolderId::from);
    if let Some(status) = args.status.as_deref() {
        draft.status = parse_status(status)?;
    }
    if let Some(due) = args.due.as_deref() {
        draft.due_date = parse_due(due, &workspace.assembler())?;
    }

    let id = workspace.engine.create_task(draft).await?;
    sync_after_mutation(&workspace).await;

    // The server may have replaced the id during the sync above.
    let current = workspace.engine.task(&id).await;
    println!("{}", current.map_or(id, |task| task.id));
    Ok(())
}
