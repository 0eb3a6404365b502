use std::path::PathBuf;

use taskline_core::{CommandSink, FieldChanges, FolderId, TaskAssembler};

use crate::commands::common::{
    is_clear_value, open_workspace, parse_due, parse_status, resolve_task, sync_after_mutation,
};
use crate::error::CliError;

pub struct EditArgs {
    pub title: Option<String>,
    pub description: Option<String>,
    pub due: Option<String>,
    pub folder: Option<String>,
    pub status: Option<String>,
}

impl EditArgs {
    /// Field changes for the given flags. An empty description or a
    /// `none` due date or folder clears the field.
    pub fn to_changes(&self, assembler: &TaskAssembler) -> Result<FieldChanges, CliError> {
        let mut changes = FieldChanges::default();
        if let Some(title) = &self.title {
            let title = title.trim();
            if title.is_empty() {
                return Err(CliError::EmptyTitle);
            }
            changes = changes.title(title);
        }
        if let Some(description) = &self.description {
            changes = changes.description(
                taskline_core::util::normalize_text_option(Some(description.clone())),
            );
        }
        if let Some(status) = self.status.as_deref() {
            changes = changes.status(parse_status(status)?);
        }
        if let Some(due) = self.due.as_deref() {
            changes = changes.due_date(parse_due(due, assembler)?);
        }
        if let Some(folder) = self.folder.as_deref() {
            let folder_id = (!is_clear_value(folder)).then(|| FolderId::from(folder.trim()));
            changes = changes.folder_id(folder_id);
        }
        if changes.is_empty() {
            return Err(CliError::NothingToEdit);
        }
        Ok(changes)
    }
}

pub async fn run_edit(id: &str, args: EditArgs, data_dir: Option<PathBuf>) -> Result<(), CliError> {
    let workspace = open_workspace(data_dir).await?;
    let task = resolve_task(id, &workspace.engine).await?;
    let changes = args.to_changes(&workspace.assembler())?;

    workspace
        .engine
        .update_task(task.id.clone(), changes)
        .await?;
    sync_after_mutation(&workspace).await;
    println!("{}", task.id);
    Ok(())
}
