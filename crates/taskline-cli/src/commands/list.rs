use std::path::PathBuf;

use chrono::Utc;
use taskline_core::{Task, TaskStatus};

use crate::commands::common::{format_task_lines, open_workspace, task_to_list_item, TaskListItem};
use crate::error::CliError;

pub fn filter_tasks(tasks: Vec<Task>, include_completed: bool, folder: Option<&str>) -> Vec<Task> {
    tasks
        .into_iter()
        .filter(|task| include_completed || task.status != TaskStatus::Completed)
        .filter(|task| {
            folder.is_none_or(|wanted| task.folder_id().is_some_and(|id| id.as_str() == wanted))
        })
        .collect()
}

pub async fn run_list(
    include_completed: bool,
    folder: Option<&str>,
    as_json: bool,
    data_dir: Option<PathBuf>,
) -> Result<(), CliError> {
    let workspace = open_workspace(data_dir).await?;
    let tasks = filter_tasks(workspace.engine.tasks().await, include_completed, folder);
    let now = Utc::now();

    if as_json {
        let json_items = tasks
            .iter()
            .map(|task| task_to_list_item(task, now))
            .collect::<Vec<TaskListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if tasks.is_empty() {
        println!("No tasks found.");
        return Ok(());
    }

    for line in format_task_lines(&tasks, now) {
        println!("{line}");
    }
    Ok(())
}
