use std::path::PathBuf;

use serde::Serialize;
use taskline_core::SyncStatus;

use crate::commands::common::{format_sync_timestamp, open_workspace};
use crate::error::CliError;

const DEGRADED_WARNING: &str =
    "Warning:     command log could not be written; changes are in memory only";

#[derive(Debug, Serialize)]
pub struct StatusItem {
    pub user_id: String,
    pub data_dir: String,
    pub api_url: Option<String>,
    pub phase: &'static str,
    pub last_synced_at: Option<String>,
    pub pending_commands: usize,
    pub persistence_degraded: bool,
    pub last_error: Option<String>,
}

pub fn format_status_lines(item: &StatusItem, status: &SyncStatus) -> Vec<String> {
    let mut lines = vec![
        format!("User:        {}", item.user_id),
        format!("Data dir:    {}", item.data_dir),
        format!(
            "Server:      {}",
            item.api_url
                .as_deref()
                .unwrap_or("not configured (offline)")
        ),
        format!("Phase:       {}", status.phase),
        format!(
            "Last sync:   {}",
            format_sync_timestamp(status.last_synced_at)
        ),
        format!("Pending:     {}", status.pending_commands),
    ];
    if status.persistence_degraded {
        lines.push(DEGRADED_WARNING.to_string());
    }
    if let Some(error) = &status.last_error {
        lines.push(format!("Last error:  {error}"));
    }
    lines
}

pub async fn run_status(as_json: bool, data_dir: Option<PathBuf>) -> Result<(), CliError> {
    let workspace = open_workspace(data_dir).await?;
    let status = workspace.engine.status().await;
    let item = StatusItem {
        user_id: workspace.settings.user_id.to_string(),
        data_dir: workspace.data_dir.display().to_string(),
        api_url: workspace.settings.api_url.clone(),
        phase: status.phase.as_str(),
        last_synced_at: status.last_synced_at.map(|at| at.to_rfc3339()),
        pending_commands: status.pending_commands,
        persistence_degraded: status.persistence_degraded,
        last_error: status.last_error.clone(),
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&item)?);
        return Ok(());
    }

    for line in format_status_lines(&item, &status) {
        println!("{line}");
    }
    Ok(())
}
