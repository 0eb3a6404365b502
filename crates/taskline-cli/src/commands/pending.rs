use std::path::PathBuf;

use crate::commands::common::{
    command_to_pending_item, format_pending_lines, open_workspace, PendingItem,
};
use crate::error::CliError;

pub async fn run_pending(as_json: bool, data_dir: Option<PathBuf>) -> Result<(), CliError> {
    let workspace = open_workspace(data_dir).await?;
    let commands = workspace.engine.pending_commands().await;

    if as_json {
        let json_items = commands
            .iter()
            .map(command_to_pending_item)
            .collect::<Vec<PendingItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if commands.is_empty() {
        println!("Nothing waiting to sync.");
        return Ok(());
    }

    for line in format_pending_lines(&commands) {
        println!("{line}");
    }
    Ok(())
}
