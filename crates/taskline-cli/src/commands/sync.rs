use std::path::PathBuf;

use taskline_core::SyncOutcome;

use crate::commands::common::{format_sync_report, open_workspace};
use crate::error::CliError;

pub async fn run_sync(data_dir: Option<PathBuf>) -> Result<(), CliError> {
    let workspace = open_workspace(data_dir).await?;
    if !workspace.is_sync_configured() {
        return Err(CliError::SyncNotConfigured);
    }

    match workspace.engine.sync_now().await? {
        SyncOutcome::Completed(report) => {
            for line in format_sync_report(&report) {
                println!("{line}");
            }
        }
        SyncOutcome::Coalesced => println!("Sync already running"),
    }
    Ok(())
}
