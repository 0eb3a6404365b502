use std::path::PathBuf;
use std::time::Duration;

use crate::commands::common::open_workspace;
use crate::error::CliError;

pub async fn run_watch(
    interval_secs: Option<u64>,
    data_dir: Option<PathBuf>,
) -> Result<(), CliError> {
    let workspace = open_workspace(data_dir).await?;
    if !workspace.is_sync_configured() {
        return Err(CliError::SyncNotConfigured);
    }

    let interval = interval_secs.map_or(workspace.settings.sync_interval, |secs| {
        (secs > 0).then(|| Duration::from_secs(secs))
    });
    tracing::info!(?interval, "Watching for changes; press Ctrl-C to stop");

    workspace
        .engine
        .run_auto_sync(interval, async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                tracing::warn!("Failed to listen for Ctrl-C: {}", error);
                std::future::pending::<()>().await;
            }
        })
        .await;

    let status = workspace.engine.status().await;
    println!(
        "Stopped with {} pending command(s)",
        status.pending_commands
    );
    Ok(())
}
