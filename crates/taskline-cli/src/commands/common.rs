use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use taskline_core::sync::{FolderDirectory, HttpSyncClient, SyncBatch, SyncResponse, SyncTransport};
use taskline_core::{
    Command, CommandLog, Folder, JsonFileLogStore, LibSqlTaskStore, SyncEngine, SyncOutcome,
    SyncReport, SyncSettings, Task, TaskAssembler, TaskId, TaskStatus, UserId,
};

use crate::error::CliError;

const DB_FILE_NAME: &str = "taskline.db";
const MAX_PREFIX_MATCHES: usize = 3;

pub type Engine = SyncEngine<Remote, Remote, LibSqlTaskStore>;

/// Remote side of the engine: the HTTP client, or nothing when offline
#[derive(Debug, Clone)]
pub enum Remote {
    Offline,
    Http(HttpSyncClient),
}

impl SyncTransport for Remote {
    async fn send_batch(&self, batch: &SyncBatch) -> taskline_core::Result<SyncResponse> {
        match self {
            Self::Offline => Err(taskline_core::Error::Network(
                "sync is not configured".to_string(),
            )),
            Self::Http(client) => client.send_batch(batch).await,
        }
    }
}

impl FolderDirectory for Remote {
    async fn list_folders(&self, user_id: &UserId) -> taskline_core::Result<Vec<Folder>> {
        match self {
            Self::Offline => Err(taskline_core::Error::Network(
                "sync is not configured".to_string(),
            )),
            Self::Http(client) => client.list_folders(user_id).await,
        }
    }
}

/// An opened engine together with the settings it was built from
pub struct Workspace {
    pub settings: SyncSettings,
    pub data_dir: PathBuf,
    pub engine: Engine,
}

impl Workspace {
    pub const fn is_sync_configured(&self) -> bool {
        self.settings.is_sync_configured()
    }

    pub fn assembler(&self) -> TaskAssembler {
        TaskAssembler::new(self.settings.utc_offset)
    }
}

pub async fn open_workspace(cli_data_dir: Option<PathBuf>) -> Result<Workspace, CliError> {
    let settings = SyncSettings::from_env()?;
    let data_dir = resolve_data_dir(cli_data_dir, &settings)?;
    open_workspace_with(settings, &data_dir).await
}

pub async fn open_workspace_with(
    settings: SyncSettings,
    data_dir: &Path,
) -> Result<Workspace, CliError> {
    std::fs::create_dir_all(data_dir)?;

    let log = CommandLog::open(
        settings.user_id.clone(),
        JsonFileLogStore::for_user(data_dir, &settings.user_id),
    );
    let store = LibSqlTaskStore::open_path(data_dir.join(DB_FILE_NAME)).await?;
    let remote = HttpSyncClient::from_settings(&settings)?.map_or(Remote::Offline, Remote::Http);

    let engine = SyncEngine::open(&settings, log, remote.clone(), remote, store).await?;
    Ok(Workspace {
        settings,
        data_dir: data_dir.to_path_buf(),
        engine,
    })
}

pub fn resolve_data_dir(
    cli_data_dir: Option<PathBuf>,
    settings: &SyncSettings,
) -> Result<PathBuf, CliError> {
    if let Some(dir) = cli_data_dir.or_else(|| settings.data_dir.clone()) {
        return Ok(dir);
    }
    default_data_dir()
}

pub fn default_data_dir() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("taskline"))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI data directory".to_string()))
}

/// Find a visible task by full id (following server remaps) or unique prefix
pub async fn resolve_task(query: &str, engine: &Engine) -> Result<Task, CliError> {
    let query = normalize_task_identifier(query)?;
    if let Some(task) = engine.task(&TaskId::from(query.as_str())).await {
        return Ok(task);
    }

    let mut matching = engine
        .tasks()
        .await
        .into_iter()
        .filter(|task| task.id.as_str().starts_with(&query))
        .collect::<Vec<_>>();

    match matching.len() {
        0 => Err(CliError::TaskNotFound(query)),
        1 => Ok(matching.remove(0)),
        _ => {
            let options = matching
                .iter()
                .take(MAX_PREFIX_MATCHES)
                .map(|task| task.id.as_str().chars().take(13).collect::<String>())
                .collect::<Vec<_>>()
                .join(", ");

            Err(CliError::AmbiguousTaskId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn normalize_task_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyTaskId)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn normalize_title(parts: &[String]) -> Result<String, CliError> {
    let collapsed = parts
        .iter()
        .flat_map(|part| part.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ");
    if collapsed.is_empty() {
        Err(CliError::EmptyTitle)
    } else {
        Ok(collapsed)
    }
}

pub fn parse_status(raw: &str) -> Result<TaskStatus, CliError> {
    raw.parse::<TaskStatus>().map_err(CliError::InvalidArgument)
}

/// `None` for the literal `none`, which clears a field on edit
pub fn parse_due(raw: &str, assembler: &TaskAssembler) -> Result<Option<DateTime<Utc>>, CliError> {
    if is_clear_value(raw) {
        return Ok(None);
    }
    assembler
        .parse_date_str(raw)
        .map(Some)
        .ok_or_else(|| CliError::InvalidArgument(format!("unrecognized date '{}'", raw.trim())))
}

pub fn is_clear_value(raw: &str) -> bool {
    let trimmed = raw.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none")
}

#[derive(Debug, Serialize)]
pub struct TaskListItem {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub virtual_status: Option<&'static str>,
    pub due_date: Option<String>,
    pub folder_id: Option<String>,
    pub folder_name: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub sync_marker: &'static str,
}

pub fn task_to_list_item(task: &Task, now: DateTime<Utc>) -> TaskListItem {
    TaskListItem {
        id: task.id.to_string(),
        title: task.title.clone(),
        description: task.description.clone(),
        status: task.status,
        virtual_status: task.virtual_status(now).map(|status| status.as_str()),
        due_date: task.due_date.map(|due| due.to_rfc3339()),
        folder_id: task.folder_id().map(ToString::to_string),
        folder_name: task.folder.as_ref().and_then(|folder| folder.name.clone()),
        created_at: task.created_at.to_rfc3339(),
        updated_at: task.updated_at.to_rfc3339(),
        sync_marker: task.sync_marker.as_str(),
    }
}

pub fn format_task_lines(tasks: &[Task], now: DateTime<Utc>) -> Vec<String> {
    let now_ms = now.timestamp_millis();
    tasks
        .iter()
        .map(|task| {
            let short_id = task.id.short();
            let mark = status_mark(task.status);
            let preview = title_preview(&task.title, 40);
            let mut line = format!(
                "{short_id:<8}  {mark} {preview:<40}  {}",
                format_relative_time(task.updated_at.timestamp_millis(), now_ms)
            );

            if let Some(due) = task.due_date {
                line.push_str(&format!("  due {}", due.format("%Y-%m-%d")));
            }
            if let Some(folder) = &task.folder {
                line.push_str(&format!(
                    "  @{}",
                    folder.name.as_deref().unwrap_or_else(|| folder.id.as_str())
                ));
            }
            if let Some(status) = task.virtual_status(now) {
                line.push_str(&format!("  [{}]", status.as_str()));
            }
            line
        })
        .collect()
}

const fn status_mark(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "[ ]",
        TaskStatus::InProgress => "[~]",
        TaskStatus::Completed => "[x]",
    }
}

pub fn title_preview(title: &str, max_chars: usize) -> String {
    let collapsed = title.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn format_sync_timestamp(value: Option<DateTime<Utc>>) -> String {
    value.map_or_else(
        || "never".to_string(),
        |at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

#[derive(Debug, Serialize)]
pub struct PendingItem {
    pub command_id: String,
    pub kind: &'static str,
    pub entity_id: Option<String>,
}

pub fn command_to_pending_item(command: &Command) -> PendingItem {
    PendingItem {
        command_id: command.command_id().to_string(),
        kind: command.kind().as_str(),
        entity_id: command.entity_id().map(ToString::to_string),
    }
}

pub fn format_pending_lines(commands: &[Command]) -> Vec<String> {
    commands
        .iter()
        .map(|command| {
            let entity = command.entity_id().map_or("-", TaskId::short);
            format!(
                "{:<8}  {:<8}  {}",
                command.kind().as_str(),
                entity,
                command.command_id()
            )
        })
        .collect()
}

pub fn format_sync_report(report: &SyncReport) -> Vec<String> {
    let mut lines = vec![format!(
        "Sync completed: {} shipped, {} acknowledged, {} updated, {} removed",
        report.shipped, report.acknowledged, report.upserted, report.removed
    )];
    if report.remapped > 0 {
        lines.push(format!(
            "{} task id(s) replaced by the server",
            report.remapped
        ));
    }
    for failed in &report.failed {
        lines.push(format!(
            "Rejected {}: {}",
            failed.command_id,
            failed.error_message.as_deref().unwrap_or("no reason given")
        ));
    }
    for conflict in &report.conflicts {
        lines.push(format!(
            "Conflict on {} ({}); server version kept",
            conflict
                .entity_id
                .as_ref()
                .map_or("unknown task", TaskId::as_str),
            conflict.conflict_type.as_deref().unwrap_or("unspecified")
        ));
    }
    if report.discarded > 0 {
        lines.push(format!(
            "Skipped {} unreadable server row(s)",
            report.discarded
        ));
    }
    lines
}

/// Push a just-queued mutation when the settings ask for it. Failures only
/// warn; the command stays queued for the next round.
pub async fn sync_after_mutation(workspace: &Workspace) {
    if !workspace.is_sync_configured() || !workspace.settings.sync_on_mutation {
        return;
    }
    match workspace.engine.sync_now().await {
        Ok(SyncOutcome::Completed(report)) => {
            tracing::debug!(shipped = report.shipped, "Synced after local change");
        }
        Ok(SyncOutcome::Coalesced) => {}
        Err(error) => {
            tracing::warn!("Sync after local change failed: {}", error);
        }
    }
}
