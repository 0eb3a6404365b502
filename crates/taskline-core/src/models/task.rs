//! Task model

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::command::FieldChanges;
use super::ids::{FolderId, TaskId};

/// Stored task status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    /// Wire and storage name
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" | "todo" | "open" => Ok(Self::Pending),
            "in_progress" | "in-progress" | "inprogress" | "doing" => Ok(Self::InProgress),
            "completed" | "complete" | "done" => Ok(Self::Completed),
            other => Err(format!("unknown task status '{other}'")),
        }
    }
}

/// Display-only statuses derived from a task and the current time.
/// Never stored or sent to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VirtualStatus {
    Newest,
    IncomingDue,
    Overdue,
}

impl VirtualStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Newest => "newest",
            Self::IncomingDue => "incoming_due",
            Self::Overdue => "overdue",
        }
    }
}

/// Where a task stands relative to the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMarker {
    /// Created locally, never acknowledged
    New,
    /// Changed locally since the last acknowledgement
    PendingUpdate,
    /// Matches the last server view
    Synced,
}

impl SyncMarker {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::PendingUpdate => "pending_update",
            Self::Synced => "synced",
        }
    }
}

impl FromStr for SyncMarker {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "pending_update" => Ok(Self::PendingUpdate),
            "synced" => Ok(Self::Synced),
            other => Err(format!("unknown sync marker '{other}'")),
        }
    }
}

/// Folder reference carried by a task, with the display name cached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderRef {
    pub id: FolderId,
    #[serde(default)]
    pub name: Option<String>,
}

impl FolderRef {
    pub fn new(id: FolderId) -> Self {
        Self { id, name: None }
    }
}

/// A task in the system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub due_date: Option<DateTime<Utc>>,
    pub folder: Option<FolderRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Tombstone marker; a deleted task is never shown
    pub deleted_at: Option<DateTime<Utc>>,
    pub sync_marker: SyncMarker,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a pending, never-synced task
    pub fn new(id: TaskId, title: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            id,
            title: title.into(),
            description: None,
            status: TaskStatus::Pending,
            due_date: None,
            folder: None,
            created_at: at,
            updated_at: at,
            deleted_at: None,
            sync_marker: SyncMarker::New,
            last_synced_at: None,
        }
    }

    /// Title used when neither the payload nor the command carried one
    pub fn placeholder_title(id: &TaskId) -> String {
        format!("Task {}", id.short())
    }

    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Copy with only the named fields changed. `updated_at` and the
    /// marker are left to the caller.
    #[must_use]
    pub fn with_changes(&self, changes: &FieldChanges) -> Self {
        let mut next = self.clone();
        if let Some(title) = &changes.title {
            next.title.clone_from(title);
        }
        if let Some(description) = &changes.description {
            next.description.clone_from(description);
        }
        if let Some(status) = changes.status {
            next.status = status;
        }
        if let Some(due_date) = changes.due_date {
            next.due_date = due_date;
        }
        if let Some(folder_id) = &changes.folder_id {
            next.folder = match (folder_id, &self.folder) {
                (Some(id), Some(current)) if current.id == *id => Some(current.clone()),
                (Some(id), _) => Some(FolderRef::new(id.clone())),
                (None, _) => None,
            };
        }
        next
    }

    /// Tombstone copy
    #[must_use]
    pub fn tombstoned(&self, at: DateTime<Utc>) -> Self {
        Self {
            deleted_at: Some(at),
            sync_marker: SyncMarker::PendingUpdate,
            ..self.clone()
        }
    }

    /// Derived display status relative to `now`
    pub fn virtual_status(&self, now: DateTime<Utc>) -> Option<VirtualStatus> {
        if self.status != TaskStatus::Completed {
            if let Some(due) = self.due_date {
                if due < now {
                    return Some(VirtualStatus::Overdue);
                }
                if due - now <= Duration::hours(24) {
                    return Some(VirtualStatus::IncomingDue);
                }
            }
        }
        if now - self.created_at <= Duration::hours(24) {
            return Some(VirtualStatus::Newest);
        }
        None
    }

    pub fn folder_id(&self) -> Option<&FolderId> {
        self.folder.as_ref().map(|folder| &folder.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_status_aliases() {
        assert_eq!("done".parse::<TaskStatus>(), Ok(TaskStatus::Completed));
        assert_eq!(
            "In-Progress".parse::<TaskStatus>(),
            Ok(TaskStatus::InProgress)
        );
        assert!("blocked".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_partial_update_preserves_untouched_fields() {
        let mut task = Task::new(TaskId::from("t1"), "A", at(1));
        task.folder = Some(FolderRef {
            id: FolderId::from("F"),
            name: Some("Home".to_string()),
        });

        let changes = FieldChanges::default().description(Some("B".to_string()));
        let updated = task.with_changes(&changes);

        assert_eq!(updated.title, "A");
        assert_eq!(updated.folder, task.folder);
        assert_eq!(updated.description.as_deref(), Some("B"));
    }

    #[test]
    fn test_folder_change_drops_stale_name() {
        let mut task = Task::new(TaskId::from("t1"), "A", at(1));
        task.folder = Some(FolderRef {
            id: FolderId::from("F"),
            name: Some("Home".to_string()),
        });

        let changes = FieldChanges::default().folder_id(Some(FolderId::from("G")));
        let moved = task.with_changes(&changes);
        assert_eq!(moved.folder, Some(FolderRef::new(FolderId::from("G"))));

        let cleared = task.with_changes(&FieldChanges::default().folder_id(None));
        assert_eq!(cleared.folder, None);
    }

    #[test]
    fn test_tombstone_keeps_record() {
        let task = Task::new(TaskId::from("t1"), "A", at(1));
        let tombstone = task.tombstoned(at(2));
        assert!(tombstone.is_deleted());
        assert_eq!(tombstone.title, "A");
        assert_eq!(tombstone.sync_marker, SyncMarker::PendingUpdate);
    }

    #[test]
    fn test_virtual_status_priority() {
        let mut task = Task::new(TaskId::from("t1"), "A", at(1));
        assert_eq!(task.virtual_status(at(2)), Some(VirtualStatus::Newest));

        task.due_date = Some(at(10));
        assert_eq!(task.virtual_status(at(2)), Some(VirtualStatus::IncomingDue));
        assert_eq!(task.virtual_status(at(11)), Some(VirtualStatus::Overdue));

        task.status = TaskStatus::Completed;
        assert_eq!(task.virtual_status(at(11)), Some(VirtualStatus::Newest));
    }

    #[test]
    fn test_placeholder_title_uses_leading_characters() {
        let id = TaskId::from("0190f2a4-aaaa-7bbb-8ccc-000000000000");
        assert_eq!(Task::placeholder_title(&id), "Task 0190f2a4");
    }
}
