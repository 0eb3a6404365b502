//! Command model
//!
//! Commands are the user's intents, recorded before any network attempt.
//! They are persisted with an explicit `type` discriminator so the log file
//! round-trips without losing the variant.

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use super::ids::{CommandId, FolderId, TaskId, UserId};
use super::task::{FolderRef, SyncMarker, Task, TaskStatus};

/// Sparse set of attribute changes.
///
/// An outer `None` means "leave untouched". For nullable attributes,
/// `Some(None)` clears the value and is persisted as an explicit `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "double_option"
    )]
    pub description: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "double_option"
    )]
    pub due_date: Option<Option<DateTime<Utc>>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "double_option"
    )]
    pub folder_id: Option<Option<FolderId>>,
}

impl FieldChanges {
    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn description(mut self, description: Option<String>) -> Self {
        self.description = Some(description);
        self
    }

    #[must_use]
    pub const fn status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub const fn due_date(mut self, due_date: Option<DateTime<Utc>>) -> Self {
        self.due_date = Some(due_date);
        self
    }

    #[must_use]
    pub fn folder_id(mut self, folder_id: Option<FolderId>) -> Self {
        self.folder_id = Some(folder_id);
        self
    }

    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.due_date.is_none()
            && self.folder_id.is_none()
    }
}

/// Field values for a task that does not exist yet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDraft {
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub due_date: Option<DateTime<Utc>>,
    pub folder_id: Option<FolderId>,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTask {
    pub command_id: CommandId,
    pub entity_id: TaskId,
    pub user_id: UserId,
    pub timestamp: DateTime<Utc>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub folder_id: Option<FolderId>,
}

impl CreateTask {
    /// The task exactly as this command describes it
    pub fn to_task(&self) -> Task {
        let mut task = Task::new(self.entity_id.clone(), self.title.clone(), self.timestamp);
        task.description.clone_from(&self.description);
        task.status = self.status;
        task.due_date = self.due_date;
        task.folder = self.folder_id.clone().map(FolderRef::new);
        task.sync_marker = SyncMarker::New;
        task
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateTask {
    pub command_id: CommandId,
    pub entity_id: TaskId,
    pub user_id: UserId,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub changes: FieldChanges,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteTask {
    pub command_id: CommandId,
    pub entity_id: TaskId,
    pub user_id: UserId,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// A persisted command whose type this build does not know.
///
/// The raw payload is kept so re-persisting the log does not lose it.
#[derive(Debug, Clone, PartialEq)]
pub struct UnrecognizedCommand {
    pub command_type: String,
    pub command_id: CommandId,
    pub user_id: UserId,
    pub entity_id: Option<TaskId>,
    pub payload: serde_json::Value,
}

/// A user intent
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Create(CreateTask),
    Update(UpdateTask),
    Delete(DeleteTask),
    Unrecognized(UnrecognizedCommand),
}

/// Command discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Create,
    Update,
    Delete,
    Unrecognized,
}

impl CommandKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Unrecognized => "unrecognized",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Command {
    /// Intent to create a task with a freshly generated id
    pub fn create(user_id: UserId, draft: TaskDraft, at: DateTime<Utc>) -> Self {
        Self::Create(CreateTask {
            command_id: CommandId::generate(),
            entity_id: TaskId::generate(),
            user_id,
            timestamp: at,
            title: draft.title,
            description: draft.description,
            status: draft.status,
            due_date: draft.due_date,
            folder_id: draft.folder_id,
        })
    }

    pub fn update(
        user_id: UserId,
        entity_id: TaskId,
        changes: FieldChanges,
        at: DateTime<Utc>,
    ) -> Self {
        Self::Update(UpdateTask {
            command_id: CommandId::generate(),
            entity_id,
            user_id,
            timestamp: at,
            changes,
        })
    }

    pub fn delete(
        user_id: UserId,
        entity_id: TaskId,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self::Delete(DeleteTask {
            command_id: CommandId::generate(),
            entity_id,
            user_id,
            timestamp: at,
            reason,
        })
    }

    pub const fn kind(&self) -> CommandKind {
        match self {
            Self::Create(_) => CommandKind::Create,
            Self::Update(_) => CommandKind::Update,
            Self::Delete(_) => CommandKind::Delete,
            Self::Unrecognized(_) => CommandKind::Unrecognized,
        }
    }

    pub const fn command_id(&self) -> &CommandId {
        match self {
            Self::Create(c) => &c.command_id,
            Self::Update(c) => &c.command_id,
            Self::Delete(c) => &c.command_id,
            Self::Unrecognized(c) => &c.command_id,
        }
    }

    pub const fn user_id(&self) -> &UserId {
        match self {
            Self::Create(c) => &c.user_id,
            Self::Update(c) => &c.user_id,
            Self::Delete(c) => &c.user_id,
            Self::Unrecognized(c) => &c.user_id,
        }
    }

    pub const fn entity_id(&self) -> Option<&TaskId> {
        match self {
            Self::Create(c) => Some(&c.entity_id),
            Self::Update(c) => Some(&c.entity_id),
            Self::Delete(c) => Some(&c.entity_id),
            Self::Unrecognized(c) => c.entity_id.as_ref(),
        }
    }

    /// Copy of this command pointing at another entity. Used by id remaps;
    /// the original command is never mutated in place.
    #[must_use]
    pub fn with_entity(&self, entity_id: TaskId) -> Self {
        match self {
            Self::Create(c) => Self::Create(CreateTask {
                entity_id,
                ..c.clone()
            }),
            Self::Update(c) => Self::Update(UpdateTask {
                entity_id,
                ..c.clone()
            }),
            Self::Delete(c) => Self::Delete(DeleteTask {
                entity_id,
                ..c.clone()
            }),
            Self::Unrecognized(c) => {
                let mut payload = c.payload.clone();
                if let Some(object) = payload.as_object_mut() {
                    object.insert(
                        "entity_id".to_string(),
                        serde_json::Value::String(entity_id.to_string()),
                    );
                }
                Self::Unrecognized(UnrecognizedCommand {
                    entity_id: Some(entity_id),
                    payload,
                    ..c.clone()
                })
            }
        }
    }
}

#[derive(Serialize)]
struct Tagged<'a, T> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(flatten)]
    body: &'a T,
}

impl Serialize for Command {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Create(body) => Tagged {
                kind: "create",
                body,
            }
            .serialize(serializer),
            Self::Update(body) => Tagged {
                kind: "update",
                body,
            }
            .serialize(serializer),
            Self::Delete(body) => Tagged {
                kind: "delete",
                body,
            }
            .serialize(serializer),
            Self::Unrecognized(command) => command.payload.serialize(serializer),
        }
    }
}

#[derive(Deserialize)]
struct UnrecognizedHeader {
    command_id: CommandId,
    user_id: UserId,
    #[serde(default)]
    entity_id: Option<TaskId>,
}

impl<'de> Deserialize<'de> for Command {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        let kind = value
            .get("type")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| D::Error::missing_field("type"))?
            .to_string();

        let command = match kind.as_str() {
            "create" => serde_json::from_value(value).map(Self::Create),
            "update" => serde_json::from_value(value).map(Self::Update),
            "delete" => serde_json::from_value(value).map(Self::Delete),
            _ => serde_json::from_value::<UnrecognizedHeader>(value.clone()).map(|header| {
                Self::Unrecognized(UnrecognizedCommand {
                    command_type: kind.clone(),
                    command_id: header.command_id,
                    user_id: header.user_id,
                    entity_id: header.entity_id,
                    payload: value,
                })
            }),
        };
        command.map_err(D::Error::custom)
    }
}

/// Serde helper distinguishing an absent key from an explicit `null`.
mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[allow(clippy::ref_option, clippy::option_option)]
    pub fn serialize<S, T>(value: &Option<Option<T>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    #[allow(clippy::option_option)]
    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}
