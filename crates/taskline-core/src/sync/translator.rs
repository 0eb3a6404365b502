//! Outbound translation of queued commands into wire commands.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};

use super::protocol::{SyncBatch, WireCommand};
use crate::models::{Command, CommandId, FieldChanges, TaskId, UserId};

const ENTITY_TYPE_TASK: &str = "task";

fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn optional_timestamp(value: Option<DateTime<Utc>>) -> Value {
    value.map_or(Value::Null, |at| Value::String(format_timestamp(at)))
}

fn header(
    command_type: &str,
    entity_id: &TaskId,
    client_id: &CommandId,
    timestamp: DateTime<Utc>,
) -> WireCommand {
    WireCommand {
        command_type: command_type.to_string(),
        entity_type: ENTITY_TYPE_TASK.to_string(),
        entity_id: entity_id.clone(),
        client_id: client_id.clone(),
        timestamp: format_timestamp(timestamp),
        data: None,
        changed_fields: Map::new(),
    }
}

fn changed_fields(changes: &FieldChanges) -> Map<String, Value> {
    let mut fields = Map::new();
    if let Some(title) = &changes.title {
        fields.insert("title".to_string(), Value::String(title.clone()));
    }
    if let Some(description) = &changes.description {
        fields.insert("description".to_string(), json!(description));
    }
    if let Some(status) = changes.status {
        fields.insert("status".to_string(), json!(status.as_str()));
    }
    if let Some(due_date) = changes.due_date {
        fields.insert("due_date".to_string(), optional_timestamp(due_date));
    }
    if let Some(folder_id) = &changes.folder_id {
        fields.insert(
            "folder_id".to_string(),
            folder_id
                .as_ref()
                .map_or(Value::Null, |id| Value::String(id.to_string())),
        );
    }
    fields
}

/// Wire form of a command. Unrecognized commands have none.
pub fn translate(command: &Command) -> Option<WireCommand> {
    match command {
        Command::Create(create) => {
            let mut wire = header(
                "create",
                &create.entity_id,
                &create.command_id,
                create.timestamp,
            );
            wire.data = Some(json!({
                "title": create.title,
                "description": create.description,
                "status": create.status.as_str(),
                "due_date": optional_timestamp(create.due_date),
                "folder_id": create.folder_id,
            }));
            Some(wire)
        }
        Command::Update(update) => {
            let mut wire = header(
                "update",
                &update.entity_id,
                &update.command_id,
                update.timestamp,
            );
            wire.changed_fields = changed_fields(&update.changes);
            Some(wire)
        }
        Command::Delete(delete) => {
            let mut wire = header(
                "delete",
                &delete.entity_id,
                &delete.command_id,
                delete.timestamp,
            );
            wire.data = delete
                .reason
                .as_ref()
                .map(|reason| json!({ "reason": reason }));
            Some(wire)
        }
        Command::Unrecognized(unrecognized) => {
            tracing::warn!(
                command_type = %unrecognized.command_type,
                command_id = %unrecognized.command_id,
                "Not shipping command of unrecognized type"
            );
            None
        }
    }
}

/// Sync batch for the given commands, in log order
pub fn build_batch(
    user_id: &UserId,
    commands: &[Command],
    last_sync: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> SyncBatch {
    SyncBatch {
        user_id: user_id.clone(),
        client_timestamp: now,
        last_sync,
        commands: commands.iter().filter_map(translate).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CreateTask, FolderId, TaskDraft, TaskStatus, UnrecognizedCommand, UpdateTask,
    };
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_create_carries_data() {
        let command = Command::Create(CreateTask {
            command_id: CommandId::from("c1"),
            entity_id: TaskId::from("t1"),
            user_id: UserId::from("u1"),
            timestamp: at(),
            title: "Buy milk".to_string(),
            description: None,
            status: TaskStatus::InProgress,
            due_date: Some(at()),
            folder_id: Some(FolderId::from("f1")),
        });

        let wire = translate(&command).unwrap();
        assert_eq!(wire.command_type, "create");
        assert_eq!(wire.entity_type, "task");
        assert_eq!(wire.client_id.as_str(), "c1");
        assert_eq!(wire.timestamp, "2026-03-01T12:00:00.000Z");
        assert_eq!(
            wire.data,
            Some(json!({
                "title": "Buy milk",
                "description": null,
                "status": "in_progress",
                "due_date": "2026-03-01T12:00:00.000Z",
                "folder_id": "f1",
            }))
        );
        assert!(wire.changed_fields.is_empty());
    }

    #[test]
    fn test_update_puts_fields_at_root() {
        let command = Command::Update(UpdateTask {
            command_id: CommandId::from("c2"),
            entity_id: TaskId::from("t1"),
            user_id: UserId::from("u1"),
            timestamp: at(),
            changes: FieldChanges::default()
                .status(TaskStatus::Completed)
                .due_date(None),
        });

        let wire = serde_json::to_value(translate(&command).unwrap()).unwrap();
        assert_eq!(wire["status"], json!("completed"));
        assert_eq!(wire["due_date"], Value::Null);
        assert!(wire.get("title").is_none());
        assert!(wire.get("data").is_none());
    }

    #[test]
    fn test_delete_reason_is_optional() {
        let user = UserId::from("u1");
        let with_reason = Command::delete(
            user.clone(),
            TaskId::from("t1"),
            Some("dup".to_string()),
            at(),
        );
        let without = Command::delete(user, TaskId::from("t1"), None, at());

        assert_eq!(
            translate(&with_reason).unwrap().data,
            Some(json!({"reason": "dup"}))
        );
        assert_eq!(translate(&without).unwrap().data, None);
    }

    #[test]
    fn test_batch_skips_unrecognized() {
        let user = UserId::from("u1");
        let commands = vec![
            Command::create(user.clone(), TaskDraft::new("A"), at()),
            Command::Unrecognized(UnrecognizedCommand {
                command_type: "archive".to_string(),
                command_id: CommandId::from("cx"),
                user_id: user.clone(),
                entity_id: None,
                payload: json!({"type": "archive"}),
            }),
        ];

        let batch = build_batch(&user, &commands, None, at());
        assert_eq!(batch.commands.len(), 1);
        assert_eq!(batch.client_timestamp, at());
        assert_eq!(batch.last_sync, None);
    }
}
