//! Merge of a sync response into the local base tasks.
//!
//! Reconciliation works on a copy of the base index and returns the result;
//! nothing is committed unless the whole response was applied. Server values
//! win for every row the server sends. Rows for tasks deleted in the same
//! round are dropped so a stale server view cannot bring them back.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::protocol::{CommandAck, ConflictEntry, SyncResponse};
use crate::assembler::TaskAssembler;
use crate::error::{Error, Result};
use crate::models::{Command, CommandId, SyncMarker, TaskId};
use crate::services::FolderCache;
use crate::task_index::TaskIndex;

/// Server-assigned replacement for a client id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdRemap {
    pub from: TaskId,
    pub to: TaskId,
}

/// Acknowledgement that reported failure; the command stays queued
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedCommand {
    pub command_id: CommandId,
    pub error_message: Option<String>,
}

/// Client side of a conflict the server resolved in its own favour
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictReport {
    pub entity_id: Option<TaskId>,
    pub conflict_type: Option<String>,
    pub client_data: Option<Value>,
}

/// Outcome of one reconciliation, not yet committed
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub tasks: TaskIndex,
    /// Commands to trim from the log
    pub acknowledged: Vec<CommandId>,
    pub failed: Vec<FailedCommand>,
    pub remaps: Vec<IdRemap>,
    pub upserted: usize,
    pub removed: usize,
    /// Server rows dropped by the anti-resurrection guard
    pub discarded: usize,
    pub conflicts: Vec<ConflictReport>,
    /// New last-sync cursor
    pub cursor: DateTime<Utc>,
}

pub struct Reconciler<'a> {
    assembler: TaskAssembler,
    folders: &'a FolderCache,
}

impl<'a> Reconciler<'a> {
    pub const fn new(assembler: TaskAssembler, folders: &'a FolderCache) -> Self {
        Self { assembler, folders }
    }

    /// Apply `response` to a copy of `base`.
    ///
    /// `shipped` is the command snapshot the batch was built from.
    pub fn reconcile(
        &self,
        base: &TaskIndex,
        shipped: &[Command],
        response: &SyncResponse,
    ) -> Result<Reconciliation> {
        let cursor = self.server_timestamp(response)?;

        let mut acks: HashMap<&CommandId, &CommandAck> = HashMap::new();
        for ack in &response.processed_commands {
            acks.entry(&ack.client_id).or_insert(ack);
        }

        let mut result = Reconciliation {
            tasks: base.clone(),
            acknowledged: Vec::new(),
            failed: Vec::new(),
            remaps: Vec::new(),
            upserted: 0,
            removed: 0,
            discarded: 0,
            conflicts: Vec::new(),
            cursor,
        };

        let mut renamed: HashMap<TaskId, TaskId> = HashMap::new();
        let mut matched: HashSet<&CommandId> = HashSet::new();
        // Entities whose create is still queued after this round
        let mut unconfirmed: HashSet<TaskId> = HashSet::new();

        for command in shipped {
            if matches!(command, Command::Unrecognized(_)) {
                continue;
            }
            let ack = acks.get(command.command_id()).copied();
            if ack.is_some() {
                matched.insert(command.command_id());
            }
            if let Command::Create(create) = command {
                if !ack.is_some_and(|ack| ack.success) {
                    unconfirmed.insert(create.entity_id.clone());
                }
            }
            let Some(ack) = ack else {
                continue;
            };

            if !ack.success {
                tracing::warn!(
                    command_id = %ack.client_id,
                    error = ack.error_message.as_deref().unwrap_or("unspecified"),
                    "Server rejected command; keeping it queued"
                );
                result.failed.push(FailedCommand {
                    command_id: ack.client_id.clone(),
                    error_message: ack.error_message.clone(),
                });
                continue;
            }

            if Self::fold_acknowledged(&mut result, &mut renamed, &unconfirmed, command, ack) {
                result.acknowledged.push(ack.client_id.clone());
            }
        }

        let just_deleted = Self::just_deleted(shipped, &acks, &renamed);

        for ack in &response.processed_commands {
            if !matched.contains(&ack.client_id) {
                tracing::warn!(
                    command_id = %ack.client_id,
                    "Acknowledgement does not match any shipped command"
                );
            }
        }

        for row in &response.server_changes {
            let Some(payload) = row.as_object() else {
                tracing::warn!("Skipping server change that is not an object");
                continue;
            };
            self.apply_server_row(&mut result, &renamed, &just_deleted, payload);
        }

        for conflict in &response.conflicts {
            self.apply_conflict(&mut result, &renamed, &just_deleted, conflict);
        }

        tracing::debug!(
            acknowledged = result.acknowledged.len(),
            failed = result.failed.len(),
            upserted = result.upserted,
            removed = result.removed,
            discarded = result.discarded,
            conflicts = result.conflicts.len(),
            "Reconciled sync response"
        );

        Ok(result)
    }

    fn server_timestamp(&self, response: &SyncResponse) -> Result<DateTime<Utc>> {
        let raw = response
            .server_timestamp
            .as_ref()
            .filter(|value| !value.is_null())
            .ok_or_else(|| Error::Protocol("sync response is missing server_timestamp".into()))?;
        self.assembler
            .parse_date(raw)
            .ok_or_else(|| Error::Protocol(format!("unparseable server_timestamp: {raw}")))
    }

    /// Entities whose delete the server confirmed in this round, under
    /// both the id the delete was queued with and any id it was remapped to
    fn just_deleted(
        shipped: &[Command],
        acks: &HashMap<&CommandId, &CommandAck>,
        renamed: &HashMap<TaskId, TaskId>,
    ) -> HashSet<TaskId> {
        let mut deleted = HashSet::new();
        for command in shipped {
            let Command::Delete(delete) = command else {
                continue;
            };
            if let Some(ack) = acks.get(&delete.command_id).filter(|ack| ack.success) {
                deleted.insert(delete.entity_id.clone());
                deleted.insert(resolve(renamed, &delete.entity_id));
                if let Some(server_id) = &ack.server_id {
                    deleted.insert(server_id.clone());
                }
            }
        }
        deleted
    }

    /// Fold a successful acknowledgement into the base. Returns false when
    /// the command must stay queued: an update whose task is missing because
    /// its create has not been confirmed yet.
    fn fold_acknowledged(
        result: &mut Reconciliation,
        renamed: &mut HashMap<TaskId, TaskId>,
        unconfirmed: &HashSet<TaskId>,
        command: &Command,
        ack: &CommandAck,
    ) -> bool {
        let cursor = result.cursor;
        match command {
            Command::Create(create) => {
                let mut task = create.to_task();
                task.sync_marker = SyncMarker::Synced;
                task.last_synced_at = Some(cursor);
                if let Some(server_id) = ack
                    .server_id
                    .as_ref()
                    .filter(|id| **id != create.entity_id)
                {
                    result.tasks.remove(&create.entity_id);
                    task.id = server_id.clone();
                    renamed.insert(create.entity_id.clone(), server_id.clone());
                    result.remaps.push(IdRemap {
                        from: create.entity_id.clone(),
                        to: server_id.clone(),
                    });
                }
                result.tasks.upsert(task);
            }
            Command::Update(update) => {
                let mut entity_id = resolve(renamed, &update.entity_id);
                if let Some(server_id) = ack.server_id.as_ref().filter(|id| **id != entity_id) {
                    if result.tasks.rename(&entity_id, server_id) {
                        renamed.insert(entity_id.clone(), server_id.clone());
                        result.remaps.push(IdRemap {
                            from: entity_id,
                            to: server_id.clone(),
                        });
                    }
                    entity_id = server_id.clone();
                }

                let Some(current) = result
                    .tasks
                    .get(&entity_id)
                    .filter(|task| !task.is_deleted())
                else {
                    if unconfirmed.contains(&update.entity_id) {
                        tracing::debug!(
                            entity_id = %entity_id,
                            command_id = %update.command_id,
                            "Keeping acknowledged update queued until its create is confirmed"
                        );
                        return false;
                    }
                    tracing::debug!(
                        entity_id = %entity_id,
                        command_id = %update.command_id,
                        "Acknowledged update for a task missing from the base"
                    );
                    return true;
                };
                let mut next = current.with_changes(&update.changes);
                next.updated_at = update.timestamp;
                next.sync_marker = SyncMarker::Synced;
                next.last_synced_at = Some(cursor);
                result.tasks.upsert(next);
            }
            Command::Delete(delete) => {
                let entity_id = resolve(renamed, &delete.entity_id);
                result.tasks.remove(&entity_id);
                if let Some(server_id) = &ack.server_id {
                    result.tasks.remove(server_id);
                }
            }
            Command::Unrecognized(_) => {}
        }
        true
    }

    fn apply_server_row(
        &self,
        result: &mut Reconciliation,
        renamed: &HashMap<TaskId, TaskId>,
        just_deleted: &HashSet<TaskId>,
        payload: &Map<String, Value>,
    ) {
        let Some(raw_id) = TaskAssembler::extract_id(payload) else {
            tracing::warn!("Skipping server change without a task id");
            return;
        };
        let id = resolve(renamed, &raw_id);

        if just_deleted.contains(&raw_id) || just_deleted.contains(&id) {
            tracing::warn!(task_id = %id, "Discarding server row for a task deleted this round");
            result.discarded += 1;
            return;
        }

        if self.assembler.marks_deleted(payload) {
            if result.tasks.remove(&id).is_some() {
                tracing::debug!(task_id = %id, "Server reports task deleted");
            }
            result.removed += 1;
            return;
        }

        let mut payload = payload.clone();
        if raw_id != id {
            payload.insert("id".to_string(), Value::String(id.to_string()));
        }
        let existing = result.tasks.get(&id);
        let Some(mut task) = self.assembler.assemble(&payload, existing, result.cursor) else {
            return;
        };

        if let Some(folder) = task.folder.as_mut() {
            if folder.name.is_none() {
                folder.name = self
                    .folders
                    .resolve_name(&folder.id)
                    .map(ToString::to_string);
            }
        }
        task.deleted_at = None;
        task.sync_marker = SyncMarker::Synced;
        task.last_synced_at = Some(result.cursor);
        result.tasks.upsert(task);
        result.upserted += 1;
    }

    fn apply_conflict(
        &self,
        result: &mut Reconciliation,
        renamed: &HashMap<TaskId, TaskId>,
        just_deleted: &HashSet<TaskId>,
        conflict: &ConflictEntry,
    ) {
        let conflict_id = conflict.entity_id.as_ref().map(TaskId::as_str);
        tracing::warn!(
            entity_id = conflict_id.unwrap_or("unknown"),
            conflict_type = conflict.conflict_type.as_deref().unwrap_or("unspecified"),
            "Server resolved conflict in its favour; local change superseded"
        );

        match conflict.server_data.as_ref().and_then(Value::as_object) {
            Some(server_data) => {
                let mut payload = server_data.clone();
                if TaskAssembler::extract_id(&payload).is_none() {
                    if let Some(entity_id) = &conflict.entity_id {
                        payload.insert("id".to_string(), Value::String(entity_id.to_string()));
                    }
                }
                self.apply_server_row(result, renamed, just_deleted, &payload);
            }
            None => tracing::debug!("Conflict carries no server data to apply"),
        }

        result.conflicts.push(ConflictReport {
            entity_id: conflict.entity_id.clone(),
            conflict_type: conflict.conflict_type.clone(),
            client_data: conflict.client_data.clone(),
        });
    }
}

fn resolve(renamed: &HashMap<TaskId, TaskId>, id: &TaskId) -> TaskId {
    renamed.get(id).unwrap_or(id).clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CreateTask, DeleteTask, FieldChanges, Folder, FolderId, FolderRef, Task, TaskStatus,
        UpdateTask, UserId,
    };
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, minute, 0).unwrap()
    }

    fn create(command_id: &str, entity_id: &str, title: &str) -> Command {
        Command::Create(CreateTask {
            command_id: CommandId::from(command_id),
            entity_id: TaskId::from(entity_id),
            user_id: UserId::from("u1"),
            timestamp: at(0),
            title: title.to_string(),
            description: None,
            status: TaskStatus::Pending,
            due_date: None,
            folder_id: None,
        })
    }

    fn update(command_id: &str, entity_id: &str, changes: FieldChanges) -> Command {
        Command::Update(UpdateTask {
            command_id: CommandId::from(command_id),
            entity_id: TaskId::from(entity_id),
            user_id: UserId::from("u1"),
            timestamp: at(1),
            changes,
        })
    }

    fn delete(command_id: &str, entity_id: &str) -> Command {
        Command::Delete(DeleteTask {
            command_id: CommandId::from(command_id),
            entity_id: TaskId::from(entity_id),
            user_id: UserId::from("u1"),
            timestamp: at(2),
            reason: None,
        })
    }

    fn response(value: Value) -> SyncResponse {
        serde_json::from_value(value).unwrap()
    }

    fn synced(id: &str, title: &str) -> Task {
        let mut task = Task::new(TaskId::from(id), title, at(0));
        task.sync_marker = SyncMarker::Synced;
        task
    }

    #[test]
    fn test_create_ack_with_server_id_remaps() {
        let folders = FolderCache::default();
        let reconciler = Reconciler::new(TaskAssembler::default(), &folders);
        let shipped = vec![create("c1", "local-1", "Buy milk")];
        let response = response(json!({
            "success": true,
            "server_timestamp": "2026-03-01T13:00:00Z",
            "processed_commands": [
                {"client_id": "c1", "command_type": "create", "success": true, "server_id": "srv-9"}
            ]
        }));

        let result = reconciler
            .reconcile(&TaskIndex::new(), &shipped, &response)
            .unwrap();

        let task = result.tasks.get(&TaskId::from("srv-9")).unwrap();
        assert_eq!(task.title, "Buy milk");
        assert_eq!(task.sync_marker, SyncMarker::Synced);
        assert!(!result.tasks.contains(&TaskId::from("local-1")));
        assert_eq!(
            result.remaps,
            vec![IdRemap {
                from: TaskId::from("local-1"),
                to: TaskId::from("srv-9"),
            }]
        );
        assert_eq!(result.acknowledged, vec![CommandId::from("c1")]);
        assert_eq!(
            result.cursor,
            Utc.with_ymd_and_hms(2026, 3, 1, 13, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_deleted_task_is_not_resurrected() {
        let folders = FolderCache::default();
        let reconciler = Reconciler::new(TaskAssembler::default(), &folders);
        let base = TaskIndex::from_tasks(vec![synced("T2", "Old")]);
        let shipped = vec![delete("c5", "T2")];
        let response = response(json!({
            "success": true,
            "server_timestamp": "2026-03-01T13:00:00Z",
            "processed_commands": [{"client_id": "c5", "success": true}],
            "server_changes": [{"id": "T2", "title": "Old", "status": "pending"}]
        }));

        let result = reconciler.reconcile(&base, &shipped, &response).unwrap();

        assert!(result.tasks.is_empty());
        assert_eq!(result.discarded, 1);
        assert_eq!(result.acknowledged, vec![CommandId::from("c5")]);
    }

    #[test]
    fn test_partial_success_keeps_failed_commands() {
        let folders = FolderCache::default();
        let reconciler = Reconciler::new(TaskAssembler::default(), &folders);
        let shipped = vec![
            create("c1", "T1", "first"),
            create("c2", "T2", "second"),
            create("c3", "T3", "third"),
        ];
        let response = response(json!({
            "success": true,
            "server_timestamp": "2026-03-01T13:00:00Z",
            "processed_commands": [
                {"client_id": "c1", "success": true},
                {"client_id": "c2", "success": false, "error_message": "quota"},
                {"client_id": "c3", "success": true}
            ]
        }));

        let result = reconciler
            .reconcile(&TaskIndex::new(), &shipped, &response)
            .unwrap();

        assert_eq!(
            result.acknowledged,
            vec![CommandId::from("c1"), CommandId::from("c3")]
        );
        assert_eq!(
            result.failed,
            vec![FailedCommand {
                command_id: CommandId::from("c2"),
                error_message: Some("quota".to_string()),
            }]
        );
        assert!(!result.tasks.contains(&TaskId::from("T2")));
        assert_eq!(result.tasks.len(), 2);
    }

    #[test]
    fn test_server_row_merges_onto_existing_and_resolves_folder() {
        let folders = FolderCache::from_folders(vec![Folder::new("F9", "Errands")]);
        let reconciler = Reconciler::new(TaskAssembler::default(), &folders);
        let mut base_task = synced("T1", "Keep me");
        base_task.description = Some("details".to_string());
        let base = TaskIndex::from_tasks(vec![base_task]);
        let response = response(json!({
            "success": true,
            "server_timestamp": 1_772_370_000,
            "server_changes": [
                {"id": "T1", "status": "completed", "folderId": "F9"},
                {"title": "no id here"},
                "garbage"
            ]
        }));

        let result = reconciler.reconcile(&base, &[], &response).unwrap();

        let task = result.tasks.get(&TaskId::from("T1")).unwrap();
        assert_eq!(task.title, "Keep me");
        assert_eq!(task.description.as_deref(), Some("details"));
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(
            task.folder,
            Some(FolderRef {
                id: FolderId::from("F9"),
                name: Some("Errands".to_string()),
            })
        );
        assert_eq!(result.upserted, 1);
    }

    #[test]
    fn test_server_deletion_removes_task() {
        let folders = FolderCache::default();
        let reconciler = Reconciler::new(TaskAssembler::default(), &folders);
        let base = TaskIndex::from_tasks(vec![synced("T1", "Gone soon")]);
        let response = response(json!({
            "success": true,
            "server_timestamp": "2026-03-01T13:00:00Z",
            "server_changes": [{"id": "T1", "is_deleted": true}]
        }));

        let result = reconciler.reconcile(&base, &[], &response).unwrap();
        assert!(result.tasks.is_empty());
        assert_eq!(result.removed, 1);
    }

    #[test]
    fn test_conflict_applies_server_side_and_reports_client_side() {
        let folders = FolderCache::default();
        let reconciler = Reconciler::new(TaskAssembler::default(), &folders);
        let base = TaskIndex::from_tasks(vec![synced("T1", "Local title")]);
        let response = response(json!({
            "success": true,
            "server_timestamp": "2026-03-01T13:00:00Z",
            "conflicts": [{
                "entity_id": "T1",
                "conflict_type": "concurrent_update",
                "server_data": {"title": "Server title"},
                "client_data": {"title": "Local title"}
            }]
        }));

        let result = reconciler.reconcile(&base, &[], &response).unwrap();

        assert_eq!(
            result.tasks.get(&TaskId::from("T1")).unwrap().title,
            "Server title"
        );
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(
            result.conflicts[0].client_data,
            Some(json!({"title": "Local title"}))
        );
    }

    #[test]
    fn test_create_and_update_in_one_round_follow_remap() {
        let folders = FolderCache::default();
        let reconciler = Reconciler::new(TaskAssembler::default(), &folders);
        let shipped = vec![
            create("c1", "local", "Draft"),
            update("c2", "local", FieldChanges::default().title("Final")),
        ];
        let response = response(json!({
            "success": true,
            "server_timestamp": "2026-03-01T13:00:00Z",
            "processed_commands": [
                {"client_id": "c2", "success": true},
                {"client_id": "c1", "success": true, "server_id": "srv"}
            ]
        }));

        let result = reconciler
            .reconcile(&TaskIndex::new(), &shipped, &response)
            .unwrap();

        let task = result.tasks.get(&TaskId::from("srv")).unwrap();
        assert_eq!(task.title, "Final");
        assert_eq!(result.tasks.len(), 1);
    }

    #[test]
    fn test_delete_after_remapped_create_is_not_resurrected() {
        let folders = FolderCache::default();
        let reconciler = Reconciler::new(TaskAssembler::default(), &folders);
        let shipped = vec![create("c1", "local", "Short lived"), delete("c2", "local")];
        let response = response(json!({
            "success": true,
            "server_timestamp": "2026-03-01T13:00:00Z",
            "processed_commands": [
                {"client_id": "c1", "success": true, "server_id": "srv"},
                {"client_id": "c2", "success": true}
            ],
            "server_changes": [{"id": "srv", "title": "Short lived", "status": "pending"}]
        }));

        let result = reconciler
            .reconcile(&TaskIndex::new(), &shipped, &response)
            .unwrap();

        assert!(result.tasks.is_empty());
        assert_eq!(result.discarded, 1);
        assert_eq!(
            result.acknowledged,
            vec![CommandId::from("c1"), CommandId::from("c2")]
        );
    }

    #[test]
    fn test_update_stays_queued_while_its_create_fails() {
        let folders = FolderCache::default();
        let reconciler = Reconciler::new(TaskAssembler::default(), &folders);
        let shipped = vec![
            create("c1", "T1", "Draft"),
            update("c2", "T1", FieldChanges::default().title("Final")),
        ];
        let response = response(json!({
            "success": true,
            "server_timestamp": "2026-03-01T13:00:00Z",
            "processed_commands": [
                {"client_id": "c1", "success": false, "error_message": "busy"},
                {"client_id": "c2", "success": true}
            ]
        }));

        let result = reconciler
            .reconcile(&TaskIndex::new(), &shipped, &response)
            .unwrap();

        assert!(result.acknowledged.is_empty());
        assert_eq!(result.failed.len(), 1);
        assert!(result.tasks.is_empty());

        let remaining = shipped
            .iter()
            .filter(|command| !result.acknowledged.contains(command.command_id()))
            .cloned()
            .collect::<Vec<_>>();
        let visible = crate::projector::project(&result.tasks.to_vec(), &remaining);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].title, "Final");
    }

    #[test]
    fn test_update_for_unknown_task_is_still_trimmed() {
        let folders = FolderCache::default();
        let reconciler = Reconciler::new(TaskAssembler::default(), &folders);
        let shipped = vec![update("c7", "gone", FieldChanges::default().title("x"))];
        let response = response(json!({
            "success": true,
            "server_timestamp": "2026-03-01T13:00:00Z",
            "processed_commands": [{"client_id": "c7", "success": true}]
        }));

        let result = reconciler
            .reconcile(&TaskIndex::new(), &shipped, &response)
            .unwrap();
        assert_eq!(result.acknowledged, vec![CommandId::from("c7")]);
        assert!(result.tasks.is_empty());
    }

    #[test]
    fn test_unmatched_ack_is_ignored() {
        let folders = FolderCache::default();
        let reconciler = Reconciler::new(TaskAssembler::default(), &folders);
        let response = response(json!({
            "success": true,
            "server_timestamp": "2026-03-01T13:00:00Z",
            "processed_commands": [{"client_id": "nobody", "success": true}]
        }));

        let result = reconciler
            .reconcile(&TaskIndex::new(), &[create("c1", "T1", "x")], &response)
            .unwrap();
        assert!(result.acknowledged.is_empty());
        assert!(result.tasks.is_empty());
    }

    #[test]
    fn test_missing_or_bad_timestamp_is_protocol_error() {
        let folders = FolderCache::default();
        let reconciler = Reconciler::new(TaskAssembler::default(), &folders);

        for value in [
            json!({"success": true}),
            json!({"success": true, "server_timestamp": "not a date"}),
        ] {
            let error = reconciler
                .reconcile(&TaskIndex::new(), &[], &response(value))
                .unwrap_err();
            assert!(matches!(error, Error::Protocol(_)));
        }
    }
}
