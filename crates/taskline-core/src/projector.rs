//! Projection of base tasks plus queued commands into the visible task list.
//!
//! The projection is a pure fold: commands are applied strictly in log order
//! onto an index of the base tasks, and tombstones are filtered out at the
//! end. Nothing here reads the clock, so replaying the same log against the
//! same base always yields the same list.

use std::collections::{HashMap, HashSet};

use crate::models::{Command, CommandId, SyncMarker, Task, TaskId};

/// Working index used while folding commands
#[derive(Debug, Default)]
struct ProjectionIndex {
    order: Vec<TaskId>,
    tasks: HashMap<TaskId, Task>,
}

impl ProjectionIndex {
    fn from_tasks(base: &[Task]) -> Self {
        let mut index = Self::default();
        for task in base {
            index.insert(task.clone());
        }
        index
    }

    fn insert(&mut self, task: Task) {
        if !self.tasks.contains_key(&task.id) {
            self.order.push(task.id.clone());
        }
        self.tasks.insert(task.id.clone(), task);
    }

    fn apply(&mut self, command: &Command) {
        match command {
            Command::Create(create) => self.insert(create.to_task()),
            Command::Update(update) => {
                let Some(current) = self.tasks.get(&update.entity_id) else {
                    tracing::debug!(
                        entity_id = %update.entity_id,
                        command_id = %update.command_id,
                        "Update for unknown task ignored"
                    );
                    return;
                };
                if current.is_deleted() {
                    return;
                }
                let mut next = current.with_changes(&update.changes);
                next.updated_at = update.timestamp;
                next.sync_marker = SyncMarker::PendingUpdate;
                self.tasks.insert(update.entity_id.clone(), next);
            }
            Command::Delete(delete) => {
                if let Some(current) = self.tasks.get(&delete.entity_id) {
                    let tombstone = current.tombstoned(delete.timestamp);
                    self.tasks.insert(delete.entity_id.clone(), tombstone);
                }
            }
            Command::Unrecognized(unrecognized) => {
                tracing::debug!(
                    command_type = %unrecognized.command_type,
                    command_id = %unrecognized.command_id,
                    "Skipping unrecognized command in projection"
                );
            }
        }
    }

    fn into_visible(mut self) -> Vec<Task> {
        self.order
            .iter()
            .filter_map(|id| self.tasks.remove(id))
            .filter(|task| !task.is_deleted())
            .collect()
    }
}

/// Current visible task list: `base` with every command applied in order.
pub fn project(base: &[Task], commands: &[Command]) -> Vec<Task> {
    let mut index = ProjectionIndex::from_tasks(base);
    for command in commands {
        index.apply(command);
    }
    index.into_visible()
}

/// Update/Delete commands whose task is neither in `base` nor created
/// earlier in the log. These can only come from a damaged log.
pub fn find_orphans(base: &[Task], commands: &[Command]) -> Vec<CommandId> {
    let mut known: HashSet<&TaskId> = base.iter().map(|task| &task.id).collect();
    let mut orphans = Vec::new();

    for command in commands {
        match command {
            Command::Create(create) => {
                known.insert(&create.entity_id);
            }
            Command::Update(_) | Command::Delete(_) => {
                if let Some(entity_id) = command.entity_id() {
                    if !known.contains(entity_id) {
                        orphans.push(command.command_id().clone());
                    }
                }
            }
            Command::Unrecognized(_) => {}
        }
    }

    orphans
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CreateTask, DeleteTask, FieldChanges, FolderId, FolderRef, TaskStatus, UpdateTask, UserId,
    };
    use chrono::{DateTime, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, minute, 0).unwrap()
    }

    fn create(command_id: &str, entity_id: &str, title: &str, minute: u32) -> Command {
        Command::Create(CreateTask {
            command_id: CommandId::from(command_id),
            entity_id: TaskId::from(entity_id),
            user_id: UserId::from("u1"),
            timestamp: at(minute),
            title: title.to_string(),
            description: None,
            status: TaskStatus::Pending,
            due_date: None,
            folder_id: None,
        })
    }

    fn update(command_id: &str, entity_id: &str, changes: FieldChanges, minute: u32) -> Command {
        Command::Update(UpdateTask {
            command_id: CommandId::from(command_id),
            entity_id: TaskId::from(entity_id),
            user_id: UserId::from("u1"),
            timestamp: at(minute),
            changes,
        })
    }

    fn delete(command_id: &str, entity_id: &str, minute: u32) -> Command {
        Command::Delete(DeleteTask {
            command_id: CommandId::from(command_id),
            entity_id: TaskId::from(entity_id),
            user_id: UserId::from("u1"),
            timestamp: at(minute),
            reason: None,
        })
    }

    #[test]
    fn test_create_then_update_markers() {
        let log = vec![create("c1", "T1", "Buy milk", 0)];
        let visible = project(&[], &log);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].title, "Buy milk");
        assert_eq!(visible[0].sync_marker, SyncMarker::New);

        let log = vec![
            create("c1", "T1", "Buy milk", 0),
            update(
                "c2",
                "T1",
                FieldChanges::default().status(TaskStatus::Completed),
                1,
            ),
        ];
        let visible = project(&[], &log);
        assert_eq!(visible[0].status, TaskStatus::Completed);
        assert_eq!(visible[0].sync_marker, SyncMarker::PendingUpdate);
        assert_eq!(visible[0].updated_at, at(1));
        assert_eq!(visible[0].created_at, at(0));
    }

    #[test]
    fn test_delete_hides_task_before_sync() {
        let log = vec![create("c1", "T1", "Buy milk", 0), delete("c2", "T1", 1)];
        assert!(project(&[], &log).is_empty());
    }

    #[test]
    fn test_update_after_delete_does_not_revive() {
        let log = vec![
            create("c1", "T1", "Buy milk", 0),
            delete("c2", "T1", 1),
            update("c3", "T1", FieldChanges::default().title("again"), 2),
        ];
        assert!(project(&[], &log).is_empty());
    }

    #[test]
    fn test_update_for_unknown_task_is_noop() {
        let log = vec![update("c1", "ghost", FieldChanges::default().title("x"), 0)];
        assert!(project(&[], &log).is_empty());
    }

    #[test]
    fn test_partial_update_keeps_base_fields() {
        let mut base = Task::new(TaskId::from("T1"), "A", at(0));
        base.folder = Some(FolderRef::new(FolderId::from("F")));
        base.sync_marker = SyncMarker::Synced;

        let log = vec![update(
            "c1",
            "T1",
            FieldChanges::default().description(Some("B".to_string())),
            5,
        )];
        let visible = project(&[base.clone()], &log);

        assert_eq!(visible[0].title, "A");
        assert_eq!(visible[0].folder, base.folder);
        assert_eq!(visible[0].description.as_deref(), Some("B"));
    }

    #[test]
    fn test_replay_is_idempotent() {
        let base = vec![Task::new(TaskId::from("B1"), "Base", at(0))];
        let log = vec![
            create("c1", "T1", "one", 1),
            create("c2", "T2", "two", 2),
            update(
                "c3",
                "B1",
                FieldChanges::default().status(TaskStatus::InProgress),
                3,
            ),
            delete("c4", "T2", 4),
        ];

        let first = project(&base, &log);
        let second = project(&base, &log);
        assert_eq!(first, second);
        assert_eq!(
            first.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(),
            vec!["B1", "T1"]
        );
    }

    #[test]
    fn test_base_tombstones_are_hidden() {
        let base = vec![Task::new(TaskId::from("B1"), "Base", at(0)).tombstoned(at(1))];
        assert!(project(&base, &[]).is_empty());
    }

    #[test]
    fn test_find_orphans() {
        let base = vec![Task::new(TaskId::from("B1"), "Base", at(0))];
        let log = vec![
            update("c1", "B1", FieldChanges::default().title("ok"), 1),
            update("c2", "T1", FieldChanges::default().title("early"), 2),
            create("c3", "T1", "late", 3),
            delete("c4", "T1", 4),
        ];

        assert_eq!(find_orphans(&base, &log), vec![CommandId::from("c2")]);
    }
}
