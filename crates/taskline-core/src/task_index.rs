//! Keyed working set of base tasks

use std::collections::BTreeMap;

use crate::models::{Task, TaskId};

/// Base tasks keyed by id.
///
/// Listing order is creation time, then id, so reconciling the same inputs
/// always produces the same list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskIndex {
    tasks: BTreeMap<TaskId, Task>,
}

impl TaskIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tasks(tasks: impl IntoIterator<Item = Task>) -> Self {
        let mut index = Self::new();
        for task in tasks {
            index.upsert(task);
        }
        index
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.tasks.contains_key(id)
    }

    /// Insert or replace by id
    pub fn upsert(&mut self, task: Task) {
        self.tasks.insert(task.id.clone(), task);
    }

    pub fn remove(&mut self, id: &TaskId) -> Option<Task> {
        self.tasks.remove(id)
    }

    /// Move a task to a new id. Returns false when `from` is not indexed.
    pub fn rename(&mut self, from: &TaskId, to: &TaskId) -> bool {
        let Some(mut task) = self.tasks.remove(from) else {
            return false;
        };
        task.id = to.clone();
        self.tasks.insert(to.clone(), task);
        true
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Tasks ordered by creation time, then id
    pub fn to_vec(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tasks.values().cloned().collect();
        tasks.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        tasks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn task(id: &str, hour: u32) -> Task {
        Task::new(
            TaskId::from(id),
            id,
            Utc.with_ymd_and_hms(2026, 3, 1, hour, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_to_vec_orders_by_creation() {
        let index = TaskIndex::from_tasks(vec![task("a", 5), task("b", 1), task("c", 5)]);
        let ids: Vec<String> = index.to_vec().iter().map(|t| t.id.to_string()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_rename_moves_task() {
        let mut index = TaskIndex::from_tasks(vec![task("local", 1)]);
        assert!(index.rename(&TaskId::from("local"), &TaskId::from("srv")));
        assert!(!index.contains(&TaskId::from("local")));
        assert_eq!(index.get(&TaskId::from("srv")).unwrap().id.as_str(), "srv");
        assert!(!index.rename(&TaskId::from("missing"), &TaskId::from("x")));
    }
}
