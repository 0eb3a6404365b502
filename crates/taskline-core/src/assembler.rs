//! Builds tasks from loosely shaped server payloads.
//!
//! Server rows are partially populated and may use snake_case or camelCase
//! keys. For every attribute the accepted keys are tried in a fixed order;
//! only attributes present in the payload are applied, so merging onto an
//! existing task leaves everything else untouched. Values that cannot be
//! interpreted resolve to "unset" instead of failing the merge.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};
use serde_json::{Map, Value};

use crate::models::{FolderId, FolderRef, SyncMarker, Task, TaskId, TaskStatus};

const ID_KEYS: &[&str] = &["id", "entity_id", "entityId", "task_id", "taskId"];
const TITLE_KEYS: &[&str] = &["title", "name"];
const DESCRIPTION_KEYS: &[&str] = &["description", "notes"];
const STATUS_KEYS: &[&str] = &["status", "state"];
const DUE_DATE_KEYS: &[&str] = &["due_date", "dueDate", "due"];
const FOLDER_ID_KEYS: &[&str] = &["folder_id", "folderId"];
const FOLDER_NAME_KEYS: &[&str] = &["folder_name", "folderName"];
const CREATED_AT_KEYS: &[&str] = &["created_at", "createdAt"];
const UPDATED_AT_KEYS: &[&str] = &["updated_at", "updatedAt"];
const DELETED_AT_KEYS: &[&str] = &["deleted_at", "deletedAt"];
const DELETED_FLAG_KEYS: &[&str] = &["is_deleted", "isDeleted", "deleted"];

const NAIVE_DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Epoch values above this magnitude are taken as milliseconds
const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Payload-to-task merge, parameterised by the user's reference offset
#[derive(Debug, Clone, Copy)]
pub struct TaskAssembler {
    reference_offset: FixedOffset,
}

impl Default for TaskAssembler {
    fn default() -> Self {
        Self::new(Utc.fix())
    }
}

impl TaskAssembler {
    pub const fn new(reference_offset: FixedOffset) -> Self {
        Self { reference_offset }
    }

    pub const fn reference_offset(&self) -> FixedOffset {
        self.reference_offset
    }

    /// Task identity carried by a payload
    pub fn extract_id(payload: &Map<String, Value>) -> Option<TaskId> {
        first_present(payload, ID_KEYS).and_then(|value| match value {
            Value::String(id) if !id.trim().is_empty() => Some(TaskId::from(id.trim())),
            Value::Number(number) => Some(TaskId::from(number.to_string())),
            _ => None,
        })
    }

    /// Whether the payload reports the task as deleted on the server
    pub fn marks_deleted(&self, payload: &Map<String, Value>) -> bool {
        if let Some(flag) = first_present(payload, DELETED_FLAG_KEYS) {
            match flag {
                Value::Bool(true) => return true,
                Value::Number(number) if number.as_i64().is_some_and(|n| n != 0) => return true,
                _ => {}
            }
        }
        first_present(payload, DELETED_AT_KEYS)
            .and_then(|value| self.parse_date(value))
            .is_some()
    }

    /// Build a task from `payload`, starting from `existing` when given.
    ///
    /// Returns `None` only when no id can be found in the payload or the
    /// existing task. Fresh tasks without timestamps get `received_at`.
    pub fn assemble(
        &self,
        payload: &Map<String, Value>,
        existing: Option<&Task>,
        received_at: DateTime<Utc>,
    ) -> Option<Task> {
        let id = Self::extract_id(payload).or_else(|| existing.map(|task| task.id.clone()))?;

        let mut task = existing.cloned().unwrap_or_else(|| {
            let mut fresh = Task::new(id.clone(), String::new(), received_at);
            fresh.sync_marker = SyncMarker::Synced;
            fresh
        });
        task.id = id;

        if let Some(value) = first_present(payload, TITLE_KEYS) {
            match value.as_str().map(str::trim) {
                Some(title) if !title.is_empty() => title.clone_into(&mut task.title),
                _ => tracing::debug!(task_id = %task.id, "Ignoring unusable title in payload"),
            }
        }

        if let Some(value) = first_present(payload, DESCRIPTION_KEYS) {
            task.description = value
                .as_str()
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .map(ToString::to_string);
        }

        if let Some(value) = first_present(payload, STATUS_KEYS) {
            match value.as_str().map(str::parse::<TaskStatus>) {
                Some(Ok(status)) => task.status = status,
                _ => tracing::debug!(task_id = %task.id, ?value, "Ignoring unknown task status"),
            }
        }

        if let Some(value) = first_present(payload, DUE_DATE_KEYS) {
            task.due_date = self.parse_date(value);
        }

        if let Some(value) = first_present(payload, FOLDER_ID_KEYS) {
            task.folder = folder_id_from(value).map(|folder_id| match &task.folder {
                Some(current) if current.id == folder_id => current.clone(),
                _ => FolderRef::new(folder_id),
            });
        }

        if let Some(name) = first_present(payload, FOLDER_NAME_KEYS)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
        {
            if let Some(folder) = task.folder.as_mut() {
                folder.name = Some(name.to_string());
            }
        }

        if let Some(created_at) =
            first_present(payload, CREATED_AT_KEYS).and_then(|value| self.parse_date(value))
        {
            task.created_at = created_at;
        }

        if let Some(updated_at) =
            first_present(payload, UPDATED_AT_KEYS).and_then(|value| self.parse_date(value))
        {
            task.updated_at = updated_at;
        } else if existing.is_none() {
            task.updated_at = task.created_at;
        }

        if let Some(value) = first_present(payload, DELETED_AT_KEYS) {
            task.deleted_at = self.parse_date(value);
        }

        if task.title.trim().is_empty() {
            task.title = Task::placeholder_title(&task.id);
        }

        Some(task)
    }

    /// Parse a date through the fallback chain: offset-aware timestamp,
    /// naive timestamp in the reference offset, then epoch.
    pub fn parse_date(&self, value: &Value) -> Option<DateTime<Utc>> {
        match value {
            Value::String(raw) => self.parse_date_str(raw),
            Value::Number(number) => number
                .as_i64()
                .or_else(|| {
                    #[allow(clippy::cast_possible_truncation)]
                    number.as_f64().map(|float| float as i64)
                })
                .and_then(from_epoch),
            _ => None,
        }
    }

    pub fn parse_date_str(&self, raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        if let Ok(aware) = DateTime::parse_from_rfc3339(raw) {
            return Some(aware.with_timezone(&Utc));
        }
        if let Ok(aware) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z") {
            return Some(aware.with_timezone(&Utc));
        }

        for format in NAIVE_DATE_TIME_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
                return self.localize(naive);
            }
        }
        if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            return date
                .and_hms_opt(0, 0, 0)
                .and_then(|naive| self.localize(naive));
        }

        raw.parse::<i64>().ok().and_then(from_epoch)
    }

    fn localize(&self, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
        self.reference_offset
            .from_local_datetime(&naive)
            .single()
            .map(|local| local.with_timezone(&Utc))
    }
}

fn first_present<'a>(payload: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| payload.get(*key))
}

fn folder_id_from(value: &Value) -> Option<FolderId> {
    match value {
        Value::String(id) if !id.trim().is_empty() => Some(FolderId::from(id.trim())),
        Value::Number(number) => Some(FolderId::from(number.to_string())),
        _ => None,
    }
}

fn from_epoch(value: i64) -> Option<DateTime<Utc>> {
    if value.abs() > EPOCH_MILLIS_THRESHOLD {
        DateTime::from_timestamp_millis(value)
    } else {
        DateTime::from_timestamp(value, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn payload(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("payload must be an object"),
        }
    }

    fn received() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()
    }

    fn plus_eight() -> TaskAssembler {
        TaskAssembler::new(FixedOffset::east_opt(8 * 3600).unwrap())
    }

    #[test]
    fn test_fresh_task_from_snake_case_row() {
        let row = payload(json!({
            "id": "T1",
            "title": "Buy milk",
            "status": "in_progress",
            "due_date": "2026-03-05T10:00:00Z",
            "folder_id": "F1",
            "folder_name": "Errands",
            "created_at": "2026-02-28T08:00:00Z"
        }));

        let task = TaskAssembler::default()
            .assemble(&row, None, received())
            .unwrap();

        assert_eq!(task.id.as_str(), "T1");
        assert_eq!(task.title, "Buy milk");
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(
            task.due_date,
            Some(Utc.with_ymd_and_hms(2026, 3, 5, 10, 0, 0).unwrap())
        );
        assert_eq!(
            task.folder.as_ref().unwrap().name.as_deref(),
            Some("Errands")
        );
        assert_eq!(task.updated_at, task.created_at);
        assert_eq!(task.sync_marker, SyncMarker::Synced);
    }

    #[test]
    fn test_snake_case_key_wins_over_camel_case() {
        let row = payload(json!({
            "id": "T1",
            "dueDate": "2026-04-01T00:00:00Z",
            "due_date": "2026-03-01T00:00:00Z"
        }));
        let task = TaskAssembler::default()
            .assemble(&row, None, received())
            .unwrap();
        assert_eq!(
            task.due_date,
            Some(Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_camel_case_row_is_accepted() {
        let row = payload(json!({
            "entityId": "T2",
            "title": "Call mom",
            "dueDate": 1_772_323_200,
            "folderId": 7
        }));
        let task = TaskAssembler::default()
            .assemble(&row, None, received())
            .unwrap();
        assert_eq!(task.id.as_str(), "T2");
        assert_eq!(task.due_date, DateTime::from_timestamp(1_772_323_200, 0));
        assert_eq!(task.folder_id().map(FolderId::as_str), Some("7"));
    }

    #[test]
    fn test_merge_leaves_absent_fields_untouched() {
        let mut existing = Task::new(TaskId::from("T1"), "A", received());
        existing.description = Some("keep me".to_string());
        existing.folder = Some(FolderRef {
            id: FolderId::from("F"),
            name: Some("Home".to_string()),
        });

        let row = payload(json!({ "id": "T1", "status": "completed" }));
        let task = TaskAssembler::default()
            .assemble(&row, Some(&existing), received())
            .unwrap();

        assert_eq!(task.title, "A");
        assert_eq!(task.description.as_deref(), Some("keep me"));
        assert_eq!(task.folder, existing.folder);
        assert_eq!(task.status, TaskStatus::Completed);
    }

    #[test]
    fn test_missing_title_gets_placeholder() {
        let row = payload(json!({ "id": "0190f2a4-1111-7222-8333-444455556666" }));
        let task = TaskAssembler::default()
            .assemble(&row, None, received())
            .unwrap();
        assert_eq!(task.title, "Task 0190f2a4");
    }

    #[test]
    fn test_row_without_identity_is_rejected() {
        let row = payload(json!({ "title": "orphan" }));
        assert!(TaskAssembler::default()
            .assemble(&row, None, received())
            .is_none());
    }

    #[test]
    fn test_unusable_values_resolve_to_unset() {
        let mut existing = Task::new(TaskId::from("T1"), "A", received());
        existing.due_date = Some(received());

        let row = payload(json!({
            "id": "T1",
            "due_date": "next tuesday-ish",
            "status": "blocked"
        }));
        let task = TaskAssembler::default()
            .assemble(&row, Some(&existing), received())
            .unwrap();

        assert_eq!(task.due_date, None);
        assert_eq!(task.status, TaskStatus::Pending);
    }

    #[test]
    fn test_date_fallback_chain() {
        let assembler = plus_eight();
        let expected = Utc.with_ymd_and_hms(2026, 3, 1, 2, 0, 0).unwrap();

        assert_eq!(
            assembler.parse_date_str("2026-03-01T10:00:00+08:00"),
            Some(expected)
        );
        assert_eq!(
            assembler.parse_date_str("2026-03-01T10:00:00"),
            Some(expected)
        );
        assert_eq!(
            assembler.parse_date_str("2026-03-01 10:00:00.000"),
            Some(expected)
        );
        assert_eq!(
            assembler.parse_date_str("2026-03-01"),
            Some(Utc.with_ymd_and_hms(2026, 2, 28, 16, 0, 0).unwrap())
        );
        assert_eq!(
            assembler.parse_date(&json!(expected.timestamp())),
            Some(expected)
        );
        assert_eq!(
            assembler.parse_date(&json!(expected.timestamp_millis())),
            Some(expected)
        );
        assert_eq!(
            assembler.parse_date_str(&expected.timestamp().to_string()),
            Some(expected)
        );
        assert_eq!(assembler.parse_date_str("garbage"), None);
        assert_eq!(assembler.parse_date(&json!(true)), None);
    }

    #[test]
    fn test_marks_deleted() {
        let assembler = TaskAssembler::default();
        assert!(assembler.marks_deleted(&payload(json!({ "id": "T1", "is_deleted": true }))));
        assert!(assembler.marks_deleted(&payload(json!({ "id": "T1", "deleted": 1 }))));
        assert!(assembler.marks_deleted(&payload(
            json!({ "id": "T1", "deleted_at": "2026-03-01T00:00:00Z" })
        )));
        assert!(!assembler.marks_deleted(&payload(json!({ "id": "T1", "deleted_at": null }))));
    }
}
