//! Task snapshot repository implementation

use chrono::{DateTime, Utc};
use libsql::{Connection, Row, Value};

use crate::error::{Error, Result};
use crate::models::{Folder, FolderId, FolderRef, Task, TaskId};

const CURSOR_KEY: &str = "last_sync";

/// Trait for base snapshot storage operations (async)
#[allow(async_fn_in_trait)]
pub trait TaskRepository {
    /// Base tasks in the order they were saved
    async fn load_tasks(&self) -> Result<Vec<Task>>;

    /// Cached folder list
    async fn load_folders(&self) -> Result<Vec<Folder>>;

    /// Time of the last successful sync round
    async fn load_cursor(&self) -> Result<Option<DateTime<Utc>>>;

    /// Replace tasks, folders and cursor in one transaction
    async fn save_snapshot(
        &self,
        tasks: &[Task],
        folders: &[Folder],
        cursor: Option<DateTime<Utc>>,
    ) -> Result<()>;
}

/// libSQL implementation of `TaskRepository`
pub struct LibSqlTaskRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlTaskRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_task(row: &Row) -> Result<Task> {
        let id: String = row.get(0)?;
        let status: String = row.get(3)?;
        let marker: String = row.get(10)?;
        let folder = optional_text(row, 5)?.map(|folder_id| FolderRef {
            id: FolderId::from(folder_id),
            name: None,
        });
        let folder = match (folder, optional_text(row, 6)?) {
            (Some(folder), name) => Some(FolderRef { name, ..folder }),
            (None, _) => None,
        };

        Ok(Task {
            id: TaskId::from(id),
            title: row.get(1)?,
            description: optional_text(row, 2)?,
            status: status.parse().map_err(Error::Database)?,
            due_date: optional_text(row, 4)?
                .map(|value| parse_timestamp(&value))
                .transpose()?,
            folder,
            created_at: parse_timestamp(&row.get::<String>(7)?)?,
            updated_at: parse_timestamp(&row.get::<String>(8)?)?,
            deleted_at: optional_text(row, 9)?
                .map(|value| parse_timestamp(&value))
                .transpose()?,
            sync_marker: marker.parse().map_err(Error::Database)?,
            last_synced_at: optional_text(row, 11)?
                .map(|value| parse_timestamp(&value))
                .transpose()?,
        })
    }

    async fn write_snapshot(
        &self,
        tasks: &[Task],
        folders: &[Folder],
        cursor: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.conn.execute("DELETE FROM tasks", ()).await?;
        for task in tasks {
            let params: Vec<Value> = vec![
                Value::from(task.id.as_str().to_string()),
                Value::from(task.title.clone()),
                nullable_text(task.description.clone()),
                Value::from(task.status.as_str().to_string()),
                nullable_text(task.due_date.map(|due| due.to_rfc3339())),
                nullable_text(task.folder_id().map(|id| id.as_str().to_string())),
                nullable_text(task.folder.as_ref().and_then(|folder| folder.name.clone())),
                Value::from(task.created_at.to_rfc3339()),
                Value::from(task.updated_at.to_rfc3339()),
                nullable_text(task.deleted_at.map(|at| at.to_rfc3339())),
                Value::from(task.sync_marker.as_str().to_string()),
                nullable_text(task.last_synced_at.map(|at| at.to_rfc3339())),
            ];
            self.conn
                .execute(
                    "INSERT INTO tasks (id, title, description, status, due_date, folder_id, folder_name, created_at, updated_at, deleted_at, sync_marker, last_synced_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params,
                )
                .await?;
        }

        self.conn.execute("DELETE FROM folders", ()).await?;
        for folder in folders {
            self.conn
                .execute(
                    "INSERT OR REPLACE INTO folders (id, name) VALUES (?, ?)",
                    [folder.id.as_str(), folder.name.as_str()],
                )
                .await?;
        }

        match cursor {
            Some(cursor) => {
                let value = cursor.to_rfc3339();
                self.conn
                    .execute(
                        "INSERT OR REPLACE INTO sync_state (key, value) VALUES (?, ?)",
                        [CURSOR_KEY, value.as_str()],
                    )
                    .await?;
            }
            None => {
                self.conn
                    .execute("DELETE FROM sync_state WHERE key = ?", [CURSOR_KEY])
                    .await?;
            }
        }
        Ok(())
    }
}

impl TaskRepository for LibSqlTaskRepository<'_> {
    async fn load_tasks(&self) -> Result<Vec<Task>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, title, description, status, due_date, folder_id, folder_name, created_at, updated_at, deleted_at, sync_marker, last_synced_at
                 FROM tasks ORDER BY rowid",
                (),
            )
            .await?;

        let mut tasks = Vec::new();
        while let Some(row) = rows.next().await? {
            tasks.push(Self::parse_task(&row)?);
        }
        Ok(tasks)
    }

    async fn load_folders(&self) -> Result<Vec<Folder>> {
        let mut rows = self
            .conn
            .query("SELECT id, name FROM folders ORDER BY name, id", ())
            .await?;

        let mut folders = Vec::new();
        while let Some(row) = rows.next().await? {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            folders.push(Folder::new(id, name));
        }
        Ok(folders)
    }

    async fn load_cursor(&self) -> Result<Option<DateTime<Utc>>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM sync_state WHERE key = ?", [CURSOR_KEY])
            .await?;

        if let Some(row) = rows.next().await? {
            let value: String = row.get(0)?;
            Ok(Some(parse_timestamp(&value)?))
        } else {
            Ok(None)
        }
    }

    async fn save_snapshot(
        &self,
        tasks: &[Task],
        folders: &[Folder],
        cursor: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.conn.execute("BEGIN TRANSACTION", ()).await?;

        if let Err(e) = self.write_snapshot(tasks, folders, cursor).await {
            self.conn.execute("ROLLBACK", ()).await.ok();
            return Err(e);
        }

        if let Err(e) = self.conn.execute("COMMIT", ()).await {
            self.conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
        Ok(())
    }
}

fn nullable_text(value: Option<String>) -> Value {
    value.map_or(Value::Null, Value::Text)
}

fn optional_text(row: &Row, index: i32) -> Result<Option<String>> {
    match row.get_value(index)? {
        Value::Text(value) => Ok(Some(value)),
        Value::Null => Ok(None),
        other => Err(Error::Database(format!(
            "unexpected value in column {index}: {other:?}"
        ))),
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|e| Error::Database(format!("invalid stored timestamp '{value}': {e}")))
}
