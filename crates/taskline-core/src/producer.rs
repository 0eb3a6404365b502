//! The only way command producers hand intents to the engine.
//!
//! Producers (the CLI, a journal parser) build commands through the provided
//! helpers and never touch the log or the task index directly.

use chrono::Utc;

use crate::error::{Error, Result};
use crate::models::{Command, FieldChanges, TaskDraft, TaskId, UserId};

#[allow(async_fn_in_trait)]
pub trait CommandSink {
    /// User every submitted command must belong to
    fn owner(&self) -> &UserId;

    /// Durably queue a command
    async fn submit(&self, command: Command) -> Result<()>;

    /// Queue a create and return the new task's id
    async fn create_task(&self, mut draft: TaskDraft) -> Result<TaskId> {
        draft.title = draft.title.trim().to_string();
        if draft.title.is_empty() {
            return Err(Error::InvalidInput(
                "task title must not be empty".to_string(),
            ));
        }
        let command = Command::create(self.owner().clone(), draft, Utc::now());
        let Some(id) = command.entity_id().cloned() else {
            return Err(Error::InvalidInput(
                "create command without entity".to_string(),
            ));
        };
        self.submit(command).await?;
        Ok(id)
    }

    async fn update_task(&self, id: TaskId, changes: FieldChanges) -> Result<()> {
        if changes.is_empty() {
            return Err(Error::InvalidInput("no changes given".to_string()));
        }
        if changes
            .title
            .as_deref()
            .is_some_and(|title| title.trim().is_empty())
        {
            return Err(Error::InvalidInput(
                "task title must not be empty".to_string(),
            ));
        }
        let command = Command::update(self.owner().clone(), id, changes, Utc::now());
        self.submit(command).await
    }

    async fn delete_task(&self, id: TaskId, reason: Option<String>) -> Result<()> {
        let command = Command::delete(self.owner().clone(), id, reason, Utc::now());
        self.submit(command).await
    }
}
