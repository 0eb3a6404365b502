//! Durable, ordered, per-user queue of commands not yet acknowledged.
//!
//! Every mutation is persisted immediately through a [`LogStore`]. When the
//! store cannot be written the log keeps working in memory and reports itself
//! as degraded; when the store cannot be read the log starts empty. Local
//! commands were already shown to the user and the server echo can recreate
//! them, so losing the file is preferred over failing startup.

mod store;

use std::collections::{BTreeMap, HashSet};

pub use store::{JsonFileLogStore, LogDocument, LogStore, MemoryLogStore};

use crate::error::{Error, Result};
use crate::models::{Command, CommandId, Task, TaskId, UserId};
use crate::projector;

/// The command queue for one user
pub struct CommandLog {
    owner: UserId,
    commands: Vec<Command>,
    aliases: BTreeMap<TaskId, TaskId>,
    store: Box<dyn LogStore>,
    degraded: bool,
}

impl std::fmt::Debug for CommandLog {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("CommandLog")
            .field("owner", &self.owner)
            .field("commands", &self.commands.len())
            .field("aliases", &self.aliases.len())
            .field("degraded", &self.degraded)
            .finish_non_exhaustive()
    }
}

impl CommandLog {
    /// Load the owner's log from `store`. Never fails: unreadable data is
    /// logged and replaced by an empty log.
    pub fn open(owner: UserId, store: impl LogStore + 'static) -> Self {
        let mut log = Self {
            owner,
            commands: Vec::new(),
            aliases: BTreeMap::new(),
            store: Box::new(store),
            degraded: false,
        };

        match log.store.load() {
            Ok(Some(document)) => log.adopt(document),
            Ok(None) => {}
            Err(error) => {
                tracing::error!("Command log could not be loaded, starting empty: {}", error);
            }
        }

        tracing::debug!(
            user_id = %log.owner,
            commands = log.commands.len(),
            "Command log opened"
        );
        log
    }

    /// In-memory log with no persistence (primarily for tests)
    pub fn in_memory(owner: UserId) -> Self {
        Self::open(owner, MemoryLogStore::new())
    }

    fn adopt(&mut self, document: LogDocument) {
        if document.user_id != self.owner {
            tracing::warn!(
                expected = %self.owner,
                found = %document.user_id,
                "Command log belongs to another user, ignoring it"
            );
            return;
        }

        let total = document.commands.len();
        self.commands = document
            .commands
            .into_iter()
            .filter(|command| command.user_id() == &self.owner)
            .collect();
        if self.commands.len() != total {
            tracing::warn!(
                dropped = total - self.commands.len(),
                "Dropped commands owned by another user"
            );
        }
        self.aliases = document.aliases;
    }

    pub const fn owner(&self) -> &UserId {
        &self.owner
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Whether the last write to the store failed
    pub const fn is_persistence_degraded(&self) -> bool {
        self.degraded
    }

    /// Append a command and persist the log.
    ///
    /// The entity id is resolved through earlier id remaps, so a caller that
    /// still holds a pre-remap id reaches the same task.
    pub fn enqueue(&mut self, command: Command) -> Result<()> {
        if command.user_id() != &self.owner {
            return Err(Error::Validation(format!(
                "command {} belongs to user {}, log owner is {}",
                command.command_id(),
                command.user_id(),
                self.owner
            )));
        }
        if self
            .commands
            .iter()
            .any(|queued| queued.command_id() == command.command_id())
        {
            return Err(Error::Validation(format!(
                "command {} is already queued",
                command.command_id()
            )));
        }

        let command = match command.entity_id().and_then(|id| self.resolve_alias(id)) {
            Some(target) => command.with_entity(target),
            None => command,
        };

        tracing::debug!(
            command_id = %command.command_id(),
            kind = %command.kind(),
            "Command enqueued"
        );
        self.commands.push(command);
        self.persist();
        Ok(())
    }

    /// Visible tasks: `base` with every queued command applied in order
    pub fn projected_tasks(&self, base: &[Task]) -> Vec<Task> {
        projector::project(base, &self.commands)
    }

    /// Copy of the queue
    pub fn pending_commands(&self) -> Vec<Command> {
        self.commands.clone()
    }

    /// Remove only the named commands. Returns how many were removed.
    pub fn remove_commands(&mut self, ids: &[CommandId]) -> usize {
        if ids.is_empty() {
            return 0;
        }
        let ids: HashSet<&CommandId> = ids.iter().collect();
        let before = self.commands.len();
        self.commands
            .retain(|command| !ids.contains(command.command_id()));
        let removed = before - self.commands.len();
        if removed > 0 {
            self.persist();
        }
        removed
    }

    /// Drop every queued command
    pub fn clear(&mut self) {
        self.commands.clear();
        self.persist();
    }

    /// Point every queued command for `from` at `to` and remember the alias
    /// for commands enqueued later.
    pub fn remap_entity(&mut self, from: &TaskId, to: &TaskId) {
        if from == to {
            return;
        }

        for command in &mut self.commands {
            if command.entity_id() == Some(from) {
                *command = command.with_entity(to.clone());
            }
        }
        for target in self.aliases.values_mut() {
            if target == from {
                target.clone_from(to);
            }
        }
        self.aliases.insert(from.clone(), to.clone());

        tracing::debug!(%from, %to, "Remapped task id in command log");
        self.persist();
    }

    /// Current id for `id` after remaps, if it was ever remapped
    pub fn resolve_alias(&self, id: &TaskId) -> Option<TaskId> {
        self.aliases.get(id).cloned()
    }

    fn document(&self) -> LogDocument {
        LogDocument {
            commands: self.commands.clone(),
            aliases: self.aliases.clone(),
            ..LogDocument::empty(self.owner.clone())
        }
    }

    fn persist(&mut self) {
        match self.store.save(&self.document()) {
            Ok(()) => {
                if self.degraded {
                    tracing::info!("Command log persistence recovered");
                }
                self.degraded = false;
            }
            Err(error) => {
                tracing::error!(
                    "Command log persistence failed, continuing in memory only: {}",
                    error
                );
                self.degraded = true;
            }
        }
    }
}
