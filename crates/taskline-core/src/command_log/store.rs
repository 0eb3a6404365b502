//! Durable storage for the command log

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{Command, TaskId, UserId};
use crate::util::file_safe_component;

const LOG_DOCUMENT_VERSION: u32 = 1;

/// On-disk shape of one user's command log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogDocument {
    #[serde(default = "default_document_version")]
    pub version: u32,
    pub user_id: UserId,
    #[serde(default)]
    pub commands: Vec<Command>,
    /// Ids replaced by the server, old id to new id
    #[serde(default)]
    pub aliases: BTreeMap<TaskId, TaskId>,
}

const fn default_document_version() -> u32 {
    LOG_DOCUMENT_VERSION
}

impl LogDocument {
    pub const fn empty(user_id: UserId) -> Self {
        Self {
            version: LOG_DOCUMENT_VERSION,
            user_id,
            commands: Vec::new(),
            aliases: BTreeMap::new(),
        }
    }
}

/// Backing store for a [`CommandLog`](super::CommandLog)
pub trait LogStore: Send + Sync {
    /// Load the persisted document, `None` when nothing was saved yet
    fn load(&self) -> Result<Option<LogDocument>>;

    /// Replace the persisted document
    fn save(&self, document: &LogDocument) -> Result<()>;
}

/// JSON file per user, written through a temporary sibling and a rename
#[derive(Debug, Clone)]
pub struct JsonFileLogStore {
    path: PathBuf,
}

impl JsonFileLogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Conventional location of a user's log inside the data directory
    pub fn for_user(data_dir: &Path, user_id: &UserId) -> Self {
        let file_name = format!("command-log-{}.json", file_safe_component(user_id.as_str()));
        Self::new(data_dir.join(file_name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The JSON is parsed entry by entry so one damaged command does not
    /// take the rest of the log with it.
    fn parse(raw: &str) -> Result<LogDocument> {
        #[derive(Deserialize)]
        struct RawDocument {
            #[serde(default = "default_document_version")]
            version: u32,
            user_id: UserId,
            #[serde(default)]
            commands: Vec<serde_json::Value>,
            #[serde(default)]
            aliases: BTreeMap<TaskId, TaskId>,
        }

        let raw: RawDocument = serde_json::from_str(raw)?;
        let mut commands = Vec::with_capacity(raw.commands.len());
        for (position, entry) in raw.commands.into_iter().enumerate() {
            match serde_json::from_value::<Command>(entry) {
                Ok(command) => commands.push(command),
                Err(error) => {
                    tracing::warn!(position, "Dropping unreadable command log entry: {}", error);
                }
            }
        }

        Ok(LogDocument {
            version: raw.version,
            user_id: raw.user_id,
            commands,
            aliases: raw.aliases,
        })
    }

    /// Move an unreadable file out of the way so the next save does not
    /// overwrite it.
    fn quarantine(&self) {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let Some(file_name) = self.path.file_name().and_then(|name| name.to_str()) else {
            return;
        };
        let backup_path = self
            .path
            .with_file_name(format!("{file_name}.corrupt-{timestamp}"));
        match std::fs::rename(&self.path, &backup_path) {
            Ok(()) => tracing::warn!(
                "Moved unreadable command log from {} to {}",
                self.path.display(),
                backup_path.display()
            ),
            Err(error) => tracing::warn!(
                "Failed to move unreadable command log {}: {}",
                self.path.display(),
                error
            ),
        }
    }
}

impl LogStore for JsonFileLogStore {
    fn load(&self) -> Result<Option<LogDocument>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let raw = std::fs::read_to_string(&self.path).map_err(|error| {
            Error::Persistence(format!(
                "Failed to read command log at {}: {}",
                self.path.display(),
                error
            ))
        })?;

        match Self::parse(&raw) {
            Ok(document) => Ok(Some(document)),
            Err(error) => {
                self.quarantine();
                Err(Error::Persistence(format!(
                    "Failed to parse command log at {}: {}",
                    self.path.display(),
                    error
                )))
            }
        }
    }

    fn save(&self, document: &LogDocument) -> Result<()> {
        let persistence = |action: &str, error: &dyn std::fmt::Display| {
            Error::Persistence(format!(
                "Failed to {action} command log at {}: {}",
                self.path.display(),
                error
            ))
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| persistence("prepare", &error))?;
        }

        let serialized =
            serde_json::to_vec(document).map_err(|error| persistence("serialize", &error))?;
        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, serialized).map_err(|error| persistence("write", &error))?;
        std::fs::rename(&temp_path, &self.path).map_err(|error| persistence("replace", &error))
    }
}

/// Store kept in memory only (primarily for tests)
#[derive(Debug, Default)]
pub struct MemoryLogStore {
    document: Mutex<Option<LogDocument>>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(document: LogDocument) -> Self {
        Self {
            document: Mutex::new(Some(document)),
        }
    }

    /// Last saved document
    pub fn snapshot(&self) -> Option<LogDocument> {
        self.document
            .lock()
            .map_or(None, |document| document.clone())
    }
}

impl LogStore for MemoryLogStore {
    fn load(&self) -> Result<Option<LogDocument>> {
        Ok(self.snapshot())
    }

    fn save(&self, document: &LogDocument) -> Result<()> {
        let mut slot = self
            .document
            .lock()
            .map_err(|_| Error::Persistence("memory log store poisoned".to_string()))?;
        *slot = Some(document.clone());
        Ok(())
    }
}
