//! Logical message shapes exchanged with the sync service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::{CommandId, TaskId, UserId};

/// Outgoing batch for one sync round
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncBatch {
    pub user_id: UserId,
    pub client_timestamp: DateTime<Utc>,
    pub last_sync: Option<DateTime<Utc>>,
    pub commands: Vec<WireCommand>,
}

/// One command as the server sees it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireCommand {
    pub command_type: String,
    pub entity_type: String,
    pub entity_id: TaskId,
    pub client_id: CommandId,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Update fields, written at the root of the object
    #[serde(flatten)]
    pub changed_fields: Map<String, Value>,
}

/// Server reply to a batch
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SyncResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, alias = "serverTimestamp")]
    pub server_timestamp: Option<Value>,
    #[serde(default, alias = "processedCommands")]
    pub processed_commands: Vec<CommandAck>,
    #[serde(default, alias = "serverChanges")]
    pub server_changes: Vec<Value>,
    #[serde(default)]
    pub conflicts: Vec<ConflictEntry>,
    #[serde(default, alias = "errorMessage")]
    pub error_message: Option<String>,
}

/// Per-command acknowledgement
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommandAck {
    #[serde(alias = "clientId")]
    pub client_id: CommandId,
    #[serde(default, alias = "commandType")]
    pub command_type: Option<String>,
    #[serde(default)]
    pub success: bool,
    #[serde(default, alias = "serverId")]
    pub server_id: Option<TaskId>,
    #[serde(default, alias = "errorMessage")]
    pub error_message: Option<String>,
}

/// Server-detected conflict for one entity
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConflictEntry {
    #[serde(default, alias = "entityId")]
    pub entity_id: Option<TaskId>,
    #[serde(default, alias = "conflictType")]
    pub conflict_type: Option<String>,
    #[serde(default, alias = "serverData")]
    pub server_data: Option<Value>,
    #[serde(default, alias = "clientData")]
    pub client_data: Option<Value>,
}
