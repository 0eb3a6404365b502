//! taskline-core - Core library for Taskline
//!
//! This crate contains the task and command models, the durable command log,
//! the projector and the sync engine shared by all Taskline clients.

pub mod assembler;
pub mod command_log;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod producer;
pub mod projector;
pub mod services;
pub mod state;
pub mod sync;
pub mod task_index;
pub mod util;

pub use assembler::TaskAssembler;
pub use command_log::{CommandLog, JsonFileLogStore, LogStore, MemoryLogStore};
pub use config::SyncSettings;
pub use error::{Error, Result};
pub use models::{
    Command, CommandId, FieldChanges, Folder, FolderId, Task, TaskDraft, TaskId, TaskStatus,
    UserId, VirtualStatus,
};
pub use producer::CommandSink;
pub use services::{LibSqlTaskStore, MemoryTaskStore, TaskStore};
pub use state::SyncPhase;
pub use sync::{SyncEngine, SyncOutcome, SyncReport, SyncStatus};
pub use task_index::TaskIndex;
