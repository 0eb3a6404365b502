//! Data models for Taskline

mod command;
mod folder;
mod ids;
mod task;

pub use command::{
    Command, CommandKind, CreateTask, DeleteTask, FieldChanges, TaskDraft, UnrecognizedCommand,
    UpdateTask,
};
pub use folder::Folder;
pub use ids::{CommandId, FolderId, TaskId, UserId};
pub use task::{FolderRef, SyncMarker, Task, TaskStatus, VirtualStatus};
