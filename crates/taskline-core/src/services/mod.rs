//! Local collaborators of the sync engine.

mod folders;
mod task_store;

pub use folders::FolderCache;
pub use task_store::{LibSqlTaskStore, LocalSnapshot, MemoryTaskStore, TaskStore};
