//! Database layer for Taskline

mod connection;
mod migrations;
mod task_repository;

pub use connection::Database;
pub use task_repository::{LibSqlTaskRepository, TaskRepository};
