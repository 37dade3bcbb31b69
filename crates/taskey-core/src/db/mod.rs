//! Database layer for Taskey

mod change_log_repository;
mod connection;
mod migrations;
mod project_repository;
mod sync_repository;
mod task_repository;

pub use change_log_repository::{ChangeLogRepository, SqliteChangeLogRepository};
pub use connection::Database;
pub use project_repository::{
    ColumnField, ProjectField, ProjectRepository, SqliteProjectRepository,
};
pub use sync_repository::{SqliteSyncRepository, SyncRepository};
pub use task_repository::{SqliteTaskRepository, TaskField, TaskRepository};
