//! Shared database service wrapper used across clients and the sync engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use tokio::sync::Mutex;

use crate::db::{
    ChangeLogRepository, Database, ProjectRepository, SqliteChangeLogRepository,
    SqliteProjectRepository, SqliteTaskRepository, TaskRepository,
};
use crate::models::{
    ChangeLogEntry, Column, EntityType, NewColumn, NewProject, NewTask, Project, ProjectUpdate,
    ProjectWithColumns, Task, TaskUpdate,
};
use crate::Result;

/// Thread-safe, single-writer handle on the local store.
///
/// Every write runs in one immediate transaction, so an entity write and its
/// change log rows commit together.
#[derive(Clone)]
pub struct DatabaseService {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl DatabaseService {
    /// Open a database service at the given filesystem path.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open(&db_path)?;
        tracing::debug!("Opened local store at {}", db_path.display());
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory database service (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    /// Filesystem location of the store, if any.
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Run a read-only closure against the connection.
    pub async fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let db = self.db.lock().await;
        f(db.connection())
    }

    /// Run a closure inside one immediate transaction.
    ///
    /// Commits when the closure succeeds; any error rolls the whole transaction back.
    pub async fn write<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut db = self.db.lock().await;
        let tx = db
            .connection_mut()
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// List projects with their columns.
    pub async fn list_projects(&self) -> Result<Vec<ProjectWithColumns>> {
        self.read(|conn| SqliteProjectRepository::new(conn).list())
            .await
    }

    /// Fetch a project with its columns.
    pub async fn get_project(&self, id: &str) -> Result<Option<ProjectWithColumns>> {
        self.read(|conn| SqliteProjectRepository::new(conn).get(id))
            .await
    }

    /// Create a project and its columns.
    pub async fn create_project(&self, project: &NewProject) -> Result<ProjectWithColumns> {
        self.write(|tx| SqliteProjectRepository::new(tx).create(project))
            .await
    }

    /// Rename or recolour a project.
    pub async fn update_project(&self, id: &str, update: &ProjectUpdate) -> Result<Project> {
        self.write(|tx| SqliteProjectRepository::new(tx).update(id, update))
            .await
    }

    /// Delete a project with its columns and tasks.
    pub async fn delete_project(&self, id: &str) -> Result<()> {
        self.write(|tx| SqliteProjectRepository::new(tx).delete(id))
            .await
    }

    /// Add a column to a project.
    pub async fn add_column(&self, project_id: &str, column: &NewColumn) -> Result<Column> {
        self.write(|tx| SqliteProjectRepository::new(tx).add_column(project_id, column))
            .await
    }

    /// Rename a column.
    pub async fn rename_column(
        &self,
        project_id: &str,
        column_id: &str,
        label: &str,
    ) -> Result<Column> {
        self.write(|tx| {
            SqliteProjectRepository::new(tx).rename_column(project_id, column_id, label)
        })
        .await
    }

    /// Delete a column; returns how many tasks moved to backlog.
    pub async fn delete_column(&self, project_id: &str, column_id: &str) -> Result<usize> {
        self.write(|tx| SqliteProjectRepository::new(tx).delete_column(project_id, column_id))
            .await
    }

    /// List tasks of one project or of all projects.
    pub async fn list_tasks(&self, project_id: Option<&str>) -> Result<Vec<Task>> {
        self.read(|conn| SqliteTaskRepository::new(conn).list(project_id))
            .await
    }

    /// Fetch a task by id.
    pub async fn get_task(&self, id: &str) -> Result<Option<Task>> {
        self.read(|conn| SqliteTaskRepository::new(conn).get(id))
            .await
    }

    /// Create a task.
    pub async fn create_task(&self, task: &NewTask) -> Result<Task> {
        self.write(|tx| SqliteTaskRepository::new(tx).create(task))
            .await
    }

    /// Update a task.
    pub async fn update_task(&self, id: &str, update: &TaskUpdate) -> Result<Task> {
        self.write(|tx| SqliteTaskRepository::new(tx).update(id, update))
            .await
    }

    /// Move a task to another status lane.
    pub async fn move_task(&self, id: &str, status: &str, progress: Option<i64>) -> Result<Task> {
        self.write(|tx| SqliteTaskRepository::new(tx).move_to(id, status, progress))
            .await
    }

    /// Delete a task.
    pub async fn delete_task(&self, id: &str) -> Result<()> {
        self.write(|tx| SqliteTaskRepository::new(tx).delete(id))
            .await
    }

    /// Change log of a single entity, newest first.
    pub async fn entity_history(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<Vec<ChangeLogEntry>> {
        self.read(|conn| SqliteChangeLogRepository::new(conn).entity_history(entity_type, entity_id))
            .await
    }

    /// Change log of a project, newest first.
    pub async fn project_history(&self, project_id: &str) -> Result<Vec<ChangeLogEntry>> {
        self.read(|conn| SqliteChangeLogRepository::new(conn).project_history(project_id))
            .await
    }

    /// Entries not yet pushed, oldest first.
    pub async fn unsynced_changes(&self) -> Result<Vec<ChangeLogEntry>> {
        self.read(|conn| SqliteChangeLogRepository::new(conn).unsynced())
            .await
    }

    /// Number of entries not yet pushed.
    pub async fn unsynced_count(&self) -> Result<usize> {
        self.read(|conn| SqliteChangeLogRepository::new(conn).unsynced_count())
            .await
    }

    /// Entries recorded after a timestamp (Unix ms), oldest first.
    pub async fn changes_since(&self, timestamp_ms: i64) -> Result<Vec<ChangeLogEntry>> {
        self.read(|conn| SqliteChangeLogRepository::new(conn).since(timestamp_ms))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[tokio::test(flavor = "multi_thread")]
    async fn in_memory_create_and_list_roundtrip() {
        let service = DatabaseService::open_in_memory().await.unwrap();

        let project = service
            .create_project(&NewProject::new("Launch"))
            .await
            .unwrap();
        service
            .create_task(&NewTask::new(&project.project.id, "hello core"))
            .await
            .unwrap();

        let tasks = service.list_tasks(None).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "hello core");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_write_rolls_back_entity_and_log() {
        let service = DatabaseService::open_in_memory().await.unwrap();
        let before = service.unsynced_count().await.unwrap();

        let result: Result<()> = service
            .write(|tx| {
                SqliteProjectRepository::new(tx).create(&NewProject::new("Doomed"))?;
                Err(Error::InvalidInput("abort".into()))
            })
            .await;

        assert!(result.is_err());
        assert!(service.list_projects().await.unwrap().is_empty());
        assert_eq!(service.unsynced_count().await.unwrap(), before);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn open_path_creates_parent_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("taskey.db");

        let service = DatabaseService::open_path(&path).await.unwrap();

        assert!(path.exists());
        assert_eq!(service.path(), Some(path.as_path()));
    }
}
