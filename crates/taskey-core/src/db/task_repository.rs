//! Task repository implementation

use crate::error::{Error, Result};
use crate::models::{
    ChangeAction, EntityType, NewChange, NewTask, Task, TaskUpdate, BACKLOG_STATUS,
    TRACKED_TASK_FIELDS,
};
use crate::util::unix_millis_now;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::json;

use super::change_log_repository::{ChangeLogRepository, SqliteChangeLogRepository};

const SELECT_COLUMNS: &str = "SELECT id, project_id, status, title, description, priority,
        avatar, avatar_color, due_date, due_time, duration, progress, tags, checklist,
        sort_order, created_at, updated_at
     FROM tasks";

/// Task columns a remote diff may write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskField {
    ProjectId,
    Status,
    Title,
    Description,
    Priority,
    Avatar,
    AvatarColor,
    DueDate,
    DueTime,
    Duration,
    Progress,
    Tags,
    Checklist,
}

impl TaskField {
    /// Map a wire field name (camelCase or snake_case) onto a stored column
    pub fn from_wire(name: &str) -> Option<Self> {
        let field = match name {
            "project_id" | "projectId" => Self::ProjectId,
            "status" => Self::Status,
            "title" => Self::Title,
            "description" | "desc" => Self::Description,
            "priority" => Self::Priority,
            "avatar" => Self::Avatar,
            "avatar_color" | "avatarColor" => Self::AvatarColor,
            "due_date" | "dueDate" => Self::DueDate,
            "due_time" | "dueTime" => Self::DueTime,
            "duration" => Self::Duration,
            "progress" => Self::Progress,
            "tags" => Self::Tags,
            "checklist" => Self::Checklist,
            _ => return None,
        };
        Some(field)
    }

    const fn column(self) -> &'static str {
        match self {
            Self::ProjectId => "project_id",
            Self::Status => "status",
            Self::Title => "title",
            Self::Description => "description",
            Self::Priority => "priority",
            Self::Avatar => "avatar",
            Self::AvatarColor => "avatar_color",
            Self::DueDate => "due_date",
            Self::DueTime => "due_time",
            Self::Duration => "duration",
            Self::Progress => "progress",
            Self::Tags => "tags",
            Self::Checklist => "checklist",
        }
    }

    /// Whether the column holds JSON array text
    pub const fn is_json_array(self) -> bool {
        matches!(self, Self::Tags | Self::Checklist)
    }
}

/// Trait for local task operations
///
/// Every mutation appends change log entries on the same connection.
pub trait TaskRepository {
    /// Tasks of one project (or all projects), in board order
    fn list(&self, project_id: Option<&str>) -> Result<Vec<Task>>;

    /// Get a task by ID
    fn get(&self, id: &str) -> Result<Option<Task>>;

    /// Create a task at the bottom of its status lane
    fn create(&self, task: &NewTask) -> Result<Task>;

    /// Update fields of a task, logging one entry per changed field
    fn update(&self, id: &str, update: &TaskUpdate) -> Result<Task>;

    /// Move a task to another status lane, optionally setting its progress
    fn move_to(&self, id: &str, status: &str, progress: Option<i64>) -> Result<Task>;

    /// Delete a task
    fn delete(&self, id: &str) -> Result<()>;
}

/// `SQLite` implementation of `TaskRepository`
pub struct SqliteTaskRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteTaskRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    const fn log(&self) -> SqliteChangeLogRepository<'a> {
        SqliteChangeLogRepository::new(self.conn)
    }

    /// Parse a task from a database row
    fn parse_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
        let tags: Option<String> = row.get(12)?;
        let checklist: Option<String> = row.get(13)?;
        Ok(Task {
            id: row.get(0)?,
            project_id: row.get(1)?,
            status: row.get(2)?,
            title: row.get(3)?,
            description: row.get(4)?,
            priority: row.get(5)?,
            avatar: row.get(6)?,
            avatar_color: row.get(7)?,
            due_date: row.get(8)?,
            due_time: row.get(9)?,
            duration: row.get(10)?,
            progress: row.get(11)?,
            tags: tags
                .and_then(|text| serde_json::from_str(&text).ok())
                .unwrap_or_default(),
            checklist: checklist
                .and_then(|text| serde_json::from_str(&text).ok())
                .unwrap_or_default(),
            sort_order: row.get(14)?,
            created_at: row.get(15)?,
            updated_at: row.get(16)?,
        })
    }

    fn require(&self, id: &str) -> Result<Task> {
        self.get(id)?
            .ok_or_else(|| Error::NotFound(format!("task {id}")))
    }

    /// `backlog` or a column of the same project
    fn validate_status(&self, project_id: &str, status: &str) -> Result<()> {
        if status == BACKLOG_STATUS {
            return Ok(());
        }
        let known: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM columns WHERE project_id = ? AND id = ?)",
            params![project_id, status],
            |row| row.get(0),
        )?;
        if known {
            Ok(())
        } else {
            Err(Error::InvalidInput(format!(
                "Invalid status \"{status}\" for project \"{project_id}\""
            )))
        }
    }

    fn next_order(&self, project_id: &str, status: &str) -> Result<i64> {
        let max: Option<i64> = self.conn.query_row(
            "SELECT MAX(sort_order) FROM tasks WHERE project_id = ? AND status = ?",
            params![project_id, status],
            |row| row.get(0),
        )?;
        Ok(max.map_or(0, |max| max + 1))
    }

    fn record_move(&self, task: &Task, from: &str, to: &str) -> Result<i64> {
        self.log().record(
            &NewChange::new(EntityType::Task, &task.id, ChangeAction::Move)
                .project(&task.project_id)
                .field("status")
                .old_json(&json!(from))
                .new_json(&json!(to)),
        )
    }

    /// Whether a task row exists
    pub fn exists(&self, id: &str) -> Result<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM tasks WHERE id = ?)",
            params![id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    // Remote writes below never touch the change log. The diff consumer
    // records them as already synced.

    /// Insert a task received from the workspace at the bottom of its lane
    pub fn insert_remote(
        &self,
        id: &str,
        project_id: &str,
        status: &str,
        title: &str,
        created_at: i64,
        updated_at: i64,
    ) -> Result<()> {
        let sort_order = self.next_order(project_id, status)?;
        self.conn.execute(
            "INSERT INTO tasks (id, project_id, status, title, sort_order, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![id, project_id, status, title, sort_order, created_at, updated_at],
        )?;
        Ok(())
    }

    /// Overwrite fields of a task. Returns `false` when the row does not exist.
    pub fn update_remote(
        &self,
        id: &str,
        assignments: &[(TaskField, SqlValue)],
        updated_at: Option<i64>,
    ) -> Result<bool> {
        let mut sets: Vec<String> = Vec::with_capacity(assignments.len() + 1);
        let mut values: Vec<SqlValue> = Vec::with_capacity(assignments.len() + 2);
        for (field, value) in assignments {
            let assignment = format!("{} = ?", field.column());
            // Later assignments of the same column win
            if let Some(position) = sets.iter().position(|set| set == &assignment) {
                values[position] = value.clone();
            } else {
                sets.push(assignment);
                values.push(value.clone());
            }
        }
        if let Some(updated_at) = updated_at {
            sets.push("updated_at = ?".into());
            values.push(SqlValue::Integer(updated_at));
        }
        if sets.is_empty() {
            return self.exists(id);
        }
        values.push(SqlValue::Text(id.to_string()));

        let changed = self.conn.execute(
            &format!("UPDATE tasks SET {} WHERE id = ?", sets.join(", ")),
            params_from_iter(values),
        )?;
        Ok(changed > 0)
    }

    /// Delete a task. Returns whether a row was removed.
    pub fn delete_remote(&self, id: &str) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM tasks WHERE id = ?", params![id])?;
        Ok(removed > 0)
    }
}

impl TaskRepository for SqliteTaskRepository<'_> {
    fn list(&self, project_id: Option<&str>) -> Result<Vec<Task>> {
        let tasks = if let Some(project_id) = project_id {
            let mut stmt = self.conn.prepare(&format!(
                "{SELECT_COLUMNS} WHERE project_id = ? ORDER BY sort_order ASC, created_at ASC"
            ))?;
            let rows = stmt
                .query_map(params![project_id], Self::parse_task)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        } else {
            let mut stmt = self.conn.prepare(&format!(
                "{SELECT_COLUMNS} ORDER BY project_id ASC, sort_order ASC, created_at ASC"
            ))?;
            let rows = stmt
                .query_map([], Self::parse_task)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        Ok(tasks)
    }

    fn get(&self, id: &str) -> Result<Option<Task>> {
        let task = self
            .conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?"),
                params![id],
                Self::parse_task,
            )
            .optional()?;
        Ok(task)
    }

    fn create(&self, task: &NewTask) -> Result<Task> {
        let title = task.title.trim();
        if title.is_empty() {
            return Err(Error::InvalidInput("Task title must not be empty".into()));
        }
        let project_exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM projects WHERE id = ?)",
            params![task.project_id],
            |row| row.get(0),
        )?;
        if !project_exists {
            return Err(Error::NotFound(format!("project {}", task.project_id)));
        }
        self.validate_status(&task.project_id, &task.status)?;

        let now = unix_millis_now();
        let sort_order = self.next_order(&task.project_id, &task.status)?;
        let tags = serde_json::to_string(&task.tags)?;
        let checklist = serde_json::to_string(&task.checklist)?;

        self.conn.execute(
            "INSERT INTO tasks
                (id, project_id, status, title, description, priority, avatar, avatar_color,
                 due_date, due_time, duration, progress, tags, checklist, sort_order,
                 created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                task.id,
                task.project_id,
                task.status,
                title,
                task.description,
                task.priority,
                task.avatar,
                task.avatar_color,
                task.due_date,
                task.due_time,
                task.duration,
                task.progress,
                tags,
                checklist,
                sort_order,
                now,
                now
            ],
        )?;

        self.log().record(
            &NewChange::new(EntityType::Task, &task.id, ChangeAction::Create)
                .project(&task.project_id)
                .new_json(&json!({
                    "projectId": task.project_id,
                    "status": task.status,
                    "title": title,
                    "description": task.description,
                    "priority": task.priority,
                    "avatar": task.avatar,
                    "avatarColor": task.avatar_color,
                    "dueDate": task.due_date,
                    "dueTime": task.due_time,
                    "duration": task.duration,
                    "progress": task.progress,
                    "tags": task.tags,
                    "checklist": task.checklist,
                })),
        )?;

        self.require(&task.id)
    }

    fn update(&self, id: &str, update: &TaskUpdate) -> Result<Task> {
        let existing = self.require(id)?;
        let next = existing.with_update(update);
        if next.title.trim().is_empty() {
            return Err(Error::InvalidInput("Task title must not be empty".into()));
        }
        if next.status != existing.status {
            self.validate_status(&existing.project_id, &next.status)?;
        }

        let now = unix_millis_now();
        self.conn.execute(
            "UPDATE tasks SET
                title = ?, description = ?, priority = ?, avatar = ?, avatar_color = ?,
                due_date = ?, due_time = ?, duration = ?, progress = ?,
                tags = ?, checklist = ?, status = ?, updated_at = ?
             WHERE id = ?",
            params![
                next.title,
                next.description,
                next.priority,
                next.avatar,
                next.avatar_color,
                next.due_date,
                next.due_time,
                next.duration,
                next.progress,
                serde_json::to_string(&next.tags)?,
                serde_json::to_string(&next.checklist)?,
                next.status,
                now,
                id
            ],
        )?;

        self.log().record_field_changes(
            EntityType::Task,
            id,
            Some(existing.project_id.as_str()),
            &existing.tracked_snapshot(),
            &next.tracked_snapshot(),
            &TRACKED_TASK_FIELDS,
        )?;
        if next.status != existing.status {
            self.record_move(&existing, &existing.status, &next.status)?;
        }

        self.require(id)
    }

    fn move_to(&self, id: &str, status: &str, progress: Option<i64>) -> Result<Task> {
        let existing = self.require(id)?;
        self.validate_status(&existing.project_id, status)?;

        let now = unix_millis_now();
        let sort_order = self.next_order(&existing.project_id, status)?;
        let progress_value = progress.unwrap_or(existing.progress);
        self.conn.execute(
            "UPDATE tasks SET status = ?, progress = ?, sort_order = ?, updated_at = ? WHERE id = ?",
            params![status, progress_value, sort_order, now, id],
        )?;

        if status != existing.status {
            self.record_move(&existing, &existing.status, status)?;
        }
        if progress_value != existing.progress {
            self.log().record(
                &NewChange::new(EntityType::Task, id, ChangeAction::Update)
                    .project(&existing.project_id)
                    .field("progress")
                    .old_json(&json!(existing.progress))
                    .new_json(&json!(progress_value)),
            )?;
        }

        self.require(id)
    }

    fn delete(&self, id: &str) -> Result<()> {
        let existing = self.require(id)?;

        self.conn
            .execute("DELETE FROM tasks WHERE id = ?", params![id])?;

        self.log().record(
            &NewChange::new(EntityType::Task, id, ChangeAction::Delete)
                .project(&existing.project_id)
                .old_json(&json!({
                    "title": existing.title,
                    "description": existing.description,
                    "priority": existing.priority,
                    "status": existing.status,
                    "tags": existing.tags,
                    "checklist": existing.checklist,
                })),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, ProjectRepository, SqliteProjectRepository};
    use crate::models::{ChecklistItem, NewProject};
    use pretty_assertions::assert_eq;

    fn setup() -> (Database, String) {
        let db = Database::open_in_memory().unwrap();
        let project = SqliteProjectRepository::new(db.connection())
            .create(&NewProject::new("Launch"))
            .unwrap();
        (db, project.project.id)
    }

    #[test]
    fn test_create_and_get() {
        let (db, project_id) = setup();
        let repo = SqliteTaskRepository::new(db.connection());

        let mut new_task = NewTask::new(&project_id, "Write docs").with_status("todo");
        new_task.tags = vec!["docs".into()];
        new_task.checklist = vec![ChecklistItem {
            text: "outline".into(),
            done: false,
        }];
        let task = repo.create(&new_task).unwrap();

        let fetched = repo.get(&task.id).unwrap().unwrap();
        assert_eq!(fetched, task);
        assert_eq!(fetched.tags, vec!["docs".to_string()]);
        assert_eq!(fetched.priority, "medium");
    }

    #[test]
    fn test_create_rejects_unknown_status() {
        let (db, project_id) = setup();
        let repo = SqliteTaskRepository::new(db.connection());

        let result = repo.create(&NewTask::new(&project_id, "Nope").with_status("archive"));
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_update_logs_field_changes_and_move() {
        let (db, project_id) = setup();
        let repo = SqliteTaskRepository::new(db.connection());
        let task = repo.create(&NewTask::new(&project_id, "A")).unwrap();

        let updated = repo
            .update(
                &task.id,
                &TaskUpdate {
                    title: Some("B".into()),
                    status: Some("done".into()),
                    ..TaskUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(updated.title, "B");
        assert_eq!(updated.status, "done");

        let history = SqliteChangeLogRepository::new(db.connection())
            .entity_history(EntityType::Task, &task.id)
            .unwrap();
        let actions: Vec<(ChangeAction, Option<String>)> = history
            .iter()
            .map(|entry| (entry.action, entry.field.clone()))
            .collect();
        assert_eq!(
            actions,
            vec![
                (ChangeAction::Move, Some("status".into())),
                (ChangeAction::Update, Some("title".into())),
                (ChangeAction::Create, None),
            ]
        );
    }

    #[test]
    fn test_update_without_changes_logs_nothing() {
        let (db, project_id) = setup();
        let repo = SqliteTaskRepository::new(db.connection());
        let task = repo.create(&NewTask::new(&project_id, "A")).unwrap();
        let log = SqliteChangeLogRepository::new(db.connection());
        let before = log.unsynced_count().unwrap();

        repo.update(&task.id, &TaskUpdate::default()).unwrap();

        assert_eq!(log.unsynced_count().unwrap(), before);
    }

    #[test]
    fn test_move_to_appends_to_lane() {
        let (db, project_id) = setup();
        let repo = SqliteTaskRepository::new(db.connection());
        let first = repo
            .create(&NewTask::new(&project_id, "first").with_status("todo"))
            .unwrap();
        let second = repo.create(&NewTask::new(&project_id, "second")).unwrap();

        let moved = repo.move_to(&second.id, "todo", Some(10)).unwrap();
        assert_eq!(moved.status, "todo");
        assert_eq!(moved.progress, 10);
        assert!(moved.sort_order > first.sort_order);
        assert!(repo.move_to(&second.id, "nowhere", None).is_err());
    }

    #[test]
    fn test_delete_column_moves_tasks_to_backlog() {
        let (db, project_id) = setup();
        let tasks = SqliteTaskRepository::new(db.connection());
        for title in ["a", "b", "c"] {
            tasks
                .create(&NewTask::new(&project_id, title).with_status("in-progress"))
                .unwrap();
        }

        let moved = SqliteProjectRepository::new(db.connection())
            .delete_column(&project_id, "in-progress")
            .unwrap();

        assert_eq!(moved, 3);
        assert!(tasks
            .list(Some(&project_id))
            .unwrap()
            .iter()
            .all(|task| task.status == BACKLOG_STATUS));
    }

    #[test]
    fn test_delete_project_logs_task_deletes() {
        let (db, project_id) = setup();
        let tasks = SqliteTaskRepository::new(db.connection());
        let task = tasks.create(&NewTask::new(&project_id, "a")).unwrap();

        SqliteProjectRepository::new(db.connection())
            .delete(&project_id)
            .unwrap();

        assert!(tasks.get(&task.id).unwrap().is_none());
        let history = SqliteChangeLogRepository::new(db.connection())
            .entity_history(EntityType::Task, &task.id)
            .unwrap();
        assert_eq!(history[0].action, ChangeAction::Delete);
    }

    #[test]
    fn test_update_remote_last_assignment_wins() {
        let (db, project_id) = setup();
        let repo = SqliteTaskRepository::new(db.connection());
        repo.insert_remote("t1", &project_id, BACKLOG_STATUS, "Remote", 5, 5)
            .unwrap();

        repo.update_remote(
            "t1",
            &[
                (TaskField::Title, SqlValue::Text("first".into())),
                (TaskField::Title, SqlValue::Text("second".into())),
            ],
            None,
        )
        .unwrap();

        let task = repo.get("t1").unwrap().unwrap();
        assert_eq!(task.title, "second");
        assert_eq!(task.updated_at, 5);
    }
}
