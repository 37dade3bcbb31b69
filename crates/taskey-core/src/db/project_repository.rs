//! Project and column repository implementation

use crate::error::{Error, Result};
use crate::models::{
    ChangeAction, Column, EntityType, NewChange, NewColumn, NewProject, Project, ProjectUpdate,
    ProjectWithColumns, BACKLOG_STATUS,
};
use crate::util::unix_millis_now;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::json;

use super::change_log_repository::{ChangeLogRepository, SqliteChangeLogRepository};

/// Project columns a remote diff may write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectField {
    Name,
    Color,
}

impl ProjectField {
    /// Map a wire field name onto a stored column
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "name" | "title" => Some(Self::Name),
            "color" => Some(Self::Color),
            _ => None,
        }
    }

    const fn column(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Color => "color",
        }
    }
}

/// Board-column columns a remote diff may write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnField {
    Label,
    IsDone,
}

impl ColumnField {
    /// Map a wire field name onto a stored column
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "label" | "name" => Some(Self::Label),
            "is_done" | "isDone" => Some(Self::IsDone),
            _ => None,
        }
    }

    const fn column(self) -> &'static str {
        match self {
            Self::Label => "label",
            Self::IsDone => "is_done",
        }
    }
}

/// Trait for local project and column operations
///
/// Every mutation appends change log entries on the same connection.
pub trait ProjectRepository {
    /// All projects with their columns, in board order
    fn list(&self) -> Result<Vec<ProjectWithColumns>>;

    /// A single project with its columns
    fn get(&self, id: &str) -> Result<Option<ProjectWithColumns>>;

    /// Create a project and its initial columns
    fn create(&self, project: &NewProject) -> Result<ProjectWithColumns>;

    /// Update name and/or colour
    fn update(&self, id: &str, update: &ProjectUpdate) -> Result<Project>;

    /// Delete a project together with its columns and tasks
    fn delete(&self, id: &str) -> Result<()>;

    /// Columns of one project, in board order
    fn columns(&self, project_id: &str) -> Result<Vec<Column>>;

    /// Add a column, placed before the first done column
    fn add_column(&self, project_id: &str, column: &NewColumn) -> Result<Column>;

    /// Rename a column
    fn rename_column(&self, project_id: &str, column_id: &str, label: &str) -> Result<Column>;

    /// Delete a column, moving its tasks to backlog. Returns the number of moved tasks.
    fn delete_column(&self, project_id: &str, column_id: &str) -> Result<usize>;
}

/// `SQLite` implementation of `ProjectRepository`
pub struct SqliteProjectRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteProjectRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    const fn log(&self) -> SqliteChangeLogRepository<'a> {
        SqliteChangeLogRepository::new(self.conn)
    }

    /// Parse a project from a database row
    fn parse_project(row: &rusqlite::Row<'_>) -> rusqlite::Result<Project> {
        Ok(Project {
            id: row.get(0)?,
            name: row.get(1)?,
            color: row.get(2)?,
            sort_order: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    /// Parse a column from a database row
    fn parse_column(row: &rusqlite::Row<'_>) -> rusqlite::Result<Column> {
        Ok(Column {
            id: row.get(0)?,
            project_id: row.get(1)?,
            label: row.get(2)?,
            is_done: row.get::<_, i32>(3)? != 0,
            sort_order: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    /// Load a project row without its columns
    pub fn project(&self, id: &str) -> Result<Option<Project>> {
        let project = self
            .conn
            .query_row(
                "SELECT id, name, color, sort_order, created_at, updated_at
                 FROM projects WHERE id = ?",
                params![id],
                Self::parse_project,
            )
            .optional()?;
        Ok(project)
    }

    /// Whether a project row exists
    pub fn exists(&self, id: &str) -> Result<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM projects WHERE id = ?)",
            params![id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Load one column of a project
    pub fn column(&self, project_id: &str, column_id: &str) -> Result<Option<Column>> {
        let column = self
            .conn
            .query_row(
                "SELECT id, project_id, label, is_done, sort_order, created_at
                 FROM columns WHERE id = ? AND project_id = ?",
                params![column_id, project_id],
                Self::parse_column,
            )
            .optional()?;
        Ok(column)
    }

    fn require_project(&self, id: &str) -> Result<Project> {
        self.project(id)?
            .ok_or_else(|| Error::NotFound(format!("project {id}")))
    }

    fn next_project_order(&self) -> Result<i64> {
        let max: Option<i64> =
            self.conn
                .query_row("SELECT MAX(sort_order) FROM projects", [], |row| row.get(0))?;
        Ok(max.map_or(0, |max| max + 1))
    }

    fn next_column_order(&self, project_id: &str) -> Result<i64> {
        let max: Option<i64> = self.conn.query_row(
            "SELECT MAX(sort_order) FROM columns WHERE project_id = ?",
            params![project_id],
            |row| row.get(0),
        )?;
        Ok(max.map_or(0, |max| max + 1))
    }

    fn insert_column(
        &self,
        project_id: &str,
        column: &NewColumn,
        sort_order: i64,
        now: i64,
    ) -> Result<Column> {
        if column.id.trim().is_empty() || column.label.trim().is_empty() {
            return Err(Error::InvalidInput(
                "Column id and label must not be empty".into(),
            ));
        }
        if column.id == BACKLOG_STATUS {
            return Err(Error::InvalidInput(format!(
                "'{BACKLOG_STATUS}' is reserved and cannot be used as a column id"
            )));
        }
        if self.column(project_id, &column.id)?.is_some() {
            return Err(Error::InvalidInput(format!(
                "Column '{}' already exists in project {project_id}",
                column.id
            )));
        }

        self.conn.execute(
            "INSERT INTO columns (id, project_id, label, is_done, sort_order, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                column.id,
                project_id,
                column.label,
                i32::from(column.is_done),
                sort_order,
                now
            ],
        )?;

        self.log().record(
            &NewChange::new(EntityType::Column, &column.id, ChangeAction::Create)
                .project(project_id)
                .new_json(&json!({
                    "projectId": project_id,
                    "label": column.label,
                    "isDone": column.is_done,
                })),
        )?;

        Ok(Column {
            id: column.id.clone(),
            project_id: project_id.to_string(),
            label: column.label.clone(),
            is_done: column.is_done,
            sort_order,
            created_at: now,
        })
    }

    // Remote writes below never touch the change log. The diff consumer
    // records them as already synced.

    /// Insert a project received from the workspace, appended after existing ones
    pub fn insert_remote_project(
        &self,
        id: &str,
        name: &str,
        color: &str,
        created_at: i64,
        updated_at: i64,
    ) -> Result<()> {
        let sort_order = self.next_project_order()?;
        self.conn.execute(
            "INSERT INTO projects (id, name, color, sort_order, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![id, name, color, sort_order, created_at, updated_at],
        )?;
        Ok(())
    }

    /// Overwrite fields of a project. Returns `false` when the row does not exist.
    pub fn update_remote_project(
        &self,
        id: &str,
        assignments: &[(ProjectField, SqlValue)],
        updated_at: Option<i64>,
    ) -> Result<bool> {
        let mut sets: Vec<String> = assignments
            .iter()
            .map(|(field, _)| format!("{} = ?", field.column()))
            .collect();
        let mut values: Vec<SqlValue> = assignments.iter().map(|(_, v)| v.clone()).collect();
        if let Some(updated_at) = updated_at {
            sets.push("updated_at = ?".into());
            values.push(SqlValue::Integer(updated_at));
        }
        if sets.is_empty() {
            return self.exists(id);
        }
        values.push(SqlValue::Text(id.to_string()));

        let changed = self.conn.execute(
            &format!("UPDATE projects SET {} WHERE id = ?", sets.join(", ")),
            params_from_iter(values),
        )?;
        Ok(changed > 0)
    }

    /// Delete a project (columns and tasks cascade). Returns whether a row was removed.
    pub fn delete_remote_project(&self, id: &str) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM projects WHERE id = ?", params![id])?;
        Ok(removed > 0)
    }

    /// Insert a column received from the workspace, appended after existing ones
    pub fn insert_remote_column(
        &self,
        id: &str,
        project_id: &str,
        label: &str,
        is_done: bool,
        created_at: i64,
    ) -> Result<()> {
        let sort_order = self.next_column_order(project_id)?;
        self.conn.execute(
            "INSERT INTO columns (id, project_id, label, is_done, sort_order, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![id, project_id, label, i32::from(is_done), sort_order, created_at],
        )?;
        Ok(())
    }

    /// Overwrite fields of a column.
    ///
    /// Without a project id every column carrying that id is updated. Returns the
    /// number of matched rows.
    pub fn update_remote_column(
        &self,
        id: &str,
        project_id: Option<&str>,
        assignments: &[(ColumnField, SqlValue)],
    ) -> Result<usize> {
        if assignments.is_empty() {
            return Ok(0);
        }
        let sets: Vec<String> = assignments
            .iter()
            .map(|(field, _)| format!("{} = ?", field.column()))
            .collect();
        let mut values: Vec<SqlValue> = assignments.iter().map(|(_, v)| v.clone()).collect();
        values.push(SqlValue::Text(id.to_string()));

        let mut sql = format!("UPDATE columns SET {} WHERE id = ?", sets.join(", "));
        if let Some(project_id) = project_id {
            sql.push_str(" AND project_id = ?");
            values.push(SqlValue::Text(project_id.to_string()));
        }
        Ok(self.conn.execute(&sql, params_from_iter(values))?)
    }

    /// Delete a column, first moving its tasks to backlog.
    ///
    /// Each moved task is logged as a synced `status` update. Returns
    /// `(moved_tasks, removed_columns)`.
    pub fn delete_remote_column(
        &self,
        id: &str,
        project_id: Option<&str>,
    ) -> Result<(usize, usize)> {
        let moved = match project_id {
            Some(project_id) => {
                let mut stmt = self
                    .conn
                    .prepare("SELECT id, project_id FROM tasks WHERE status = ? AND project_id = ?")?;
                let rows = stmt
                    .query_map(params![id, project_id], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<rusqlite::Result<Vec<(String, String)>>>()?;
                rows
            }
            None => {
                let mut stmt = self.conn.prepare(
                    "SELECT id, project_id FROM tasks
                     WHERE status = ?1
                       AND project_id IN (SELECT project_id FROM columns WHERE id = ?1)",
                )?;
                let rows = stmt
                    .query_map(params![id], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<rusqlite::Result<Vec<(String, String)>>>()?;
                rows
            }
        };

        let log = self.log();
        for (task_id, task_project) in &moved {
            self.conn.execute(
                "UPDATE tasks SET status = ? WHERE id = ?",
                params![BACKLOG_STATUS, task_id],
            )?;
            log.record(
                &NewChange::new(EntityType::Task, task_id, ChangeAction::Update)
                    .project(task_project)
                    .field("status")
                    .old_json(&json!(id))
                    .new_json(&json!(BACKLOG_STATUS))
                    .remote(),
            )?;
        }

        let removed = match project_id {
            Some(project_id) => self.conn.execute(
                "DELETE FROM columns WHERE id = ? AND project_id = ?",
                params![id, project_id],
            )?,
            None => self
                .conn
                .execute("DELETE FROM columns WHERE id = ?", params![id])?,
        };
        Ok((moved.len(), removed))
    }

    /// Whether the column exists (in any project when `project_id` is `None`)
    pub fn column_exists(&self, id: &str, project_id: Option<&str>) -> Result<bool> {
        let exists: bool = match project_id {
            Some(project_id) => self.conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM columns WHERE id = ? AND project_id = ?)",
                params![id, project_id],
                |row| row.get(0),
            )?,
            None => self.conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM columns WHERE id = ?)",
                params![id],
                |row| row.get(0),
            )?,
        };
        Ok(exists)
    }
}

impl ProjectRepository for SqliteProjectRepository<'_> {
    fn list(&self) -> Result<Vec<ProjectWithColumns>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, color, sort_order, created_at, updated_at
             FROM projects
             ORDER BY sort_order ASC, created_at ASC",
        )?;
        let projects = stmt
            .query_map([], Self::parse_project)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        projects
            .into_iter()
            .map(|project| {
                let columns = self.columns(&project.id)?;
                Ok(ProjectWithColumns { project, columns })
            })
            .collect()
    }

    fn get(&self, id: &str) -> Result<Option<ProjectWithColumns>> {
        let Some(project) = self.project(id)? else {
            return Ok(None);
        };
        let columns = self.columns(id)?;
        Ok(Some(ProjectWithColumns { project, columns }))
    }

    fn create(&self, project: &NewProject) -> Result<ProjectWithColumns> {
        let name = project.name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("Project name must not be empty".into()));
        }
        if self.exists(&project.id)? {
            return Err(Error::InvalidInput(format!(
                "Project {} already exists",
                project.id
            )));
        }

        let now = unix_millis_now();
        let sort_order = self.next_project_order()?;
        self.conn.execute(
            "INSERT INTO projects (id, name, color, sort_order, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![project.id, name, project.color, sort_order, now, now],
        )?;

        self.log().record(
            &NewChange::new(EntityType::Project, &project.id, ChangeAction::Create)
                .project(&project.id)
                .new_json(&json!({ "name": name, "color": project.color })),
        )?;

        let mut columns = Vec::with_capacity(project.columns.len());
        for (index, column) in project.columns.iter().enumerate() {
            let order = i64::try_from(index).unwrap_or(i64::MAX);
            columns.push(self.insert_column(&project.id, column, order, now)?);
        }

        Ok(ProjectWithColumns {
            project: Project {
                id: project.id.clone(),
                name: name.to_string(),
                color: project.color.clone(),
                sort_order,
                created_at: now,
                updated_at: now,
            },
            columns,
        })
    }

    fn update(&self, id: &str, update: &ProjectUpdate) -> Result<Project> {
        let existing = self.require_project(id)?;

        let name = update
            .name
            .as_deref()
            .map(str::trim)
            .unwrap_or(existing.name.as_str())
            .to_string();
        if name.is_empty() {
            return Err(Error::InvalidInput("Project name must not be empty".into()));
        }
        let color = update.color.clone().unwrap_or_else(|| existing.color.clone());
        let now = unix_millis_now();

        self.conn.execute(
            "UPDATE projects SET name = ?, color = ?, updated_at = ? WHERE id = ?",
            params![name, color, now, id],
        )?;

        self.log().record_field_changes(
            EntityType::Project,
            id,
            Some(id),
            &json!({ "name": existing.name, "color": existing.color }),
            &json!({ "name": name, "color": color }),
            &["name", "color"],
        )?;

        Ok(Project {
            name,
            color,
            updated_at: now,
            ..existing
        })
    }

    fn delete(&self, id: &str) -> Result<()> {
        let existing = self.require_project(id)?;
        let log = self.log();

        let mut stmt = self
            .conn
            .prepare("SELECT id, title FROM tasks WHERE project_id = ? ORDER BY sort_order")?;
        let tasks = stmt
            .query_map(params![id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for (task_id, title) in &tasks {
            log.record(
                &NewChange::new(EntityType::Task, task_id, ChangeAction::Delete)
                    .project(id)
                    .old_json(&json!({ "title": title })),
            )?;
        }

        self.conn
            .execute("DELETE FROM projects WHERE id = ?", params![id])?;

        log.record(
            &NewChange::new(EntityType::Project, id, ChangeAction::Delete)
                .project(id)
                .old_json(&json!({ "name": existing.name, "color": existing.color })),
        )?;

        tracing::debug!("Deleted project {id} with {} tasks", tasks.len());
        Ok(())
    }

    fn columns(&self, project_id: &str) -> Result<Vec<Column>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, project_id, label, is_done, sort_order, created_at
             FROM columns
             WHERE project_id = ?
             ORDER BY sort_order ASC, created_at ASC",
        )?;
        let columns = stmt
            .query_map(params![project_id], Self::parse_column)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(columns)
    }

    fn add_column(&self, project_id: &str, column: &NewColumn) -> Result<Column> {
        self.require_project(project_id)?;

        let columns = self.columns(project_id)?;
        let sort_order = match columns.iter().find(|existing| existing.is_done) {
            Some(done) if !column.is_done => {
                self.conn.execute(
                    "UPDATE columns SET sort_order = sort_order + 1
                     WHERE project_id = ? AND sort_order >= ?",
                    params![project_id, done.sort_order],
                )?;
                done.sort_order
            }
            _ => self.next_column_order(project_id)?,
        };

        self.insert_column(project_id, column, sort_order, unix_millis_now())
    }

    fn rename_column(&self, project_id: &str, column_id: &str, label: &str) -> Result<Column> {
        let label = label.trim();
        if label.is_empty() {
            return Err(Error::InvalidInput("Column label must not be empty".into()));
        }
        let existing = self
            .column(project_id, column_id)?
            .ok_or_else(|| Error::NotFound(format!("column {column_id} in project {project_id}")))?;

        self.conn.execute(
            "UPDATE columns SET label = ? WHERE id = ? AND project_id = ?",
            params![label, column_id, project_id],
        )?;

        self.log().record_field_changes(
            EntityType::Column,
            column_id,
            Some(project_id),
            &json!({ "label": existing.label }),
            &json!({ "label": label }),
            &["label"],
        )?;

        Ok(Column {
            label: label.to_string(),
            ..existing
        })
    }

    fn delete_column(&self, project_id: &str, column_id: &str) -> Result<usize> {
        let existing = self
            .column(project_id, column_id)?
            .ok_or_else(|| Error::NotFound(format!("column {column_id} in project {project_id}")))?;
        let log = self.log();
        let now = unix_millis_now();

        let mut stmt = self
            .conn
            .prepare("SELECT id FROM tasks WHERE project_id = ? AND status = ?")?;
        let task_ids = stmt
            .query_map(params![project_id, column_id], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for task_id in &task_ids {
            self.conn.execute(
                "UPDATE tasks SET status = ?, updated_at = ? WHERE id = ?",
                params![BACKLOG_STATUS, now, task_id],
            )?;
            log.record(
                &NewChange::new(EntityType::Task, task_id, ChangeAction::Move)
                    .project(project_id)
                    .field("status")
                    .old_json(&json!(column_id))
                    .new_json(&json!(BACKLOG_STATUS)),
            )?;
        }

        self.conn.execute(
            "DELETE FROM columns WHERE id = ? AND project_id = ?",
            params![column_id, project_id],
        )?;

        log.record(
            &NewChange::new(EntityType::Column, column_id, ChangeAction::Delete)
                .project(project_id)
                .old_json(&json!({ "label": existing.label })),
        )?;

        Ok(task_ids.len())
    }
}
