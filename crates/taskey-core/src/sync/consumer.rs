//! Applies remote diffs and snapshots to the local store.
//!
//! Every write is recorded in the change log as already synced with the
//! `remote` identity, so it is never pushed back. Each diff and each snapshot
//! row runs in its own savepoint: a failing one rolls back alone and the rest
//! of the batch continues.

use rusqlite::types::Value as SqlValue;
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::types::{
    value_as_array_text, value_as_bool, ColumnRecord, DiffData, ProjectRecord, PullDiffItem,
    Snapshot, SyncAction, SyncEntity, TaskRecord,
};
use crate::db::{
    ChangeLogRepository, ColumnField, ProjectField, SqliteChangeLogRepository,
    SqliteProjectRepository, SqliteTaskRepository, TaskField, TaskRepository,
};
use crate::error::Result;
use crate::models::{
    ChangeAction, EntityType, NewChange, BACKLOG_STATUS, DEFAULT_AVATAR_COLOR,
    DEFAULT_PRIORITY, DEFAULT_PROJECT_COLOR,
};
use crate::util::unix_millis_now;

const DEFAULT_PROJECT_NAME: &str = "Unnamed";
const DEFAULT_COLUMN_LABEL: &str = "Column";
const DEFAULT_TASK_TITLE: &str = "Untitled";

/// Counts from one apply pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub applied: usize,
    pub skipped: usize,
    /// Highest `appliedVersion` (or snapshot version) seen
    pub max_version: i64,
}

impl ApplyReport {
    fn count(&mut self, applied: bool) {
        if applied {
            self.applied += 1;
        } else {
            self.skipped += 1;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Outcome {
    Applied,
    Skipped(String),
}

impl Outcome {
    fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped(reason.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Upsert {
    Inserted,
    Updated,
    MissingProject,
}

impl Upsert {
    const fn action(self) -> ChangeAction {
        match self {
            Self::Inserted => ChangeAction::Create,
            Self::Updated | Self::MissingProject => ChangeAction::Update,
        }
    }
}

/// Writes remote state into the local store on one connection
pub struct DiffConsumer<'a> {
    conn: &'a Connection,
}

impl<'a> DiffConsumer<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    const fn projects(&self) -> SqliteProjectRepository<'a> {
        SqliteProjectRepository::new(self.conn)
    }

    const fn tasks(&self) -> SqliteTaskRepository<'a> {
        SqliteTaskRepository::new(self.conn)
    }

    /// Upsert every project, then column, then task of a snapshot.
    pub fn apply_snapshot(&self, snapshot: &Snapshot) -> Result<ApplyReport> {
        let mut report = ApplyReport {
            max_version: snapshot.version,
            ..ApplyReport::default()
        };

        for (id, raw) in &snapshot.data.projects {
            let applied = self.guarded("project", id, || self.snapshot_project(id, raw))?;
            report.count(applied);
        }
        for (id, raw) in &snapshot.data.columns {
            let applied = self.guarded("column", id, || self.snapshot_column(id, raw))?;
            report.count(applied);
        }
        for (id, raw) in &snapshot.data.tasks {
            let applied = self.guarded("task", id, || self.snapshot_task(id, raw))?;
            report.count(applied);
        }

        tracing::debug!(
            "Applied snapshot v{}: {} rows, {} skipped",
            snapshot.version,
            report.applied,
            report.skipped
        );
        Ok(report)
    }

    /// Apply pulled diffs in order; returns counts and the highest version seen.
    pub fn apply_pull_diffs(&self, diffs: &[PullDiffItem]) -> Result<ApplyReport> {
        let mut report = ApplyReport::default();
        for item in diffs {
            report.count(self.apply_diff(&item.data)?);
            report.max_version = report.max_version.max(item.applied_version);
        }
        Ok(report)
    }

    /// Apply one diff. Returns `false` when it was skipped.
    ///
    /// Only savepoint bookkeeping failures surface as errors; a diff that
    /// fails to apply is rolled back and reported as skipped.
    pub fn apply_diff(&self, diff: &DiffData) -> Result<bool> {
        self.guarded(diff.entity.as_str(), &diff.entity_id, || self.dispatch(diff))
    }

    fn dispatch(&self, diff: &DiffData) -> Result<Outcome> {
        match diff.entity {
            SyncEntity::Project => self.apply_project_diff(diff),
            SyncEntity::Column => self.apply_column_diff(diff),
            SyncEntity::Task => self.apply_task_diff(diff),
            SyncEntity::Label | SyncEntity::Comment | SyncEntity::Unknown => Ok(
                Outcome::skipped(format!("unsupported entity kind {}", diff.entity.as_str())),
            ),
        }
    }

    /// Run `apply` inside a savepoint, rolling back on skip-worthy errors.
    fn guarded(
        &self,
        entity: &str,
        id: &str,
        apply: impl FnOnce() -> Result<Outcome>,
    ) -> Result<bool> {
        self.conn.execute_batch("SAVEPOINT remote_apply")?;
        match apply() {
            Ok(Outcome::Applied) => {
                self.conn.execute_batch("RELEASE remote_apply")?;
                Ok(true)
            }
            Ok(Outcome::Skipped(reason)) => {
                self.conn.execute_batch("RELEASE remote_apply")?;
                tracing::warn!("Skipped remote {entity} {id}: {reason}");
                Ok(false)
            }
            Err(error) => {
                self.conn
                    .execute_batch("ROLLBACK TO remote_apply; RELEASE remote_apply")?;
                tracing::warn!("Failed to apply remote {entity} {id}: {error}");
                Ok(false)
            }
        }
    }

    fn apply_project_diff(&self, diff: &DiffData) -> Result<Outcome> {
        let id = diff.entity_id.as_str();
        let projects = self.projects();
        match diff.action {
            SyncAction::Create => {
                let Some(record) = object_payload::<ProjectRecord>(&diff.new_value)? else {
                    return Ok(Outcome::skipped("create without an object payload"));
                };
                self.upsert_project(id, &record, false)?;
            }
            SyncAction::Update => {
                let Some(name) = diff.field.as_deref() else {
                    return Ok(Outcome::skipped("update without a field"));
                };
                let Some(field) = ProjectField::from_wire(name) else {
                    return Ok(Outcome::skipped(format!("unknown project field {name}")));
                };
                let value = json_to_sql(&diff.new_value);
                if !projects.update_remote_project(id, &[(field, value)], None)? {
                    return Ok(Outcome::skipped("project does not exist"));
                }
            }
            SyncAction::Delete => {
                projects.delete_remote_project(id)?;
            }
            SyncAction::Unknown => return Ok(Outcome::skipped("unknown action")),
        }
        self.log_diff(EntityType::Project, diff, Some(id.to_string()))?;
        Ok(Outcome::Applied)
    }

    fn apply_column_diff(&self, diff: &DiffData) -> Result<Outcome> {
        let id = diff.entity_id.as_str();
        let projects = self.projects();
        let project_id = match diff.action {
            SyncAction::Create => {
                let Some(record) = object_payload::<ColumnRecord>(&diff.new_value)? else {
                    return Ok(Outcome::skipped("create without an object payload"));
                };
                if self.upsert_column(id, &record, false)? == Upsert::MissingProject {
                    return Ok(Outcome::skipped("column references a missing project"));
                }
                record.project_id
            }
            SyncAction::Update => {
                let Some(name) = diff.field.as_deref() else {
                    return Ok(Outcome::skipped("update without a field"));
                };
                let Some(field) = ColumnField::from_wire(name) else {
                    return Ok(Outcome::skipped(format!("unknown column field {name}")));
                };
                let value = match field {
                    ColumnField::IsDone => SqlValue::Integer(i64::from(
                        value_as_bool(&diff.new_value).unwrap_or(false),
                    )),
                    ColumnField::Label => json_to_sql(&diff.new_value),
                };
                if projects.update_remote_column(id, None, &[(field, value)])? == 0 {
                    return Ok(Outcome::skipped("column does not exist"));
                }
                None
            }
            SyncAction::Delete => {
                let (moved, _) = projects.delete_remote_column(id, None)?;
                if moved > 0 {
                    tracing::debug!("Moved {moved} task(s) from removed column {id} to backlog");
                }
                None
            }
            SyncAction::Unknown => return Ok(Outcome::skipped("unknown action")),
        };
        self.log_diff(EntityType::Column, diff, project_id)?;
        Ok(Outcome::Applied)
    }

    fn apply_task_diff(&self, diff: &DiffData) -> Result<Outcome> {
        let id = diff.entity_id.as_str();
        let tasks = self.tasks();
        let existing_project = tasks.get(id)?.map(|task| task.project_id);
        let project_id = match diff.action {
            SyncAction::Create => {
                let Some(record) = object_payload::<TaskRecord>(&diff.new_value)? else {
                    return Ok(Outcome::skipped("create without an object payload"));
                };
                if self.upsert_task(id, &record, false)? == Upsert::MissingProject {
                    return Ok(Outcome::skipped("task references a missing project"));
                }
                record.project_id.or(existing_project)
            }
            SyncAction::Update => {
                let Some(name) = diff.field.as_deref() else {
                    return Ok(Outcome::skipped("update without a field"));
                };
                let Some(field) = TaskField::from_wire(name) else {
                    return Ok(Outcome::skipped(format!("unknown task field {name}")));
                };
                let value = if field.is_json_array() {
                    SqlValue::Text(value_as_array_text(&diff.new_value))
                } else {
                    json_to_sql(&diff.new_value)
                };
                if !tasks.update_remote(id, &[(field, value)], None)? {
                    return Ok(Outcome::skipped("task does not exist"));
                }
                existing_project
            }
            SyncAction::Delete => {
                tasks.delete_remote(id)?;
                existing_project
            }
            SyncAction::Unknown => return Ok(Outcome::skipped("unknown action")),
        };
        self.log_diff(EntityType::Task, diff, project_id)?;
        Ok(Outcome::Applied)
    }

    fn snapshot_project(&self, id: &str, raw: &Value) -> Result<Outcome> {
        let record: ProjectRecord = serde_json::from_value(raw.clone())?;
        let upsert = self.upsert_project(id, &record, true)?;
        self.log_snapshot_row(EntityType::Project, id, Some(id), upsert, raw)?;
        Ok(Outcome::Applied)
    }

    fn snapshot_column(&self, id: &str, raw: &Value) -> Result<Outcome> {
        let record: ColumnRecord = serde_json::from_value(raw.clone())?;
        let upsert = self.upsert_column(id, &record, true)?;
        if upsert == Upsert::MissingProject {
            return Ok(Outcome::skipped("column references a missing project"));
        }
        let project_id = record.project_id.as_deref();
        self.log_snapshot_row(EntityType::Column, id, project_id, upsert, raw)?;
        Ok(Outcome::Applied)
    }

    fn snapshot_task(&self, id: &str, raw: &Value) -> Result<Outcome> {
        let record: TaskRecord = serde_json::from_value(raw.clone())?;
        let upsert = self.upsert_task(id, &record, true)?;
        if upsert == Upsert::MissingProject {
            return Ok(Outcome::skipped("task references a missing project"));
        }
        let project_id = match record.project_id {
            Some(project_id) => Some(project_id),
            None => self.tasks().get(id)?.map(|task| task.project_id),
        };
        self.log_snapshot_row(EntityType::Task, id, project_id.as_deref(), upsert, raw)?;
        Ok(Outcome::Applied)
    }

    /// Insert the project, or overwrite it. With `full`, absent fields fall
    /// back to defaults; otherwise only present fields are written.
    fn upsert_project(&self, id: &str, record: &ProjectRecord, full: bool) -> Result<Upsert> {
        let projects = self.projects();
        if projects.exists(id)? {
            let mut assignments = Vec::with_capacity(2);
            if let Some(name) = pick(record.name.as_deref(), full, DEFAULT_PROJECT_NAME) {
                assignments.push((ProjectField::Name, SqlValue::Text(name.to_string())));
            }
            if let Some(color) = pick(record.color.as_deref(), full, DEFAULT_PROJECT_COLOR) {
                assignments.push((ProjectField::Color, SqlValue::Text(color.to_string())));
            }
            projects.update_remote_project(id, &assignments, record.updated_at)?;
            return Ok(Upsert::Updated);
        }

        let now = unix_millis_now();
        projects.insert_remote_project(
            id,
            record.name.as_deref().unwrap_or(DEFAULT_PROJECT_NAME),
            record.color.as_deref().unwrap_or(DEFAULT_PROJECT_COLOR),
            record.created_at.unwrap_or(now),
            record.updated_at.unwrap_or(now),
        )?;
        Ok(Upsert::Inserted)
    }

    fn upsert_column(&self, id: &str, record: &ColumnRecord, full: bool) -> Result<Upsert> {
        let projects = self.projects();
        let Some(project_id) = record.project_id.as_deref() else {
            return Ok(Upsert::MissingProject);
        };
        if !projects.exists(project_id)? {
            return Ok(Upsert::MissingProject);
        }

        if projects.column_exists(id, Some(project_id))? {
            let mut assignments = Vec::with_capacity(2);
            if let Some(label) = pick(record.label.as_deref(), full, DEFAULT_COLUMN_LABEL) {
                assignments.push((ColumnField::Label, SqlValue::Text(label.to_string())));
            }
            if let Some(is_done) = record.is_done.or(full.then_some(false)) {
                assignments.push((ColumnField::IsDone, SqlValue::Integer(i64::from(is_done))));
            }
            projects.update_remote_column(id, Some(project_id), &assignments)?;
            return Ok(Upsert::Updated);
        }

        projects.insert_remote_column(
            id,
            project_id,
            record.label.as_deref().unwrap_or(DEFAULT_COLUMN_LABEL),
            record.is_done.unwrap_or(false),
            record.created_at.unwrap_or_else(unix_millis_now),
        )?;
        Ok(Upsert::Inserted)
    }

    fn upsert_task(&self, id: &str, record: &TaskRecord, full: bool) -> Result<Upsert> {
        let tasks = self.tasks();
        if let Some(project_id) = record.project_id.as_deref() {
            if !self.projects().exists(project_id)? {
                return Ok(Upsert::MissingProject);
            }
        }

        if tasks.exists(id)? {
            tasks.update_remote(id, &task_assignments(record, full), record.updated_at)?;
            return Ok(Upsert::Updated);
        }

        let Some(project_id) = record.project_id.as_deref() else {
            return Ok(Upsert::MissingProject);
        };
        let now = unix_millis_now();
        tasks.insert_remote(
            id,
            project_id,
            record.status.as_deref().unwrap_or(BACKLOG_STATUS),
            record.title.as_deref().unwrap_or(DEFAULT_TASK_TITLE),
            record.created_at.unwrap_or(now),
            record.updated_at.unwrap_or(now),
        )?;
        tasks.update_remote(id, &task_assignments(record, false), None)?;
        Ok(Upsert::Inserted)
    }

    fn log_diff(
        &self,
        entity_type: EntityType,
        diff: &DiffData,
        project_id: Option<String>,
    ) -> Result<()> {
        let Some(action) = diff.action.change_action() else {
            return Ok(());
        };
        let mut change = NewChange::new(entity_type, &diff.entity_id, action);
        if let Some(project_id) = project_id {
            change = change.project(project_id);
        }
        if let Some(field) = &diff.field {
            change = change.field(field);
        }
        if !diff.old_value.is_null() {
            change = change.old_json(&diff.old_value);
        }
        if !diff.new_value.is_null() {
            change = change.new_json(&diff.new_value);
        }
        SqliteChangeLogRepository::new(self.conn).record(&change.remote())?;
        Ok(())
    }

    fn log_snapshot_row(
        &self,
        entity_type: EntityType,
        id: &str,
        project_id: Option<&str>,
        upsert: Upsert,
        raw: &Value,
    ) -> Result<()> {
        let mut change = NewChange::new(entity_type, id, upsert.action()).new_json(raw);
        if let Some(project_id) = project_id {
            change = change.project(project_id);
        }
        SqliteChangeLogRepository::new(self.conn).record(&change.remote())?;
        Ok(())
    }
}

/// Parse an object payload; `None` when the payload is not an object
fn object_payload<T: DeserializeOwned>(value: &Value) -> Result<Option<T>> {
    if !value.is_object() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_value(value.clone())?))
}

fn pick<'v>(value: Option<&'v str>, full: bool, default: &'v str) -> Option<&'v str> {
    value.or_else(|| full.then_some(default))
}

fn text(value: &str) -> SqlValue {
    SqlValue::Text(value.to_string())
}

fn nullable(value: Option<&str>) -> SqlValue {
    value.map_or(SqlValue::Null, text)
}

/// Column assignments for a task record.
///
/// With `full`, every column is written and absent fields take their defaults.
fn task_assignments(record: &TaskRecord, full: bool) -> Vec<(TaskField, SqlValue)> {
    let mut assignments = Vec::new();

    if let Some(project_id) = record.project_id.as_deref() {
        assignments.push((TaskField::ProjectId, text(project_id)));
    }
    let texts = [
        (TaskField::Status, record.status.as_deref(), BACKLOG_STATUS),
        (TaskField::Title, record.title.as_deref(), DEFAULT_TASK_TITLE),
        (TaskField::Description, record.description.as_deref(), ""),
        (TaskField::Priority, record.priority.as_deref(), DEFAULT_PRIORITY),
        (TaskField::Avatar, record.avatar.as_deref(), ""),
        (TaskField::AvatarColor, record.avatar_color.as_deref(), DEFAULT_AVATAR_COLOR),
        (TaskField::Tags, record.tags.as_deref(), "[]"),
        (TaskField::Checklist, record.checklist.as_deref(), "[]"),
    ];
    for (field, value, default) in texts {
        if let Some(value) = pick(value, full, default) {
            assignments.push((field, text(value)));
        }
    }

    let nullables = [
        (TaskField::DueDate, &record.due_date),
        (TaskField::DueTime, &record.due_time),
        (TaskField::Duration, &record.duration),
    ];
    for (field, value) in nullables {
        match value {
            Some(value) => assignments.push((field, nullable(value.as_deref()))),
            None if full => assignments.push((field, SqlValue::Null)),
            None => {}
        }
    }

    if let Some(progress) = record.progress.or(full.then_some(0)) {
        assignments.push((TaskField::Progress, SqlValue::Integer(progress)));
    }

    assignments
}

fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Number(number) => number.as_i64().map_or_else(
            || SqlValue::Real(number.as_f64().unwrap_or_default()),
            SqlValue::Integer,
        ),
        Value::String(text) => SqlValue::Text(text.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, ProjectRepository};
    use crate::models::{NewProject, NewTask};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn setup() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn diff(entity: SyncEntity, id: &str, action: SyncAction) -> DiffData {
        DiffData {
            entity,
            entity_id: id.to_string(),
            action,
            field: None,
            old_value: Value::Null,
            new_value: Value::Null,
        }
    }

    fn update(entity: SyncEntity, id: &str, field: &str, new_value: Value) -> DiffData {
        DiffData {
            field: Some(field.to_string()),
            new_value,
            ..diff(entity, id, SyncAction::Update)
        }
    }

    fn snapshot() -> Snapshot {
        serde_json::from_value(json!({
            "version": 5,
            "data": {
                "projects": {"p1": {"name": "Alpha", "color": "teal"}},
                "columns": {
                    "todo": {"projectId": "p1", "label": "To do"},
                    "done": {"project_id": "p1", "name": "Done", "is_done": 1},
                    "orphan": {"projectId": "missing", "label": "Lost"}
                },
                "tasks": {
                    "t1": {"projectId": "p1", "title": "Write", "status": "todo", "tags": ["x"]},
                    "t2": {"projectId": "missing", "title": "Nowhere"}
                }
            }
        }))
        .unwrap()
    }

    fn remote_rows(db: &Database, entity_type: EntityType, id: &str) -> usize {
        SqliteChangeLogRepository::new(db.connection())
            .entity_history(entity_type, id)
            .unwrap()
            .into_iter()
            .filter(|entry| entry.synced && entry.user_id == "remote")
            .count()
    }

    #[test]
    fn snapshot_upserts_in_dependency_order_and_skips_orphans() {
        let db = setup();
        let consumer = DiffConsumer::new(db.connection());

        let report = consumer.apply_snapshot(&snapshot()).unwrap();

        assert_eq!(report.applied, 4);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.max_version, 5);

        let project = SqliteProjectRepository::new(db.connection())
            .get("p1")
            .unwrap()
            .unwrap();
        assert_eq!(project.project.name, "Alpha");
        assert_eq!(project.project.color, "teal");
        assert_eq!(project.columns.len(), 2);
        assert!(project.columns.iter().any(|c| c.id == "done" && c.is_done));

        let task = SqliteTaskRepository::new(db.connection())
            .get("t1")
            .unwrap()
            .unwrap();
        assert_eq!(task.status, "todo");
        assert_eq!(task.tags, vec!["x".to_string()]);
        assert!(SqliteTaskRepository::new(db.connection())
            .get("t2")
            .unwrap()
            .is_none());

        assert_eq!(remote_rows(&db, EntityType::Project, "p1"), 1);
        assert_eq!(
            SqliteChangeLogRepository::new(db.connection())
                .unsynced_count()
                .unwrap(),
            0
        );
    }

    #[test]
    fn snapshot_is_idempotent() {
        let db = setup();
        let consumer = DiffConsumer::new(db.connection());

        consumer.apply_snapshot(&snapshot()).unwrap();
        let projects = SqliteProjectRepository::new(db.connection()).list().unwrap();
        let tasks = SqliteTaskRepository::new(db.connection()).list(None).unwrap();

        consumer.apply_snapshot(&snapshot()).unwrap();
        assert_eq!(
            SqliteProjectRepository::new(db.connection()).list().unwrap(),
            projects
        );
        assert_eq!(
            SqliteTaskRepository::new(db.connection()).list(None).unwrap(),
            tasks
        );

        let history = SqliteChangeLogRepository::new(db.connection())
            .entity_history(EntityType::Task, "t1")
            .unwrap();
        assert_eq!(history[0].action, ChangeAction::Update);
        assert_eq!(history[1].action, ChangeAction::Create);
    }

    #[test]
    fn create_on_existing_task_only_writes_present_fields() {
        let db = setup();
        let conn = db.connection();
        let project = SqliteProjectRepository::new(conn)
            .create(&NewProject::new("Board"))
            .unwrap();
        let mut new_task = NewTask::new(&project.project.id, "Original");
        new_task.description = "keep me".into();
        let task = SqliteTaskRepository::new(conn).create(&new_task).unwrap();

        let mut create = diff(SyncEntity::Task, &task.id, SyncAction::Create);
        create.new_value = json!({"title": "Renamed"});
        assert!(DiffConsumer::new(conn).apply_diff(&create).unwrap());

        let task = SqliteTaskRepository::new(conn).get(&task.id).unwrap().unwrap();
        assert_eq!(task.title, "Renamed");
        assert_eq!(task.description, "keep me");
    }

    #[test]
    fn update_diff_is_idempotent_and_logged_as_synced() {
        let db = setup();
        let conn = db.connection();
        DiffConsumer::new(conn).apply_snapshot(&snapshot()).unwrap();
        let rename = update(SyncEntity::Task, "t1", "title", json!("B"));

        let consumer = DiffConsumer::new(conn);
        assert!(consumer.apply_diff(&rename).unwrap());
        let once = SqliteTaskRepository::new(conn).get("t1").unwrap();
        assert!(consumer.apply_diff(&rename).unwrap());
        let twice = SqliteTaskRepository::new(conn).get("t1").unwrap();

        assert_eq!(once, twice);
        assert_eq!(twice.unwrap().title, "B");
        let latest = &SqliteChangeLogRepository::new(conn)
            .entity_history(EntityType::Task, "t1")
            .unwrap()[0];
        assert!(latest.synced);
        assert_eq!(latest.field.as_deref(), Some("title"));
        assert_eq!(latest.project_id.as_deref(), Some("p1"));
    }

    #[test]
    fn unknown_fields_and_entities_are_skipped() {
        let db = setup();
        let conn = db.connection();
        DiffConsumer::new(conn).apply_snapshot(&snapshot()).unwrap();
        let before = SqliteChangeLogRepository::new(conn)
            .entity_history(EntityType::Task, "t1")
            .unwrap()
            .len();

        let consumer = DiffConsumer::new(conn);
        assert!(!consumer
            .apply_diff(&update(SyncEntity::Task, "t1", "mood", json!("happy")))
            .unwrap());
        assert!(!consumer
            .apply_diff(&diff(SyncEntity::Label, "l1", SyncAction::Create))
            .unwrap());
        assert!(!consumer
            .apply_diff(&update(SyncEntity::Task, "ghost", "title", json!("x")))
            .unwrap());

        let after = SqliteChangeLogRepository::new(conn)
            .entity_history(EntityType::Task, "t1")
            .unwrap()
            .len();
        assert_eq!(before, after);
    }

    #[test]
    fn column_delete_moves_tasks_to_backlog() {
        let db = setup();
        let conn = db.connection();
        DiffConsumer::new(conn).apply_snapshot(&snapshot()).unwrap();

        assert!(DiffConsumer::new(conn)
            .apply_diff(&diff(SyncEntity::Column, "todo", SyncAction::Delete))
            .unwrap());

        let task = SqliteTaskRepository::new(conn).get("t1").unwrap().unwrap();
        assert_eq!(task.status, BACKLOG_STATUS);
        assert!(!SqliteProjectRepository::new(conn)
            .column_exists("todo", None)
            .unwrap());
        let log = SqliteChangeLogRepository::new(conn);
        let moved = &log.entity_history(EntityType::Task, "t1").unwrap()[0];
        assert!(moved.synced);
        assert_eq!(moved.field.as_deref(), Some("status"));
        assert_eq!(log.unsynced_count().unwrap(), 0);
    }

    #[test]
    fn failing_diff_rolls_back_alone() {
        let db = setup();
        let conn = db.connection();
        DiffConsumer::new(conn).apply_snapshot(&snapshot()).unwrap();

        let items: Vec<PullDiffItem> = serde_json::from_value(json!([
            {"id": "d1", "appliedVersion": 6,
             "data": {"entity": "task", "entityId": "t1", "action": "update",
                      "field": "title", "newValue": null}},
            {"id": "d2", "appliedVersion": 7,
             "data": {"entity": "project", "entityId": "p1", "action": "update",
                      "field": "name", "newValue": "Beta"}}
        ]))
        .unwrap();

        let report = DiffConsumer::new(conn).apply_pull_diffs(&items).unwrap();

        assert_eq!(report.applied, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.max_version, 7);
        let task = SqliteTaskRepository::new(conn).get("t1").unwrap().unwrap();
        assert_eq!(task.title, "Write");
        let project = SqliteProjectRepository::new(conn).get("p1").unwrap().unwrap();
        assert_eq!(project.project.name, "Beta");
    }

    #[test]
    fn delete_is_idempotent() {
        let db = setup();
        let conn = db.connection();
        DiffConsumer::new(conn).apply_snapshot(&snapshot()).unwrap();
        let delete = diff(SyncEntity::Project, "p1", SyncAction::Delete);

        let consumer = DiffConsumer::new(conn);
        assert!(consumer.apply_diff(&delete).unwrap());
        assert!(consumer.apply_diff(&delete).unwrap());

        assert!(SqliteProjectRepository::new(conn).get("p1").unwrap().is_none());
        assert!(SqliteTaskRepository::new(conn).get("t1").unwrap().is_none());
    }

    #[test]
    fn remote_task_create_lands_at_bottom_of_lane() {
        let db = setup();
        let conn = db.connection();
        DiffConsumer::new(conn).apply_snapshot(&snapshot()).unwrap();

        let mut create = diff(SyncEntity::Task, "t9", SyncAction::Create);
        create.new_value = json!({
            "projectId": "p1", "title": "Later", "status": "todo",
            "priority": "high", "dueDate": "2026-03-01"
        });
        assert!(DiffConsumer::new(conn).apply_diff(&create).unwrap());

        let task = SqliteTaskRepository::new(conn).get("t9").unwrap().unwrap();
        let first = SqliteTaskRepository::new(conn).get("t1").unwrap().unwrap();
        assert_eq!(task.priority, "high");
        assert_eq!(task.due_date.as_deref(), Some("2026-03-01"));
        assert!(task.sort_order > first.sort_order);
    }
}
