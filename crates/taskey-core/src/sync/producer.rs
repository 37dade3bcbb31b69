//! Turns unsynced change log rows into push diffs.

use rusqlite::Connection;
use serde_json::Value;

use super::types::{DiffData, PushDiffItem, SyncAction, SyncEntity};
use crate::db::{ChangeLogRepository, SqliteChangeLogRepository};
use crate::error::Result;
use crate::models::{ChangeAction, ChangeLogEntry};
use crate::util::millis_to_rfc3339;

/// Diffs ready to push, with the change log rows they came from
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProducedBatch {
    pub diffs: Vec<PushDiffItem>,
    pub change_ids: Vec<i64>,
}

impl ProducedBatch {
    pub fn is_empty(&self) -> bool {
        self.diffs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.diffs.len()
    }
}

/// Read every unsynced entry in insertion order and wrap it for pushing.
pub fn produce_unsynced_diffs(conn: &Connection, base_version: i64) -> Result<ProducedBatch> {
    let entries = SqliteChangeLogRepository::new(conn).unsynced()?;

    let mut batch = ProducedBatch {
        diffs: Vec::with_capacity(entries.len()),
        change_ids: Vec::with_capacity(entries.len()),
    };
    for entry in &entries {
        batch.diffs.push(PushDiffItem {
            base_version,
            data: change_to_diff(entry),
            client_timestamp: millis_to_rfc3339(entry.timestamp),
        });
        batch.change_ids.push(entry.id);
    }
    Ok(batch)
}

/// Wire form of a single change; a `move` becomes a status update.
pub fn change_to_diff(entry: &ChangeLogEntry) -> DiffData {
    let (action, field) = match entry.action {
        ChangeAction::Create => (SyncAction::Create, entry.field.clone()),
        ChangeAction::Update => (SyncAction::Update, entry.field.clone()),
        ChangeAction::Delete => (SyncAction::Delete, entry.field.clone()),
        ChangeAction::Move => (SyncAction::Update, Some("status".to_string())),
    };

    DiffData {
        entity: SyncEntity::from(entry.entity_type),
        entity_id: entry.entity_id.clone(),
        action,
        field,
        old_value: parse_stored_value(entry.old_value.as_deref()),
        new_value: parse_stored_value(entry.new_value.as_deref()),
    }
}

// Stored values are JSON text; anything else goes out as a plain string
fn parse_stored_value(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |text| {
        serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{
        Database, ProjectRepository, SqliteProjectRepository, SqliteTaskRepository,
        TaskRepository,
    };
    use crate::models::{EntityType, NewChange, NewProject, NewTask};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn move_is_sent_as_status_update() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();
        let project = SqliteProjectRepository::new(conn)
            .create(&NewProject::new("Board"))
            .unwrap();
        let tasks = SqliteTaskRepository::new(conn);
        let task = tasks
            .create(&NewTask::new(&project.project.id, "Ship"))
            .unwrap();
        let log = SqliteChangeLogRepository::new(conn);
        let created: Vec<i64> = log.unsynced().unwrap().iter().map(|entry| entry.id).collect();
        log.mark_synced(&created).unwrap();

        tasks.move_to(&task.id, "done", None).unwrap();
        let batch = produce_unsynced_diffs(conn, 7).unwrap();

        assert_eq!(batch.len(), 1);
        let item = &batch.diffs[0];
        assert_eq!(item.base_version, 7);
        assert_eq!(item.data.entity, SyncEntity::Task);
        assert_eq!(item.data.action, SyncAction::Update);
        assert_eq!(item.data.field.as_deref(), Some("status"));
        assert_eq!(item.data.old_value, json!("backlog"));
        assert_eq!(item.data.new_value, json!("done"));
        assert!(item.client_timestamp.ends_with('Z'));
    }

    #[test]
    fn batch_keeps_insertion_order_and_ids() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();
        let log = SqliteChangeLogRepository::new(conn);
        let first = log
            .record(&NewChange::new(EntityType::Project, "p1", ChangeAction::Create))
            .unwrap();
        let second = log
            .record(
                &NewChange::new(EntityType::Project, "p1", ChangeAction::Update)
                    .field("name")
                    .new_json(&json!("Renamed")),
            )
            .unwrap();

        let batch = produce_unsynced_diffs(conn, 0).unwrap();
        assert_eq!(batch.change_ids, vec![first, second]);
        assert_eq!(batch.diffs[1].data.new_value, json!("Renamed"));
    }

    #[test]
    fn non_json_values_are_sent_as_strings() {
        assert_eq!(parse_stored_value(Some("plain text")), json!("plain text"));
        assert_eq!(parse_stored_value(Some("42")), json!(42));
        assert_eq!(parse_stored_value(None), Value::Null);
    }

    #[test]
    fn empty_log_produces_empty_batch() {
        let db = Database::open_in_memory().unwrap();
        let batch = produce_unsynced_diffs(db.connection(), 3).unwrap();
        assert!(batch.is_empty());
        assert!(batch.change_ids.is_empty());
    }
}
