//! Change log repository implementation

use crate::error::Result;
use crate::models::{ChangeAction, ChangeLogEntry, EntityType, NewChange};
use crate::util::unix_millis_now;
use rusqlite::{params, params_from_iter, Connection};
use serde_json::Value;

const SELECT_COLUMNS: &str = "SELECT id, timestamp, user_id, device_id, session_id, entity_type,
        entity_id, project_id, action, field, old_value, new_value, synced
     FROM change_log";

/// Trait for the append-only change log
pub trait ChangeLogRepository {
    /// Append one entry and return its row id
    fn record(&self, change: &NewChange) -> Result<i64>;

    /// Diff two field snapshots and append one `update` entry per changed field
    ///
    /// Returns the number of entries written.
    fn record_field_changes(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        project_id: Option<&str>,
        old: &Value,
        new: &Value,
        tracked_fields: &[&str],
    ) -> Result<usize>;

    /// All entries for one entity, newest first
    fn entity_history(&self, entity_type: EntityType, entity_id: &str)
        -> Result<Vec<ChangeLogEntry>>;

    /// All entries touching a project, newest first
    fn project_history(&self, project_id: &str) -> Result<Vec<ChangeLogEntry>>;

    /// All entries not yet pushed, in insertion order
    fn unsynced(&self) -> Result<Vec<ChangeLogEntry>>;

    /// Number of entries not yet pushed
    fn unsynced_count(&self) -> Result<usize>;

    /// All entries recorded after the given timestamp (Unix ms), oldest first
    fn since(&self, timestamp_ms: i64) -> Result<Vec<ChangeLogEntry>>;

    /// Flag exactly the given rows as synced
    fn mark_synced(&self, ids: &[i64]) -> Result<usize>;
}

/// `SQLite` implementation of `ChangeLogRepository`
pub struct SqliteChangeLogRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteChangeLogRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse an entry from a database row
    fn parse_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChangeLogEntry> {
        Ok(ChangeLogEntry {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            user_id: row.get(2)?,
            device_id: row.get(3)?,
            session_id: row.get(4)?,
            entity_type: row.get(5)?,
            entity_id: row.get(6)?,
            project_id: row.get(7)?,
            action: row.get(8)?,
            field: row.get(9)?,
            old_value: row.get(10)?,
            new_value: row.get(11)?,
            synced: row.get::<_, i32>(12)? != 0,
        })
    }

    fn query(&self, filter: &str, args: impl rusqlite::Params) -> Result<Vec<ChangeLogEntry>> {
        let mut stmt = self.conn.prepare(&format!("{SELECT_COLUMNS} {filter}"))?;
        let entries = stmt
            .query_map(args, Self::parse_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }
}

impl ChangeLogRepository for SqliteChangeLogRepository<'_> {
    fn record(&self, change: &NewChange) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO change_log
                (timestamp, user_id, device_id, session_id, entity_type, entity_id,
                 project_id, action, field, old_value, new_value, synced)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                unix_millis_now(),
                change.user_id,
                change.device_id,
                change.session_id,
                change.entity_type,
                change.entity_id,
                change.project_id,
                change.action,
                change.field,
                change.old_value,
                change.new_value,
                i32::from(change.synced),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn record_field_changes(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        project_id: Option<&str>,
        old: &Value,
        new: &Value,
        tracked_fields: &[&str],
    ) -> Result<usize> {
        let mut written = 0;
        for field in tracked_fields {
            let old_value = old.get(*field).unwrap_or(&Value::Null);
            let new_value = new.get(*field).unwrap_or(&Value::Null);
            if old_value == new_value {
                continue;
            }

            let mut change = NewChange::new(entity_type, entity_id, ChangeAction::Update)
                .field(*field)
                .old_json(old_value)
                .new_json(new_value);
            change.project_id = project_id.map(str::to_string);
            self.record(&change)?;
            written += 1;
        }
        Ok(written)
    }

    fn entity_history(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<Vec<ChangeLogEntry>> {
        self.query(
            "WHERE entity_type = ? AND entity_id = ? ORDER BY id DESC",
            params![entity_type, entity_id],
        )
    }

    fn project_history(&self, project_id: &str) -> Result<Vec<ChangeLogEntry>> {
        self.query("WHERE project_id = ? ORDER BY id DESC", params![project_id])
    }

    fn unsynced(&self) -> Result<Vec<ChangeLogEntry>> {
        self.query("WHERE synced = 0 ORDER BY id ASC", [])
    }

    fn unsynced_count(&self) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM change_log WHERE synced = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn since(&self, timestamp_ms: i64) -> Result<Vec<ChangeLogEntry>> {
        self.query(
            "WHERE timestamp > ? ORDER BY id ASC",
            params![timestamp_ms],
        )
    }

    fn mark_synced(&self, ids: &[i64]) -> Result<usize> {
        let mut updated = 0;
        // Stay well below SQLite's bound-parameter limit
        for chunk in ids.chunks(500) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            updated += self.conn.execute(
                &format!("UPDATE change_log SET synced = 1 WHERE synced = 0 AND id IN ({placeholders})"),
                params_from_iter(chunk.iter()),
            )?;
        }
        Ok(updated)
    }
}
