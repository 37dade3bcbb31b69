//! Connection and conflict store implementation

use crate::error::{Error, Result};
use crate::models::{
    ConflictId, ConflictStatus, ConnectionId, NewConflict, NewConnection, Resolution,
    SyncConflict, SyncConnection,
};
use crate::util::unix_millis_now;
use rusqlite::{params, Connection, OptionalExtension};

const CONNECTION_COLUMNS: &str = "SELECT id, server_url, workspace_id, workspace_name, client_id,
        join_key, sync_strategy, current_version, last_synced_version, is_active,
        created_at, updated_at
     FROM sync_connections";

const CONFLICT_COLUMNS: &str = "SELECT id, connection_id, diff_id, entity, entity_id, field,
        client_value, server_value, reason, status, resolution, created_at, resolved_at
     FROM sync_conflicts";

/// Trait for workspace connection and conflict bookkeeping
pub trait SyncRepository {
    /// All connections, newest first
    fn connections(&self) -> Result<Vec<SyncConnection>>;

    /// Active connections, newest first
    fn active_connections(&self) -> Result<Vec<SyncConnection>>;

    /// Get a connection by ID
    fn connection(&self, id: &ConnectionId) -> Result<Option<SyncConnection>>;

    /// Get the connection for a remote workspace
    fn connection_by_workspace(&self, workspace_id: &str) -> Result<Option<SyncConnection>>;

    /// Persist a freshly joined workspace as the active connection
    fn create_connection(&self, connection: &NewConnection) -> Result<SyncConnection>;

    /// Refresh an existing connection with a new membership and reactivate it
    fn refresh_connection(
        &self,
        id: &ConnectionId,
        membership: &NewConnection,
    ) -> Result<SyncConnection>;

    /// Deactivate every active connection except the given one
    fn deactivate_others(&self, keep: &ConnectionId) -> Result<usize>;

    /// Flip the active flag
    fn set_active(&self, id: &ConnectionId, active: bool) -> Result<()>;

    /// Advance versions, never moving either one backwards
    ///
    /// `current_version` always ends up at least as large as `last_synced_version`.
    fn advance_versions(
        &self,
        id: &ConnectionId,
        current_version: i64,
        last_synced_version: Option<i64>,
    ) -> Result<SyncConnection>;

    /// Store the merge strategy reported by the server
    fn set_sync_strategy(&self, id: &ConnectionId, strategy: &str) -> Result<()>;

    /// Delete a connection and all of its conflicts
    fn delete_connection(&self, id: &ConnectionId) -> Result<bool>;

    /// Record a pending conflict; `None` when the diff was already recorded
    fn record_conflict(
        &self,
        connection_id: &ConnectionId,
        conflict: &NewConflict,
    ) -> Result<Option<SyncConflict>>;

    /// Conflicts, optionally filtered by connection and status, newest first
    fn conflicts(
        &self,
        connection_id: Option<&ConnectionId>,
        status: Option<ConflictStatus>,
    ) -> Result<Vec<SyncConflict>>;

    /// Get a conflict by ID
    fn conflict(&self, id: &ConflictId) -> Result<Option<SyncConflict>>;

    /// Mark a pending conflict resolved
    fn resolve_conflict(&self, id: &ConflictId, resolution: Resolution) -> Result<SyncConflict>;

    /// Number of pending conflicts of a connection
    fn pending_conflict_count(&self, connection_id: &ConnectionId) -> Result<usize>;
}

/// `SQLite` implementation of `SyncRepository`
pub struct SqliteSyncRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteSyncRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_connection(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncConnection> {
        Ok(SyncConnection {
            id: row.get(0)?,
            server_url: row.get(1)?,
            workspace_id: row.get(2)?,
            workspace_name: row.get(3)?,
            client_id: row.get(4)?,
            join_key: row.get(5)?,
            sync_strategy: row.get(6)?,
            current_version: row.get(7)?,
            last_synced_version: row.get(8)?,
            is_active: row.get::<_, i32>(9)? != 0,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }

    fn parse_conflict(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncConflict> {
        Ok(SyncConflict {
            id: row.get(0)?,
            connection_id: row.get(1)?,
            diff_id: row.get(2)?,
            entity: row.get(3)?,
            entity_id: row.get(4)?,
            field: row.get(5)?,
            client_value: row.get(6)?,
            server_value: row.get(7)?,
            reason: row.get(8)?,
            status: row.get(9)?,
            resolution: row.get(10)?,
            created_at: row.get(11)?,
            resolved_at: row.get(12)?,
        })
    }

    fn require_connection(&self, id: &ConnectionId) -> Result<SyncConnection> {
        self.connection(id)?
            .ok_or_else(|| Error::NotFound(format!("connection {id}")))
    }

    fn query_connections(&self, filter: &str) -> Result<Vec<SyncConnection>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{CONNECTION_COLUMNS} {filter}"))?;
        let connections = stmt
            .query_map([], Self::parse_connection)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(connections)
    }
}

impl SyncRepository for SqliteSyncRepository<'_> {
    fn connections(&self) -> Result<Vec<SyncConnection>> {
        self.query_connections("ORDER BY created_at DESC, id DESC")
    }

    fn active_connections(&self) -> Result<Vec<SyncConnection>> {
        self.query_connections("WHERE is_active = 1 ORDER BY created_at DESC, id DESC")
    }

    fn connection(&self, id: &ConnectionId) -> Result<Option<SyncConnection>> {
        let connection = self
            .conn
            .query_row(
                &format!("{CONNECTION_COLUMNS} WHERE id = ?"),
                params![id],
                Self::parse_connection,
            )
            .optional()?;
        Ok(connection)
    }

    fn connection_by_workspace(&self, workspace_id: &str) -> Result<Option<SyncConnection>> {
        let connection = self
            .conn
            .query_row(
                &format!("{CONNECTION_COLUMNS} WHERE workspace_id = ?"),
                params![workspace_id],
                Self::parse_connection,
            )
            .optional()?;
        Ok(connection)
    }

    fn create_connection(&self, connection: &NewConnection) -> Result<SyncConnection> {
        let id = ConnectionId::new();
        let now = unix_millis_now();
        let current_version = connection.current_version.max(0);

        self.conn.execute(
            "INSERT INTO sync_connections
                (id, server_url, workspace_id, workspace_name, client_id, join_key,
                 sync_strategy, current_version, last_synced_version, is_active,
                 created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, 1, ?, ?)",
            params![
                id,
                connection.server_url,
                connection.workspace_id,
                connection.workspace_name,
                connection.client_id,
                connection.join_key,
                connection.sync_strategy,
                current_version,
                now,
                now
            ],
        )?;

        self.require_connection(&id)
    }

    fn refresh_connection(
        &self,
        id: &ConnectionId,
        membership: &NewConnection,
    ) -> Result<SyncConnection> {
        let changed = self.conn.execute(
            "UPDATE sync_connections SET
                server_url = ?, workspace_name = ?, client_id = ?, join_key = ?,
                sync_strategy = ?, current_version = MAX(current_version, ?),
                is_active = 1, updated_at = ?
             WHERE id = ?",
            params![
                membership.server_url,
                membership.workspace_name,
                membership.client_id,
                membership.join_key,
                membership.sync_strategy,
                membership.current_version,
                unix_millis_now(),
                id
            ],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("connection {id}")));
        }
        self.require_connection(id)
    }

    fn deactivate_others(&self, keep: &ConnectionId) -> Result<usize> {
        let changed = self.conn.execute(
            "UPDATE sync_connections SET is_active = 0, updated_at = ?
             WHERE is_active = 1 AND id != ?",
            params![unix_millis_now(), keep],
        )?;
        Ok(changed)
    }

    fn set_active(&self, id: &ConnectionId, active: bool) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE sync_connections SET is_active = ?, updated_at = ? WHERE id = ?",
            params![i32::from(active), unix_millis_now(), id],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("connection {id}")));
        }
        Ok(())
    }

    fn advance_versions(
        &self,
        id: &ConnectionId,
        current_version: i64,
        last_synced_version: Option<i64>,
    ) -> Result<SyncConnection> {
        // SET expressions all see the old row, so current is bumped by the new last too
        let changed = self.conn.execute(
            "UPDATE sync_connections SET
                current_version = MAX(current_version, ?1, COALESCE(?2, 0)),
                last_synced_version = MAX(last_synced_version, COALESCE(?2, last_synced_version)),
                updated_at = ?3
             WHERE id = ?4",
            params![current_version, last_synced_version, unix_millis_now(), id],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("connection {id}")));
        }
        self.require_connection(id)
    }

    fn set_sync_strategy(&self, id: &ConnectionId, strategy: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE sync_connections SET sync_strategy = ?, updated_at = ?
             WHERE id = ? AND sync_strategy != ?",
            params![strategy, unix_millis_now(), id, strategy],
        )?;
        Ok(())
    }

    fn delete_connection(&self, id: &ConnectionId) -> Result<bool> {
        self.conn.execute(
            "DELETE FROM sync_conflicts WHERE connection_id = ?",
            params![id],
        )?;
        let removed = self
            .conn
            .execute("DELETE FROM sync_connections WHERE id = ?", params![id])?;
        Ok(removed > 0)
    }

    fn record_conflict(
        &self,
        connection_id: &ConnectionId,
        conflict: &NewConflict,
    ) -> Result<Option<SyncConflict>> {
        let id = ConflictId::new();
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO sync_conflicts
                (id, connection_id, diff_id, entity, entity_id, field, client_value,
                 server_value, reason, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                id,
                connection_id,
                conflict.diff_id,
                conflict.entity,
                conflict.entity_id,
                conflict.field,
                conflict.client_value,
                conflict.server_value,
                conflict.reason,
                ConflictStatus::Pending,
                unix_millis_now()
            ],
        )?;
        if inserted == 0 {
            return Ok(None);
        }
        self.conflict(&id)
    }

    fn conflicts(
        &self,
        connection_id: Option<&ConnectionId>,
        status: Option<ConflictStatus>,
    ) -> Result<Vec<SyncConflict>> {
        let mut stmt = self.conn.prepare(&format!(
            "{CONFLICT_COLUMNS}
             WHERE (?1 IS NULL OR connection_id = ?1)
               AND (?2 IS NULL OR status = ?2)
             ORDER BY created_at DESC, id DESC"
        ))?;
        let conflicts = stmt
            .query_map(params![connection_id, status], Self::parse_conflict)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(conflicts)
    }

    fn conflict(&self, id: &ConflictId) -> Result<Option<SyncConflict>> {
        let conflict = self
            .conn
            .query_row(
                &format!("{CONFLICT_COLUMNS} WHERE id = ?"),
                params![id],
                Self::parse_conflict,
            )
            .optional()?;
        Ok(conflict)
    }

    fn resolve_conflict(&self, id: &ConflictId, resolution: Resolution) -> Result<SyncConflict> {
        let existing = self
            .conflict(id)?
            .ok_or_else(|| Error::NotFound(format!("conflict {id}")))?;
        if existing.status == ConflictStatus::Resolved {
            return Err(Error::InvalidInput(format!(
                "Conflict {id} is already resolved"
            )));
        }

        self.conn.execute(
            "UPDATE sync_conflicts SET status = ?, resolution = ?, resolved_at = ? WHERE id = ?",
            params![
                ConflictStatus::Resolved,
                resolution,
                unix_millis_now(),
                id
            ],
        )?;
        self.conflict(id)?
            .ok_or_else(|| Error::NotFound(format!("conflict {id}")))
    }

    fn pending_conflict_count(&self, connection_id: &ConnectionId) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sync_conflicts WHERE connection_id = ? AND status = ?",
            params![connection_id, ConflictStatus::Pending],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::DEFAULT_SYNC_STRATEGY;
    use pretty_assertions::assert_eq;

    fn setup() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn membership(workspace_id: &str) -> NewConnection {
        NewConnection {
            server_url: "http://localhost:3000".into(),
            workspace_id: workspace_id.into(),
            workspace_name: "Team".into(),
            client_id: "client-1".into(),
            join_key: "KEY-1".into(),
            sync_strategy: DEFAULT_SYNC_STRATEGY.into(),
            current_version: 4,
        }
    }

    fn conflict(diff_id: &str) -> NewConflict {
        NewConflict {
            diff_id: diff_id.into(),
            entity: "task".into(),
            entity_id: "t1".into(),
            field: Some("title".into()),
            client_value: Some("\"B\"".into()),
            server_value: None,
            reason: "version-mismatch".into(),
        }
    }

    #[test]
    fn test_create_connection_starts_active_and_unsynced() {
        let db = setup();
        let repo = SqliteSyncRepository::new(db.connection());

        let connection = repo.create_connection(&membership("ws-1")).unwrap();
        assert!(connection.is_active);
        assert_eq!(connection.current_version, 4);
        assert_eq!(connection.last_synced_version, 0);

        let found = repo.connection_by_workspace("ws-1").unwrap().unwrap();
        assert_eq!(found, connection);
    }

    #[test]
    fn test_advance_versions_is_monotonic() {
        let db = setup();
        let repo = SqliteSyncRepository::new(db.connection());
        let connection = repo.create_connection(&membership("ws-1")).unwrap();

        let advanced = repo.advance_versions(&connection.id, 9, Some(7)).unwrap();
        assert_eq!(advanced.current_version, 9);
        assert_eq!(advanced.last_synced_version, 7);

        let stale = repo.advance_versions(&connection.id, 3, Some(2)).unwrap();
        assert_eq!(stale.current_version, 9);
        assert_eq!(stale.last_synced_version, 7);

        let ahead = repo.advance_versions(&connection.id, 5, Some(12)).unwrap();
        assert_eq!(ahead.last_synced_version, 12);
        assert_eq!(ahead.current_version, 12);
    }

    #[test]
    fn test_refresh_connection_reactivates() {
        let db = setup();
        let repo = SqliteSyncRepository::new(db.connection());
        let connection = repo.create_connection(&membership("ws-1")).unwrap();
        repo.set_active(&connection.id, false).unwrap();

        let mut fresh = membership("ws-1");
        fresh.client_id = "client-2".into();
        fresh.current_version = 2;
        let refreshed = repo.refresh_connection(&connection.id, &fresh).unwrap();

        assert!(refreshed.is_active);
        assert_eq!(refreshed.client_id, "client-2");
        assert_eq!(refreshed.current_version, 4);
    }

    #[test]
    fn test_deactivate_others() {
        let db = setup();
        let repo = SqliteSyncRepository::new(db.connection());
        let first = repo.create_connection(&membership("ws-1")).unwrap();
        let second = repo.create_connection(&membership("ws-2")).unwrap();

        assert_eq!(repo.deactivate_others(&second.id).unwrap(), 1);
        let active = repo.active_connections().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, second.id);
        assert!(!repo.connection(&first.id).unwrap().unwrap().is_active);
    }

    #[test]
    fn test_record_conflict_deduplicates_by_diff_id() {
        let db = setup();
        let repo = SqliteSyncRepository::new(db.connection());
        let connection = repo.create_connection(&membership("ws-1")).unwrap();

        assert!(repo
            .record_conflict(&connection.id, &conflict("d1"))
            .unwrap()
            .is_some());
        assert!(repo
            .record_conflict(&connection.id, &conflict("d1"))
            .unwrap()
            .is_none());
        assert_eq!(repo.pending_conflict_count(&connection.id).unwrap(), 1);
    }

    #[test]
    fn test_resolve_conflict_keeps_row() {
        let db = setup();
        let repo = SqliteSyncRepository::new(db.connection());
        let connection = repo.create_connection(&membership("ws-1")).unwrap();
        let recorded = repo
            .record_conflict(&connection.id, &conflict("d1"))
            .unwrap()
            .unwrap();

        let resolved = repo
            .resolve_conflict(&recorded.id, Resolution::Accept)
            .unwrap();
        assert_eq!(resolved.status, ConflictStatus::Resolved);
        assert_eq!(resolved.resolution, Some(Resolution::Accept));
        assert!(resolved.resolved_at.is_some());
        assert_eq!(repo.pending_conflict_count(&connection.id).unwrap(), 0);
        assert_eq!(
            repo.conflicts(Some(&connection.id), Some(ConflictStatus::Resolved))
                .unwrap()
                .len(),
            1
        );
        assert!(repo
            .resolve_conflict(&recorded.id, Resolution::Reject)
            .is_err());
    }

    #[test]
    fn test_delete_connection_removes_conflicts() {
        let db = setup();
        let repo = SqliteSyncRepository::new(db.connection());
        let connection = repo.create_connection(&membership("ws-1")).unwrap();
        repo.record_conflict(&connection.id, &conflict("d1"))
            .unwrap();

        assert!(repo.delete_connection(&connection.id).unwrap());
        assert!(repo.connection(&connection.id).unwrap().is_none());
        assert!(repo.conflicts(None, None).unwrap().is_empty());
    }
}
