//! Database migrations

use crate::error::Result;
use rusqlite::{Connection, OptionalExtension};

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub fn run(conn: &mut Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        apply(conn, 1, MIGRATION_V1)?;
    }
    if version < 2 {
        apply(conn, 2, MIGRATION_V2)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(version.unwrap_or(0))
}

/// Run one migration script and record its version atomically
fn apply(conn: &mut Connection, version: i32, script: &str) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(script)?;
    tx.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    tx.commit()?;

    tracing::info!("Migrated database to version {version} (latest {CURRENT_VERSION})");
    Ok(())
}

/// Version 1: local board store and change log
const MIGRATION_V1: &str = "
    CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER PRIMARY KEY
    );

    CREATE TABLE IF NOT EXISTS projects (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        color TEXT NOT NULL DEFAULT 'orange',
        sort_order INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS columns (
        id TEXT NOT NULL,
        project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        label TEXT NOT NULL,
        is_done INTEGER NOT NULL DEFAULT 0,
        sort_order INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        PRIMARY KEY (id, project_id)
    );

    CREATE TABLE IF NOT EXISTS tasks (
        id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        status TEXT NOT NULL DEFAULT 'backlog',
        title TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        priority TEXT NOT NULL DEFAULT 'medium',
        avatar TEXT NOT NULL DEFAULT '',
        avatar_color TEXT NOT NULL DEFAULT 'blue',
        due_date TEXT,
        due_time TEXT,
        duration TEXT,
        progress INTEGER NOT NULL DEFAULT 0,
        tags TEXT NOT NULL DEFAULT '[]',
        checklist TEXT NOT NULL DEFAULT '[]',
        sort_order INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_tasks_project_status ON tasks(project_id, status);

    CREATE TABLE IF NOT EXISTS change_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp INTEGER NOT NULL,
        user_id TEXT NOT NULL DEFAULT 'local',
        device_id TEXT NOT NULL DEFAULT 'local',
        session_id TEXT,
        entity_type TEXT NOT NULL,
        entity_id TEXT NOT NULL,
        project_id TEXT,
        action TEXT NOT NULL,
        field TEXT,
        old_value TEXT,
        new_value TEXT,
        synced INTEGER NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS idx_change_log_entity ON change_log(entity_type, entity_id);
    CREATE INDEX IF NOT EXISTS idx_change_log_project ON change_log(project_id);
    CREATE INDEX IF NOT EXISTS idx_change_log_synced ON change_log(synced);
    CREATE INDEX IF NOT EXISTS idx_change_log_timestamp ON change_log(timestamp);
";

/// Version 2: workspace connections and conflict bookkeeping
const MIGRATION_V2: &str = "
    CREATE TABLE IF NOT EXISTS sync_connections (
        id TEXT PRIMARY KEY,
        server_url TEXT NOT NULL,
        workspace_id TEXT NOT NULL UNIQUE,
        workspace_name TEXT NOT NULL,
        client_id TEXT NOT NULL,
        join_key TEXT NOT NULL,
        sync_strategy TEXT NOT NULL DEFAULT 'auto-merge',
        current_version INTEGER NOT NULL DEFAULT 0,
        last_synced_version INTEGER NOT NULL DEFAULT 0,
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS sync_conflicts (
        id TEXT PRIMARY KEY,
        connection_id TEXT NOT NULL REFERENCES sync_connections(id) ON DELETE CASCADE,
        diff_id TEXT NOT NULL,
        entity TEXT NOT NULL,
        entity_id TEXT NOT NULL,
        field TEXT,
        client_value TEXT,
        server_value TEXT,
        reason TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        resolution TEXT,
        created_at INTEGER NOT NULL,
        resolved_at INTEGER,
        UNIQUE (connection_id, diff_id)
    );
    CREATE INDEX IF NOT EXISTS idx_sync_conflicts_status ON sync_conflicts(connection_id, status);
";

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name=?1)",
            [name],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn test_migrations() {
        let mut conn = setup();
        run(&mut conn).unwrap();

        let version = get_version(&conn).unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_migrations_idempotent() {
        let mut conn = setup();
        run(&mut conn).unwrap();
        run(&mut conn).unwrap();

        let version = get_version(&conn).unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_migrations_create_store_and_sync_tables() {
        let mut conn = setup();
        run(&mut conn).unwrap();

        for table in [
            "projects",
            "columns",
            "tasks",
            "change_log",
            "sync_connections",
            "sync_conflicts",
        ] {
            assert!(table_exists(&conn, table), "missing table {table}");
        }
    }
}
