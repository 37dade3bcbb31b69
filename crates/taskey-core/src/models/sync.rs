//! Workspace connection and sync conflict models

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ids::{ConflictId, ConnectionId};
use crate::error::Error;

/// Strategy assumed until the server reports one
pub const DEFAULT_SYNC_STRATEGY: &str = "auto-merge";

/// A persisted membership in a remote workspace
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConnection {
    pub id: ConnectionId,
    pub server_url: String,
    pub workspace_id: String,
    pub workspace_name: String,
    /// Client id assigned by the server on join
    pub client_id: String,
    pub join_key: String,
    /// Server-side merge strategy (`auto-merge`, `last-writer-wins`, ...)
    pub sync_strategy: String,
    /// Latest workspace version the server reported
    pub current_version: i64,
    /// Latest workspace version fully applied locally
    pub last_synced_version: i64,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl fmt::Debug for SyncConnection {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SyncConnection")
            .field("id", &self.id)
            .field("server_url", &self.server_url)
            .field("workspace_id", &self.workspace_id)
            .field("workspace_name", &self.workspace_name)
            .field("client_id", &self.client_id)
            .field("join_key", &"[REDACTED]")
            .field("sync_strategy", &self.sync_strategy)
            .field("current_version", &self.current_version)
            .field("last_synced_version", &self.last_synced_version)
            .field("is_active", &self.is_active)
            .finish_non_exhaustive()
    }
}

/// Fields needed to persist a freshly joined workspace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewConnection {
    pub server_url: String,
    pub workspace_id: String,
    pub workspace_name: String,
    pub client_id: String,
    pub join_key: String,
    pub sync_strategy: String,
    pub current_version: i64,
}

/// Lifecycle of a conflict: `pending → resolved`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStatus {
    Pending,
    Resolved,
}

impl ConflictStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Resolved => "resolved",
        }
    }
}

impl FromStr for ConflictStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "resolved" => Ok(Self::Resolved),
            other => Err(Error::InvalidInput(format!(
                "Unknown conflict status: {other}"
            ))),
        }
    }
}

/// How the user settled a conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// Keep the server's value
    Accept,
    /// Keep the local value
    Reject,
}

impl Resolution {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Reject => "reject",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "accept" => Ok(Self::Accept),
            "reject" => Ok(Self::Reject),
            other => Err(Error::InvalidInput(format!(
                "Resolution must be 'accept' or 'reject', got '{other}'"
            ))),
        }
    }
}

impl ToSql for ConflictStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ConflictStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|error: Error| FromSqlError::Other(Box::new(error)))
    }
}

impl ToSql for Resolution {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Resolution {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|error: Error| FromSqlError::Other(Box::new(error)))
    }
}

/// A recorded collision between a local diff and the workspace state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConflict {
    pub id: ConflictId,
    pub connection_id: ConnectionId,
    /// Server-side id of the diff that collided
    pub diff_id: String,
    /// Entity kind as reported by the server
    pub entity: String,
    pub entity_id: String,
    pub field: Option<String>,
    /// JSON text of the value this client tried to write
    pub client_value: Option<String>,
    /// JSON text of the value the server holds
    pub server_value: Option<String>,
    pub reason: String,
    pub status: ConflictStatus,
    pub resolution: Option<Resolution>,
    pub created_at: i64,
    pub resolved_at: Option<i64>,
}

/// Fields needed to record a conflict
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewConflict {
    pub diff_id: String,
    pub entity: String,
    pub entity_id: String,
    pub field: Option<String>,
    pub client_value: Option<String>,
    pub server_value: Option<String>,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_parses_user_input() {
        assert_eq!(" Accept ".parse::<Resolution>().unwrap(), Resolution::Accept);
        assert_eq!("reject".parse::<Resolution>().unwrap(), Resolution::Reject);
        assert!("merge".parse::<Resolution>().is_err());
    }

    #[test]
    fn connection_debug_redacts_join_key() {
        let connection = SyncConnection {
            id: ConnectionId::new(),
            server_url: "http://localhost:3000".into(),
            workspace_id: "ws-1".into(),
            workspace_name: "Team".into(),
            client_id: "client-1".into(),
            join_key: "SECRET-KEY".into(),
            sync_strategy: DEFAULT_SYNC_STRATEGY.into(),
            current_version: 0,
            last_synced_version: 0,
            is_active: true,
            created_at: 0,
            updated_at: 0,
        };
        let debug = format!("{connection:?}");
        assert!(!debug.contains("SECRET-KEY"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn conflict_status_roundtrips_as_text() {
        for status in [ConflictStatus::Pending, ConflictStatus::Resolved] {
            assert_eq!(status.as_str().parse::<ConflictStatus>().unwrap(), status);
        }
    }
}
