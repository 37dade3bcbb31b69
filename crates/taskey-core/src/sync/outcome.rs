//! Structured results of sync operations.
//!
//! Sync operations never return errors to callers; failures come back as an
//! outcome with `success: false` and a message.

use serde::Serialize;

use crate::models::ConnectionId;
use crate::state::ConnectionState;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinOutcome {
    pub success: bool,
    pub message: Option<String>,
    pub connection_id: Option<ConnectionId>,
    pub workspace_name: Option<String>,
    /// An already active connection to the workspace was reused
    pub reused: bool,
}

impl JoinOutcome {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateKeyOutcome {
    pub valid: bool,
    pub message: Option<String>,
    pub workspace_id: Option<String>,
    pub workspace_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushOutcome {
    pub success: bool,
    pub message: Option<String>,
    /// Change log rows sent (and marked synced)
    pub pushed: usize,
    pub accepted: u64,
    pub rejected: u64,
    pub conflicts: u64,
    pub auto_resolved: u64,
    /// Conflicts newly recorded locally
    pub conflicts_recorded: usize,
    pub current_version: i64,
}

impl PushOutcome {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullOutcome {
    pub success: bool,
    pub message: Option<String>,
    pub up_to_date: bool,
    pub applied: usize,
    pub skipped: usize,
    pub snapshot_applied: bool,
    pub conflicts_recorded: usize,
    pub current_version: i64,
    pub last_synced_version: i64,
}

impl PullOutcome {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FullSyncOutcome {
    pub success: bool,
    pub message: Option<String>,
    pub applied: usize,
    pub skipped: usize,
    pub conflicts_recorded: usize,
    pub version: i64,
}

impl FullSyncOutcome {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatOutcome {
    pub success: bool,
    pub message: Option<String>,
    pub current_version: i64,
    pub has_pending_updates: bool,
    /// Conflicts the server still holds for this client
    pub pending_conflicts: u64,
    /// Pull triggered by pending updates
    pub pull: Option<PullOutcome>,
}

impl HeartbeatOutcome {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }
}

/// Snapshot of the engine for front ends
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub state: ConnectionState,
    pub connected: bool,
    pub connection_id: Option<ConnectionId>,
    pub server_url: Option<String>,
    pub workspace_name: Option<String>,
    pub client_id: Option<String>,
    pub current_version: i64,
    pub last_synced_version: i64,
    pub sync_strategy: Option<String>,
    pub pending_push_count: usize,
    pub pending_conflicts: usize,
    pub is_online: bool,
    pub scheduling: bool,
    /// RFC 3339 times of the last successful exchanges
    pub last_heartbeat: Option<String>,
    pub last_push: Option<String>,
    pub last_pull: Option<String>,
}
