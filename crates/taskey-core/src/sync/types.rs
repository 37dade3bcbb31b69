//! Wire types of the workspace sync protocol.
//!
//! Servers are loose about spelling (camelCase or snake_case, flags as `0/1`,
//! timestamps as Unix ms or RFC 3339, JSON arrays as text). Everything is
//! normalized here so the rest of the engine only sees one shape.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::SyncError;
use crate::models::{ChangeAction, EntityType, NewConflict, DEFAULT_SYNC_STRATEGY};
use crate::util::{normalize_text_option, rfc3339_to_millis};

/// Entity kinds the protocol knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncEntity {
    Task,
    Project,
    Column,
    Label,
    Comment,
    /// Anything newer than this client understands
    #[serde(other)]
    Unknown,
}

impl SyncEntity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Project => "project",
            Self::Column => "column",
            Self::Label => "label",
            Self::Comment => "comment",
            Self::Unknown => "unknown",
        }
    }

    /// Local entity type, when the local store keeps this kind
    pub const fn entity_type(self) -> Option<EntityType> {
        match self {
            Self::Task => Some(EntityType::Task),
            Self::Project => Some(EntityType::Project),
            Self::Column => Some(EntityType::Column),
            Self::Label | Self::Comment | Self::Unknown => None,
        }
    }
}

impl From<EntityType> for SyncEntity {
    fn from(value: EntityType) -> Self {
        match value {
            EntityType::Project => Self::Project,
            EntityType::Column => Self::Column,
            EntityType::Task => Self::Task,
        }
    }
}

/// Mutation kinds on the wire; local `move` travels as a status `update`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    Create,
    Update,
    Delete,
    #[serde(other)]
    Unknown,
}

impl SyncAction {
    pub const fn change_action(self) -> Option<ChangeAction> {
        match self {
            Self::Create => Some(ChangeAction::Create),
            Self::Update => Some(ChangeAction::Update),
            Self::Delete => Some(ChangeAction::Delete),
            Self::Unknown => None,
        }
    }
}

/// One field-level change exchanged with the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffData {
    pub entity: SyncEntity,
    #[serde(alias = "entity_id")]
    pub entity_id: String,
    pub action: SyncAction,
    /// Updated field; `None` for create and delete
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default, alias = "old_value")]
    pub old_value: Value,
    /// Full object for create, field value for update, null for delete
    #[serde(default, alias = "new_value")]
    pub new_value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushDiffItem {
    pub base_version: i64,
    pub data: DiffData,
    /// RFC 3339 time the change was made locally
    pub client_timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    pub client_id: String,
    pub diffs: Vec<PushDiffItem>,
}

/// A pushed diff the server refused to merge
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictDetail {
    #[serde(alias = "diff_id")]
    pub diff_id: String,
    #[serde(default)]
    pub reason: String,
    pub data: DiffData,
    #[serde(default, alias = "server_version")]
    pub server_version: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub accepted: u64,
    #[serde(default)]
    pub rejected: u64,
    #[serde(default)]
    pub conflicts: u64,
    #[serde(default, alias = "auto_resolved")]
    pub auto_resolved: u64,
    #[serde(default, alias = "conflict_details", deserialize_with = "null_as_default")]
    pub conflict_details: Vec<ConflictDetail>,
    #[serde(default, alias = "current_version")]
    pub current_version: i64,
    #[serde(default)]
    pub strategy: Option<String>,
}

/// A diff already merged on the server, in version order
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullDiffItem {
    pub id: String,
    pub data: DiffData,
    #[serde(default, alias = "applied_version")]
    pub applied_version: i64,
    #[serde(default, alias = "client_timestamp")]
    pub client_timestamp: Option<String>,
    #[serde(default, alias = "server_timestamp")]
    pub server_timestamp: Option<String>,
}

/// Raw snapshot rows keyed by entity id.
///
/// Rows stay untyped until the consumer applies them, so one malformed row
/// is skipped instead of failing the whole response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SnapshotData {
    #[serde(alias = "project", deserialize_with = "null_as_default")]
    pub projects: BTreeMap<String, Value>,
    #[serde(alias = "column", deserialize_with = "null_as_default")]
    pub columns: BTreeMap<String, Value>,
    #[serde(alias = "task", deserialize_with = "null_as_default")]
    pub tasks: BTreeMap<String, Value>,
}

impl SnapshotData {
    pub fn is_empty(&self) -> bool {
        self.projects.is_empty() && self.columns.is_empty() && self.tasks.is_empty()
    }
}

/// Full workspace state at one version
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub version: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: SnapshotData,
    #[serde(default, alias = "created_at")]
    pub created_at: Option<String>,
    #[serde(default, alias = "applied_diff_ids", deserialize_with = "null_as_default")]
    pub applied_diff_ids: Vec<String>,
}

/// A collision the server is still waiting on someone to resolve
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingConflict {
    #[serde(alias = "diff_id")]
    pub diff_id: String,
    pub data: DiffData,
    #[serde(default)]
    pub reason: String,
    #[serde(default, alias = "client_timestamp")]
    pub client_timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, alias = "up_to_date")]
    pub up_to_date: bool,
    #[serde(default, alias = "current_version")]
    pub current_version: i64,
    #[serde(default, alias = "from_version")]
    pub from_version: i64,
    #[serde(default, alias = "sync_strategy")]
    pub sync_strategy: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub diffs: Vec<PullDiffItem>,
    #[serde(default)]
    pub snapshot: Option<Snapshot>,
    #[serde(default, alias = "pending_conflicts", deserialize_with = "null_as_default")]
    pub pending_conflicts: Vec<PendingConflict>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullSyncResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, alias = "workspace_id")]
    pub workspace_id: Option<String>,
    #[serde(default, alias = "workspace_name")]
    pub workspace_name: Option<String>,
    #[serde(default, alias = "current_version")]
    pub current_version: i64,
    #[serde(default, alias = "sync_strategy")]
    pub sync_strategy: Option<String>,
    #[serde(default)]
    pub snapshot: Option<Snapshot>,
    #[serde(default, alias = "pending_conflicts", deserialize_with = "null_as_default")]
    pub pending_conflicts: Vec<PendingConflict>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, alias = "current_version")]
    pub current_version: i64,
    #[serde(default, alias = "last_synced_version")]
    pub last_synced_version: Option<i64>,
    #[serde(default, alias = "has_pending_updates", deserialize_with = "lenient_bool_or_false")]
    pub has_pending_updates: bool,
    #[serde(default, alias = "pending_conflicts")]
    pub pending_conflicts: u64,
    #[serde(default, alias = "sync_strategy")]
    pub sync_strategy: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub join_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateKeyRequest {
    pub join_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorkspaceSummary {
    #[serde(alias = "workspace_id", alias = "workspaceId")]
    pub id: String,
    #[serde(default, alias = "workspace_name", alias = "workspaceName")]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ValidateKeyResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub workspace: Option<WorkspaceSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinedWorkspace {
    #[serde(alias = "workspace_id", alias = "workspaceId")]
    pub id: String,
    #[serde(default, alias = "workspace_name", alias = "workspaceName")]
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "current_version")]
    pub current_version: i64,
    #[serde(default, alias = "sync_strategy")]
    pub sync_strategy: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinedClient {
    #[serde(alias = "client_id", alias = "id")]
    pub client_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JoinResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub workspace: Option<JoinedWorkspace>,
    #[serde(default)]
    pub client: Option<JoinedClient>,
}

/// Workspace membership granted by a successful join
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub workspace_id: String,
    pub workspace_name: String,
    pub client_id: String,
    pub current_version: i64,
    pub sync_strategy: String,
}

impl TryFrom<JoinResponse> for Membership {
    type Error = SyncError;

    fn try_from(value: JoinResponse) -> Result<Self, SyncError> {
        if !value.success {
            return Err(SyncError::Rejected(
                normalize_text_option(value.message)
                    .unwrap_or_else(|| "join was not accepted".to_string()),
            ));
        }
        let workspace = value.workspace.ok_or_else(|| {
            SyncError::Rejected("join response did not include a workspace".to_string())
        })?;
        let client_id = value
            .client
            .and_then(|client| normalize_text_option(Some(client.client_id)))
            .ok_or_else(|| {
                SyncError::Rejected("join response did not include a client id".to_string())
            })?;

        Ok(Self {
            workspace_name: normalize_text_option(Some(workspace.name))
                .unwrap_or_else(|| workspace.id.clone()),
            workspace_id: workspace.id,
            client_id,
            current_version: workspace.current_version.max(0),
            sync_strategy: workspace
                .sync_strategy
                .unwrap_or_else(|| DEFAULT_SYNC_STRATEGY.to_string()),
        })
    }
}

fn json_text(value: &Value) -> Option<String> {
    (!value.is_null()).then(|| value.to_string())
}

impl From<&ConflictDetail> for NewConflict {
    fn from(value: &ConflictDetail) -> Self {
        Self {
            diff_id: value.diff_id.clone(),
            entity: value.data.entity.as_str().to_string(),
            entity_id: value.data.entity_id.clone(),
            field: value.data.field.clone(),
            client_value: json_text(&value.data.new_value),
            server_value: json_text(&value.server_version),
            reason: value.reason.clone(),
        }
    }
}

impl From<&PendingConflict> for NewConflict {
    fn from(value: &PendingConflict) -> Self {
        Self {
            diff_id: value.diff_id.clone(),
            entity: value.data.entity.as_str().to_string(),
            entity_id: value.data.entity_id.clone(),
            field: value.data.field.clone(),
            client_value: json_text(&value.data.new_value),
            server_value: None,
            reason: value.reason.clone(),
        }
    }
}

/// Project fields as sent in snapshots and create diffs
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    #[serde(default, alias = "title")]
    pub name: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default, alias = "created_at", deserialize_with = "lenient_timestamp")]
    pub created_at: Option<i64>,
    #[serde(default, alias = "updated_at", deserialize_with = "lenient_timestamp")]
    pub updated_at: Option<i64>,
}

/// Board-column fields as sent in snapshots and create diffs
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnRecord {
    #[serde(default, alias = "project_id")]
    pub project_id: Option<String>,
    #[serde(default, alias = "name")]
    pub label: Option<String>,
    #[serde(default, alias = "is_done", deserialize_with = "lenient_bool")]
    pub is_done: Option<bool>,
    #[serde(default, alias = "created_at", deserialize_with = "lenient_timestamp")]
    pub created_at: Option<i64>,
}

/// Task fields as sent in snapshots and create diffs.
///
/// `Some(None)` on a nullable field means the server explicitly cleared it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    #[serde(default, alias = "project_id")]
    pub project_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, alias = "desc", deserialize_with = "lenient_text")]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub avatar: Option<String>,
    #[serde(default, alias = "avatar_color")]
    pub avatar_color: Option<String>,
    #[serde(default, alias = "due_date", deserialize_with = "nullable_text")]
    pub due_date: Option<Option<String>>,
    #[serde(default, alias = "due_time", deserialize_with = "nullable_text")]
    pub due_time: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable_text")]
    pub duration: Option<Option<String>>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub progress: Option<i64>,
    #[serde(default, deserialize_with = "json_array_text")]
    pub tags: Option<String>,
    #[serde(default, deserialize_with = "json_array_text")]
    pub checklist: Option<String>,
    #[serde(default, alias = "created_at", deserialize_with = "lenient_timestamp")]
    pub created_at: Option<i64>,
    #[serde(default, alias = "updated_at", deserialize_with = "lenient_timestamp")]
    pub updated_at: Option<i64>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Booleans arrive as `true`, `1` or `"true"`
pub(crate) fn value_as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::Number(number) => number.as_f64().map(|n| n != 0.0),
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    Ok(value_as_bool(&Value::deserialize(deserializer)?))
}

fn lenient_bool_or_false<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(lenient_bool(deserializer)?.unwrap_or(false))
}

#[allow(clippy::cast_possible_truncation)]
fn lenient_int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|n| n.round() as i64)),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<i64>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text
            .trim()
            .parse::<i64>()
            .ok()
            .or_else(|| rfc3339_to_millis(&text)),
        _ => None,
    })
}

fn scalar_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    }
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(scalar_text(Value::deserialize(deserializer)?))
}

fn nullable_text<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Option<String>>, D::Error> {
    Ok(Some(scalar_text(Value::deserialize(deserializer)?)))
}

/// Arrays arrive either as JSON or as already-encoded JSON text
pub(crate) fn value_as_array_text(value: &Value) -> String {
    match value {
        Value::Null => "[]".to_string(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn json_array_text<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(Some(value_as_array_text(&Value::deserialize(deserializer)?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn diff_data_accepts_snake_case_and_unknown_entities() {
        let diff: DiffData = serde_json::from_value(json!({
            "entity": "label",
            "entity_id": "l1",
            "action": "create",
            "new_value": {"name": "urgent"}
        }))
        .unwrap();
        assert_eq!(diff.entity, SyncEntity::Label);
        assert_eq!(diff.entity_id, "l1");
        assert!(diff.field.is_none());
        assert!(diff.old_value.is_null());

        let future: DiffData = serde_json::from_value(json!({
            "entity": "attachment",
            "entityId": "a1",
            "action": "archive"
        }))
        .unwrap();
        assert_eq!(future.entity, SyncEntity::Unknown);
        assert_eq!(future.action, SyncAction::Unknown);
        assert!(future.entity.entity_type().is_none());
    }

    #[test]
    fn push_item_serializes_camel_case_with_null_field() {
        let item = PushDiffItem {
            base_version: 3,
            data: DiffData {
                entity: SyncEntity::Task,
                entity_id: "t1".into(),
                action: SyncAction::Delete,
                field: None,
                old_value: Value::Null,
                new_value: Value::Null,
            },
            client_timestamp: "2026-01-01T00:00:00.000Z".into(),
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["baseVersion"], 3);
        assert_eq!(json["data"]["entityId"], "t1");
        assert_eq!(json["data"]["field"], Value::Null);
        assert_eq!(json["clientTimestamp"], "2026-01-01T00:00:00.000Z");
    }

    #[test]
    fn pull_response_tolerates_nulls_and_singular_snapshot_keys() {
        let response: PullResponse = serde_json::from_value(json!({
            "success": true,
            "upToDate": false,
            "currentVersion": 8,
            "diffs": null,
            "snapshot": {
                "version": 8,
                "data": {
                    "project": {"p1": {"name": "Alpha"}},
                    "tasks": {"t1": {"projectId": "p1", "title": "Write"}},
                    "labels": {"l1": {}}
                }
            },
            "pendingConflicts": null
        }))
        .unwrap();
        assert!(response.diffs.is_empty());
        assert!(response.pending_conflicts.is_empty());
        let snapshot = response.snapshot.unwrap();
        assert_eq!(snapshot.data.projects.len(), 1);
        assert_eq!(snapshot.data.tasks.len(), 1);
        assert!(snapshot.data.columns.is_empty());
    }

    #[test]
    fn task_record_normalizes_alternate_spellings() {
        let record: TaskRecord = serde_json::from_value(json!({
            "project_id": "p1",
            "desc": "notes",
            "avatarColor": "red",
            "dueDate": null,
            "duration": 45,
            "progress": "60",
            "tags": ["a", "b"],
            "checklist": "[{\"text\":\"x\",\"done\":true}]",
            "created_at": "2026-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(record.project_id.as_deref(), Some("p1"));
        assert_eq!(record.description.as_deref(), Some("notes"));
        assert_eq!(record.avatar_color.as_deref(), Some("red"));
        assert_eq!(record.due_date, Some(None));
        assert_eq!(record.due_time, None);
        assert_eq!(record.duration, Some(Some("45".to_string())));
        assert_eq!(record.progress, Some(60));
        assert_eq!(record.tags.as_deref(), Some(r#"["a","b"]"#));
        assert_eq!(
            record.checklist.as_deref(),
            Some(r#"[{"text":"x","done":true}]"#)
        );
        assert_eq!(record.created_at, Some(1_767_225_600_000));
    }

    #[test]
    fn column_record_accepts_flag_variants() {
        let numeric: ColumnRecord =
            serde_json::from_value(json!({"name": "Done", "is_done": 1})).unwrap();
        assert_eq!(numeric.label.as_deref(), Some("Done"));
        assert_eq!(numeric.is_done, Some(true));

        let boolean: ColumnRecord =
            serde_json::from_value(json!({"label": "Doing", "isDone": false})).unwrap();
        assert_eq!(boolean.is_done, Some(false));
    }

    #[test]
    fn join_response_reads_nested_membership() {
        let response: JoinResponse = serde_json::from_value(json!({
            "success": true,
            "message": "joined",
            "workspace": {
                "id": "ws-1",
                "name": "Team",
                "status": "online",
                "current_version": 4,
                "syncStrategy": "server-wins"
            },
            "client": {"clientId": "c-9", "name": "laptop"}
        }))
        .unwrap();
        let workspace = response.workspace.unwrap();
        assert_eq!(workspace.current_version, 4);
        assert_eq!(workspace.sync_strategy.as_deref(), Some("server-wins"));
        assert_eq!(response.client.unwrap().client_id, "c-9");
    }

    #[test]
    fn membership_requires_success_and_client_id() {
        let rejected: JoinResponse = serde_json::from_value(json!({
            "success": false,
            "message": "Invalid join key"
        }))
        .unwrap();
        let error = Membership::try_from(rejected).unwrap_err();
        assert_eq!(error.to_string(), "Sync request rejected: Invalid join key");

        let missing_client: JoinResponse = serde_json::from_value(json!({
            "success": true,
            "workspace": {"id": "ws-1", "name": "Team"}
        }))
        .unwrap();
        assert!(Membership::try_from(missing_client).is_err());

        let joined: JoinResponse = serde_json::from_value(json!({
            "success": true,
            "workspace": {"id": "ws-1", "name": " "},
            "client": {"client_id": "c-1"}
        }))
        .unwrap();
        let membership = Membership::try_from(joined).unwrap();
        assert_eq!(membership.workspace_name, "ws-1");
        assert_eq!(membership.sync_strategy, DEFAULT_SYNC_STRATEGY);
    }

    #[test]
    fn push_conflict_keeps_both_values_as_json() {
        let detail: ConflictDetail = serde_json::from_value(json!({
            "diffId": "d1",
            "reason": "version-mismatch",
            "data": {"entity": "task", "entityId": "t1", "action": "update",
                     "field": "title", "oldValue": "A", "newValue": "B"},
            "serverVersion": {"title": "C"}
        }))
        .unwrap();
        let conflict = NewConflict::from(&detail);
        assert_eq!(conflict.client_value.as_deref(), Some("\"B\""));
        assert_eq!(conflict.server_value.as_deref(), Some(r#"{"title":"C"}"#));
        assert_eq!(conflict.entity, "task");
    }

    #[test]
    fn heartbeat_pending_flag_accepts_numbers() {
        let response: HeartbeatResponse = serde_json::from_value(json!({
            "success": true,
            "currentVersion": 12,
            "hasPendingUpdates": 1,
            "pendingConflicts": 2
        }))
        .unwrap();
        assert!(response.has_pending_updates);
        assert_eq!(response.pending_conflicts, 2);
    }
}
