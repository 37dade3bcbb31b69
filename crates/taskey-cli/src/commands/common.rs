use std::env;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use taskey_core::models::{ChangeLogEntry, ProjectWithColumns, SyncConflict, SyncConnection, Task};
use taskey_core::sync::{HttpSyncClient, SyncEngine};
use taskey_core::{DatabaseService, SyncSettings};

use crate::error::CliError;

pub type Engine = SyncEngine<HttpSyncClient>;

#[derive(Debug, Serialize)]
pub struct HistoryItem {
    pub id: i64,
    pub timestamp: i64,
    pub timestamp_iso: String,
    pub entity_type: String,
    pub entity_id: String,
    pub project_id: Option<String>,
    pub action: String,
    pub field: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub user_id: String,
    pub synced: bool,
}

#[derive(Debug, Serialize)]
pub struct ConnectionItem {
    pub id: String,
    pub server_url: String,
    pub workspace_id: String,
    pub workspace_name: String,
    pub client_id: String,
    pub sync_strategy: String,
    pub current_version: i64,
    pub last_synced_version: i64,
    pub is_active: bool,
    pub updated_at_iso: String,
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("TASKEY_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("taskey")
        .join("taskey.db")
}

pub async fn open_database(path: &Path) -> Result<DatabaseService, CliError> {
    Ok(DatabaseService::open_path(path).await?)
}

pub async fn open_engine(path: &Path) -> Result<Engine, CliError> {
    let db = open_database(path).await?;
    let settings = SyncSettings::from_env()?;
    let transport = HttpSyncClient::new(settings.request_timeout)?;
    Ok(SyncEngine::new(db, transport, settings))
}

/// Join CLI words into one trimmed value.
pub fn join_words(parts: &[String], what: &'static str) -> Result<String, CliError> {
    let joined = parts.join(" ");
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyValue(what))
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn parse_since(value: &str) -> Result<i64, CliError> {
    taskey_core::util::rfc3339_to_millis(value)
        .ok_or_else(|| CliError::InvalidTime(value.trim().to_string()))
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format!("{}w ago", diff / week)
    }
}

pub fn truncate(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let mut truncated = collapsed
            .chars()
            .take(max_chars.saturating_sub(3))
            .collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_project_lines(projects: &[ProjectWithColumns]) -> Vec<String> {
    projects
        .iter()
        .map(|entry| {
            let columns = entry
                .columns
                .iter()
                .map(|column| {
                    if column.is_done {
                        format!("{}*", column.id)
                    } else {
                        column.id.clone()
                    }
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "{:<36}  {:<24}  {:<8}  [{columns}]",
                entry.project.id,
                truncate(&entry.project.name, 24),
                entry.project.color
            )
        })
        .collect()
}

pub fn format_task_lines(tasks: &[Task]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    tasks
        .iter()
        .map(|task| {
            let line = format!(
                "{:<36}  {:<12}  {:<6}  {:<40}  {}",
                task.id,
                task.status,
                task.priority,
                truncate(&task.title, 40),
                format_relative_time(task.updated_at, now_ms)
            );
            if task.tags.is_empty() {
                line
            } else {
                let tags = task
                    .tags
                    .iter()
                    .map(|tag| format!("#{tag}"))
                    .collect::<Vec<_>>()
                    .join(" ");
                format!("{line}  {tags}")
            }
        })
        .collect()
}

pub fn history_to_item(entry: &ChangeLogEntry) -> HistoryItem {
    HistoryItem {
        id: entry.id,
        timestamp: entry.timestamp,
        timestamp_iso: format_timestamp(entry.timestamp),
        entity_type: entry.entity_type.to_string(),
        entity_id: entry.entity_id.clone(),
        project_id: entry.project_id.clone(),
        action: entry.action.to_string(),
        field: entry.field.clone(),
        old_value: entry.old_value.clone(),
        new_value: entry.new_value.clone(),
        user_id: entry.user_id.clone(),
        synced: entry.synced,
    }
}

pub fn format_history_lines(entries: &[ChangeLogEntry]) -> Vec<String> {
    entries
        .iter()
        .map(|entry| {
            let marker = if entry.synced { ' ' } else { '*' };
            let target = format!("{} {}", entry.entity_type, entry.entity_id);
            let detail = match (&entry.field, &entry.new_value) {
                (Some(field), Some(value)) => format!("{field} = {}", truncate(value, 40)),
                (Some(field), None) => field.clone(),
                (None, _) => String::new(),
            };
            format!(
                "{marker}{:>6}  {}  {:<7}  {target:<44}  {detail}",
                entry.id,
                format_timestamp(entry.timestamp),
                entry.action
            )
        })
        .collect()
}

pub fn connection_to_item(connection: &SyncConnection) -> ConnectionItem {
    ConnectionItem {
        id: connection.id.to_string(),
        server_url: connection.server_url.clone(),
        workspace_id: connection.workspace_id.clone(),
        workspace_name: connection.workspace_name.clone(),
        client_id: connection.client_id.clone(),
        sync_strategy: connection.sync_strategy.clone(),
        current_version: connection.current_version,
        last_synced_version: connection.last_synced_version,
        is_active: connection.is_active,
        updated_at_iso: format_timestamp(connection.updated_at),
    }
}

pub fn format_connection_lines(connections: &[SyncConnection]) -> Vec<String> {
    connections
        .iter()
        .map(|connection| {
            let marker = if connection.is_active { '*' } else { ' ' };
            format!(
                "{marker} {}  {:<20}  v{}/{}  {}",
                connection.id,
                truncate(&connection.workspace_name, 20),
                connection.last_synced_version,
                connection.current_version,
                connection.server_url
            )
        })
        .collect()
}

pub fn format_conflict_lines(conflicts: &[SyncConflict]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            let field = conflict.field.as_deref().unwrap_or("-");
            format!(
                "{}  {}  {:<8}  {} {}.{field}  {}",
                conflict.id,
                format_timestamp(conflict.created_at),
                conflict.status.as_str(),
                conflict.entity,
                conflict.entity_id,
                conflict.reason
            )
        })
        .collect()
}
