//! Change log model

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Identity written on change log rows produced locally
pub const LOCAL_IDENTITY: &str = "local";

/// Identity written on change log rows applied from a remote workspace
pub const REMOTE_IDENTITY: &str = "remote";

/// Kind of entity a change log row refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Project,
    Column,
    Task,
}

impl EntityType {
    /// Stored / wire representation
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Column => "column",
            Self::Task => "task",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "project" => Ok(Self::Project),
            "column" => Ok(Self::Column),
            "task" => Ok(Self::Task),
            other => Err(Error::InvalidInput(format!("Unknown entity type: {other}"))),
        }
    }
}

/// Kind of mutation recorded in the change log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
    /// Status change of a task; travels as an `update` of `status`
    Move,
}

impl ChangeAction {
    /// Stored representation
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Move => "move",
        }
    }
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            "move" => Ok(Self::Move),
            other => Err(Error::InvalidInput(format!("Unknown change action: {other}"))),
        }
    }
}

macro_rules! sql_text_enum {
    ($name:ident) => {
        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|error: Error| FromSqlError::Other(Box::new(error)))
            }
        }
    };
}

sql_text_enum!(EntityType);
sql_text_enum!(ChangeAction);

/// A row of the append-only change log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    /// Monotonic row id (insertion order)
    pub id: i64,
    /// When the change was recorded (Unix ms)
    pub timestamp: i64,
    pub user_id: String,
    pub device_id: String,
    pub session_id: Option<String>,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub project_id: Option<String>,
    pub action: ChangeAction,
    pub field: Option<String>,
    /// JSON text snapshot of the previous value
    pub old_value: Option<String>,
    /// JSON text snapshot of the new value
    pub new_value: Option<String>,
    /// Whether the change has been pushed (or came from the remote)
    pub synced: bool,
}

/// A change about to be appended to the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChange {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub project_id: Option<String>,
    pub action: ChangeAction,
    pub field: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub user_id: String,
    pub device_id: String,
    pub session_id: Option<String>,
    pub synced: bool,
}

impl NewChange {
    /// A local, unsynced change
    #[must_use]
    pub fn new(
        entity_type: EntityType,
        entity_id: impl Into<String>,
        action: ChangeAction,
    ) -> Self {
        Self {
            entity_type,
            entity_id: entity_id.into(),
            project_id: None,
            action,
            field: None,
            old_value: None,
            new_value: None,
            user_id: LOCAL_IDENTITY.to_string(),
            device_id: LOCAL_IDENTITY.to_string(),
            session_id: None,
            synced: false,
        }
    }

    #[must_use]
    pub fn project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    #[must_use]
    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Attach JSON snapshots of the old value
    #[must_use]
    pub fn old_json(mut self, value: &serde_json::Value) -> Self {
        self.old_value = Some(value.to_string());
        self
    }

    /// Attach JSON snapshots of the new value
    #[must_use]
    pub fn new_json(mut self, value: &serde_json::Value) -> Self {
        self.new_value = Some(value.to_string());
        self
    }

    /// Attribute the change to a user and device
    #[must_use]
    pub fn identity(mut self, user_id: impl Into<String>, device_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self.device_id = device_id.into();
        self
    }

    /// Mark as an already-synced change applied from the remote workspace
    #[must_use]
    pub fn remote(self) -> Self {
        let mut change = self.identity(REMOTE_IDENTITY, REMOTE_IDENTITY);
        change.synced = true;
        change
    }
}
