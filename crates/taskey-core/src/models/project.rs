//! Project and column models

use serde::{Deserialize, Serialize};

use super::ids::new_entity_id;

/// Colour used when a project does not specify one
pub const DEFAULT_PROJECT_COLOR: &str = "orange";

/// Status every project accepts in addition to its own columns
pub const BACKLOG_STATUS: &str = "backlog";

/// A kanban project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub color: String,
    pub sort_order: i64,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
}

/// A column of a project board. Column ids are unique per project only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub id: String,
    pub project_id: String,
    pub label: String,
    pub is_done: bool,
    pub sort_order: i64,
    pub created_at: i64,
}

/// A project together with its ordered columns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectWithColumns {
    #[serde(flatten)]
    pub project: Project,
    pub columns: Vec<Column>,
}

/// Column definition used when creating a project or adding a column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewColumn {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub is_done: bool,
}

impl NewColumn {
    pub fn new(id: impl Into<String>, label: impl Into<String>, is_done: bool) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            is_done,
        }
    }

    /// The board a project starts with when no columns are given.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("todo", "To Do", false),
            Self::new("in-progress", "In Progress", false),
            Self::new("done", "Done", true),
        ]
    }
}

/// Input for creating a project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProject {
    pub id: String,
    pub name: String,
    pub color: String,
    pub columns: Vec<NewColumn>,
}

impl NewProject {
    /// New project with a fresh id, the default colour and the default board
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_entity_id(),
            name: name.into(),
            color: DEFAULT_PROJECT_COLOR.to_string(),
            columns: NewColumn::defaults(),
        }
    }

    #[must_use]
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    #[must_use]
    pub fn with_columns(mut self, columns: Vec<NewColumn>) -> Self {
        self.columns = columns;
        self
    }
}

/// Partial update of a project's basic info
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectUpdate {
    pub name: Option<String>,
    pub color: Option<String>,
}
