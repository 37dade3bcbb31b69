//! Task model

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::ids::new_entity_id;
use super::project::BACKLOG_STATUS;

/// Priority used when a task does not specify one
pub const DEFAULT_PRIORITY: &str = "medium";

/// Avatar colour used when a task does not specify one
pub const DEFAULT_AVATAR_COLOR: &str = "blue";

/// Fields whose changes are recorded one change log row each.
///
/// `status` is absent on purpose: status changes are recorded as `move`.
pub const TRACKED_TASK_FIELDS: [&str; 11] = [
    "title",
    "description",
    "priority",
    "avatar",
    "avatar_color",
    "due_date",
    "due_time",
    "duration",
    "progress",
    "tags",
    "checklist",
];

/// One checklist line of a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub text: String,
    #[serde(default)]
    pub done: bool,
}

/// A task on a project board
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub project_id: String,
    /// `backlog` or the id of a column of the same project
    pub status: String,
    pub title: String,
    pub description: String,
    pub priority: String,
    pub avatar: String,
    pub avatar_color: String,
    pub due_date: Option<String>,
    pub due_time: Option<String>,
    pub duration: Option<String>,
    pub progress: i64,
    pub tags: Vec<String>,
    pub checklist: Vec<ChecklistItem>,
    pub sort_order: i64,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
}

impl Task {
    /// Field snapshot used for field-level change tracking
    pub fn tracked_snapshot(&self) -> Value {
        json!({
            "title": self.title,
            "description": self.description,
            "priority": self.priority,
            "avatar": self.avatar,
            "avatar_color": self.avatar_color,
            "due_date": self.due_date,
            "due_time": self.due_time,
            "duration": self.duration,
            "progress": self.progress,
            "tags": self.tags,
            "checklist": self.checklist,
        })
    }

    /// Apply a partial update, returning the resulting task.
    ///
    /// Empty strings clear the optional scheduling fields.
    #[must_use]
    pub fn with_update(&self, update: &TaskUpdate) -> Self {
        let clearable = |next: &Option<String>, current: &Option<String>| match next {
            Some(value) if value.trim().is_empty() => None,
            Some(value) => Some(value.clone()),
            None => current.clone(),
        };

        Self {
            title: update.title.clone().unwrap_or_else(|| self.title.clone()),
            description: update
                .description
                .clone()
                .unwrap_or_else(|| self.description.clone()),
            priority: update
                .priority
                .clone()
                .unwrap_or_else(|| self.priority.clone()),
            avatar: update.avatar.clone().unwrap_or_else(|| self.avatar.clone()),
            avatar_color: update
                .avatar_color
                .clone()
                .unwrap_or_else(|| self.avatar_color.clone()),
            due_date: clearable(&update.due_date, &self.due_date),
            due_time: clearable(&update.due_time, &self.due_time),
            duration: clearable(&update.duration, &self.duration),
            progress: update.progress.unwrap_or(self.progress),
            tags: update.tags.clone().unwrap_or_else(|| self.tags.clone()),
            checklist: update
                .checklist
                .clone()
                .unwrap_or_else(|| self.checklist.clone()),
            status: update.status.clone().unwrap_or_else(|| self.status.clone()),
            ..self.clone()
        }
    }
}

/// Input for creating a task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub id: String,
    pub project_id: String,
    pub status: String,
    pub title: String,
    pub description: String,
    pub priority: String,
    pub avatar: String,
    pub avatar_color: String,
    pub due_date: Option<String>,
    pub due_time: Option<String>,
    pub duration: Option<String>,
    pub progress: i64,
    pub tags: Vec<String>,
    pub checklist: Vec<ChecklistItem>,
}

impl NewTask {
    /// A backlog task with default attributes
    pub fn new(project_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: new_entity_id(),
            project_id: project_id.into(),
            status: BACKLOG_STATUS.to_string(),
            title: title.into(),
            description: String::new(),
            priority: DEFAULT_PRIORITY.to_string(),
            avatar: String::new(),
            avatar_color: DEFAULT_AVATAR_COLOR.to_string(),
            due_date: None,
            due_time: None,
            duration: None,
            progress: 0,
            tags: Vec::new(),
            checklist: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }
}

/// Partial update of a task. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub avatar: Option<String>,
    pub avatar_color: Option<String>,
    pub due_date: Option<String>,
    pub due_time: Option<String>,
    pub duration: Option<String>,
    pub progress: Option<i64>,
    pub tags: Option<Vec<String>>,
    pub checklist: Option<Vec<ChecklistItem>>,
    pub status: Option<String>,
}

impl TaskUpdate {
    /// Whether the update carries no changes at all
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Task {
        Task {
            id: "t1".into(),
            project_id: "p1".into(),
            status: BACKLOG_STATUS.into(),
            title: "Write docs".into(),
            description: String::new(),
            priority: DEFAULT_PRIORITY.into(),
            avatar: String::new(),
            avatar_color: DEFAULT_AVATAR_COLOR.into(),
            due_date: Some("2024-05-01".into()),
            due_time: None,
            duration: None,
            progress: 0,
            tags: vec!["docs".into()],
            checklist: Vec::new(),
            sort_order: 0,
            created_at: 1,
            updated_at: 1,
        }
    }

    #[test]
    fn with_update_keeps_untouched_fields() {
        let task = sample();
        let updated = task.with_update(&TaskUpdate {
            title: Some("Write more docs".into()),
            ..TaskUpdate::default()
        });
        assert_eq!(updated.title, "Write more docs");
        assert_eq!(updated.due_date, task.due_date);
        assert_eq!(updated.tags, task.tags);
    }

    #[test]
    fn with_update_clears_optional_fields_with_empty_text() {
        let updated = sample().with_update(&TaskUpdate {
            due_date: Some(String::new()),
            ..TaskUpdate::default()
        });
        assert_eq!(updated.due_date, None);
    }

    #[test]
    fn tracked_snapshot_excludes_status() {
        let snapshot = sample().tracked_snapshot();
        assert!(snapshot.get("status").is_none());
        for field in TRACKED_TASK_FIELDS {
            assert!(snapshot.get(field).is_some(), "missing {field}");
        }
    }
}
