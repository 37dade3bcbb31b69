//! Data models for Taskey

mod change;
mod ids;
mod project;
mod sync;
mod task;

pub use change::{
    ChangeAction, ChangeLogEntry, EntityType, NewChange, LOCAL_IDENTITY, REMOTE_IDENTITY,
};
pub use ids::{new_entity_id, ConflictId, ConnectionId};
pub use project::{
    Column, NewColumn, NewProject, Project, ProjectUpdate, ProjectWithColumns, BACKLOG_STATUS,
    DEFAULT_PROJECT_COLOR,
};
pub use sync::{
    ConflictStatus, NewConflict, NewConnection, Resolution, SyncConflict, SyncConnection,
    DEFAULT_SYNC_STRATEGY,
};
pub use task::{
    ChecklistItem, NewTask, Task, TaskUpdate, DEFAULT_AVATAR_COLOR, DEFAULT_PRIORITY,
    TRACKED_TASK_FIELDS,
};
