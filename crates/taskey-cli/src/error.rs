use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] taskey_core::Error),
    #[error(transparent)]
    Sync(#[from] taskey_core::sync::SyncError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("{0} cannot be empty")]
    EmptyValue(&'static str),
    #[error("Nothing to update")]
    NothingToUpdate,
    #[error("Project not found: {0}")]
    ProjectNotFound(String),
    #[error("Invalid time '{0}', expected RFC 3339 (e.g. 2024-05-01T12:00:00Z)")]
    InvalidTime(String),
    #[error("{0}")]
    SyncFailed(String),
    #[error("No active workspace connection. Run `taskey sync join <SERVER_URL> <JOIN_KEY>` first.")]
    NotConnected,
}
