//! Workspace synchronization.
//!
//! Local mutations land in the change log; the producer turns unsynced rows
//! into wire diffs, the transport ships them, and the consumer writes pulled
//! diffs and snapshots back into the store. [`SyncEngine`] ties these together
//! and [`Scheduler`] drives it in the background.

mod consumer;
mod engine;
mod outcome;
mod producer;
mod scheduler;
mod transport;
pub mod types;

use thiserror::Error;

pub use consumer::{ApplyReport, DiffConsumer};
pub use engine::SyncEngine;
pub use outcome::{
    FullSyncOutcome, HeartbeatOutcome, JoinOutcome, PullOutcome, PushOutcome, SyncStatus,
    ValidateKeyOutcome,
};
pub use producer::{change_to_diff, produce_unsynced_diffs, ProducedBatch};
pub use scheduler::Scheduler;
pub use transport::{normalize_server_url, HttpSyncClient, SyncTransport};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Invalid sync configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Sync HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Sync API error: {message}")]
    Api { status: u16, message: String },
    #[error("Sync request rejected: {0}")]
    Rejected(String),
    #[error("No active workspace connection")]
    NoActiveConnection,
    #[error(transparent)]
    Store(#[from] crate::Error),
}

impl SyncError {
    /// Whether the failure means the server could not be reached
    pub const fn is_offline(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
