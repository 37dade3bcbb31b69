//! Orchestrates join, push, pull, full sync and heartbeats for one store.

use std::sync::Arc;

use tokio::sync::Mutex;

use super::consumer::{ApplyReport, DiffConsumer};
use super::outcome::{
    FullSyncOutcome, HeartbeatOutcome, JoinOutcome, PullOutcome, PushOutcome, SyncStatus,
    ValidateKeyOutcome,
};
use super::producer::produce_unsynced_diffs;
use super::scheduler::Scheduler;
use super::transport::{normalize_server_url, SyncTransport};
use super::types::{JoinRequest, Membership, PushRequest};
use super::{SyncError, SyncResult};
use crate::config::{default_client_name, SyncSettings};
use crate::db::{ChangeLogRepository, SqliteChangeLogRepository, SqliteSyncRepository, SyncRepository};
use crate::models::{
    ConflictId, ConflictStatus, ConnectionId, NewConflict, NewConnection, Resolution,
    SyncConflict, SyncConnection,
};
use crate::services::DatabaseService;
use crate::state::ConnectionState;
use crate::util::{millis_to_rfc3339, normalize_text_option, unix_millis_now};

#[derive(Debug, Default)]
struct RuntimeState {
    joining: bool,
    is_online: bool,
    last_heartbeat: Option<i64>,
    last_push: Option<i64>,
    last_pull: Option<i64>,
}

struct EngineInner<T> {
    db: DatabaseService,
    transport: T,
    settings: SyncSettings,
    runtime: Mutex<RuntimeState>,
    push_gate: Mutex<()>,
    pull_gate: Mutex<()>,
    scheduler: Mutex<Option<Scheduler>>,
}

/// Sync engine over one local store.
///
/// Cheap to clone; clones share state. At most one push and one pull run at
/// a time, later callers wait for the running one. Network calls never hold
/// the store lock.
pub struct SyncEngine<T> {
    inner: Arc<EngineInner<T>>,
}

impl<T> Clone for SyncEngine<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: SyncTransport + 'static> SyncEngine<T> {
    pub fn new(db: DatabaseService, transport: T, settings: SyncSettings) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                db,
                transport,
                settings,
                runtime: Mutex::new(RuntimeState::default()),
                push_gate: Mutex::new(()),
                pull_gate: Mutex::new(()),
                scheduler: Mutex::new(None),
            }),
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.inner.settings
    }

    pub fn database(&self) -> &DatabaseService {
        &self.inner.db
    }

    /// Resume background scheduling for the first active connection, if any.
    pub async fn start(&self) -> crate::Result<Option<SyncConnection>> {
        let connection = self.active_connection().await?;
        match &connection {
            Some(connection) => {
                tracing::info!(
                    "Resuming connection to {} ({})",
                    connection.workspace_name,
                    connection.server_url
                );
                self.start_scheduler(connection.id).await;
            }
            None => tracing::info!("No active workspace connection to resume"),
        }
        Ok(connection)
    }

    /// Stop scheduling and wait for the background tasks to finish.
    pub async fn shutdown(&self) {
        let scheduler = self.inner.scheduler.lock().await.take();
        if let Some(scheduler) = scheduler {
            scheduler.shutdown().await;
        }
        self.set_online(false).await;
        tracing::info!("Sync engine stopped");
    }

    /// Whether background tasks are currently running
    pub async fn is_scheduling(&self) -> bool {
        self.inner.scheduler.lock().await.is_some()
    }

    /// Check a join key without joining.
    pub async fn validate_key(&self, server_url: &str, join_key: &str) -> ValidateKeyOutcome {
        let result = match normalize_server_url(server_url) {
            Ok(server_url) => {
                self.inner
                    .transport
                    .validate_key(&server_url, join_key.trim())
                    .await
            }
            Err(error) => Err(error),
        };

        match result {
            Ok(response) if response.success => {
                let (workspace_id, workspace_name) = response
                    .workspace
                    .map(|workspace| (Some(workspace.id), Some(workspace.name)))
                    .unwrap_or_default();
                ValidateKeyOutcome {
                    valid: true,
                    message: response.message,
                    workspace_id,
                    workspace_name,
                }
            }
            Ok(response) => ValidateKeyOutcome {
                message: Some(
                    normalize_text_option(response.message)
                        .unwrap_or_else(|| "Invalid join key".to_string()),
                ),
                ..ValidateKeyOutcome::default()
            },
            Err(error) => ValidateKeyOutcome {
                message: Some(error.to_string()),
                ..ValidateKeyOutcome::default()
            },
        }
    }

    /// Whether a sync server answers at `server_url`.
    pub async fn test_connection(&self, server_url: &str) -> bool {
        self.inner.transport.test_connection(server_url).await
    }

    /// Join a workspace, make it the only active connection, run an initial
    /// full sync and start scheduling.
    ///
    /// Nothing is persisted when the server refuses the key or cannot be reached.
    pub async fn join(
        &self,
        server_url: &str,
        join_key: &str,
        client_name: Option<&str>,
    ) -> JoinOutcome {
        self.inner.runtime.lock().await.joining = true;
        let result = self.try_join(server_url, join_key, client_name).await;
        self.inner.runtime.lock().await.joining = false;

        match result {
            Ok(outcome) => outcome,
            Err(error) => {
                self.note_failure("Join", &error).await;
                JoinOutcome::failed(error.to_string())
            }
        }
    }

    async fn try_join(
        &self,
        server_url: &str,
        join_key: &str,
        client_name: Option<&str>,
    ) -> SyncResult<JoinOutcome> {
        let server_url = normalize_server_url(server_url)?;
        let join_key = normalize_text_option(Some(join_key.to_string())).ok_or_else(|| {
            SyncError::InvalidConfiguration("join key must not be empty".to_string())
        })?;
        let client_name = normalize_text_option(client_name.map(str::to_string))
            .unwrap_or_else(|| self.inner.settings.client_name.clone());

        tracing::info!("Joining workspace via {server_url}");
        let request = JoinRequest {
            join_key: join_key.clone(),
            client_name: Some(client_name),
            hostname: Some(default_client_name()),
        };
        let response = self.inner.transport.join(&server_url, &request).await?;
        self.set_online(true).await;
        let membership = Membership::try_from(response)?;

        let fresh = NewConnection {
            server_url,
            workspace_id: membership.workspace_id,
            workspace_name: membership.workspace_name,
            client_id: membership.client_id,
            join_key,
            sync_strategy: membership.sync_strategy,
            current_version: membership.current_version,
        };
        let (connection, reused) = self
            .inner
            .db
            .write(|tx| {
                let repo = SqliteSyncRepository::new(tx);
                let (connection, reused) = match repo.connection_by_workspace(&fresh.workspace_id)? {
                    Some(existing) if existing.is_active => (
                        repo.advance_versions(&existing.id, fresh.current_version, None)?,
                        true,
                    ),
                    Some(existing) => (repo.refresh_connection(&existing.id, &fresh)?, false),
                    None => (repo.create_connection(&fresh)?, false),
                };
                let deactivated = repo.deactivate_others(&connection.id)?;
                if deactivated > 0 {
                    tracing::info!("Deactivated {deactivated} other workspace connection(s)");
                }
                Ok((connection, reused))
            })
            .await?;

        if !reused {
            let initial = self.full_sync_connection(&connection).await;
            if !initial.success {
                tracing::warn!(
                    "Initial full sync of {} failed: {}",
                    connection.workspace_name,
                    initial.message.as_deref().unwrap_or("unknown error")
                );
            }
        }
        self.start_scheduler(connection.id).await;

        tracing::info!("Joined workspace {}", connection.workspace_name);
        Ok(JoinOutcome {
            success: true,
            message: reused.then(|| "Reused existing connection".to_string()),
            connection_id: Some(connection.id),
            workspace_name: Some(connection.workspace_name),
            reused,
        })
    }

    /// Push every unsynced change log row.
    pub async fn push(&self) -> PushOutcome {
        let _gate = self.inner.push_gate.lock().await;
        match self.try_push().await {
            Ok(outcome) => outcome,
            Err(error) => {
                self.note_failure("Push", &error).await;
                PushOutcome::failed(error.to_string())
            }
        }
    }

    async fn try_push(&self) -> SyncResult<PushOutcome> {
        let connection = self.require_active().await?;
        let base_version = connection.last_synced_version;
        let batch = self
            .inner
            .db
            .read(|conn| produce_unsynced_diffs(conn, base_version))
            .await?;
        if batch.is_empty() {
            return Ok(PushOutcome {
                success: true,
                message: Some("Nothing to push".to_string()),
                current_version: connection.current_version,
                ..PushOutcome::default()
            });
        }

        tracing::debug!("Pushing {} diff(s) to {}", batch.len(), connection.server_url);
        let change_ids = batch.change_ids;
        let request = PushRequest {
            client_id: connection.client_id.clone(),
            diffs: batch.diffs,
        };
        let response = self
            .inner
            .transport
            .push(&connection.server_url, &request)
            .await?;
        self.set_online(true).await;
        if !response.success {
            return Err(SyncError::Rejected("push was not accepted".to_string()));
        }

        let id = connection.id;
        let (updated, recorded) = self
            .inner
            .db
            .write(|tx| {
                SqliteChangeLogRepository::new(tx).mark_synced(&change_ids)?;
                let repo = SqliteSyncRepository::new(tx);
                let recorded = record_conflicts(
                    &repo,
                    &id,
                    response.conflict_details.iter().map(NewConflict::from),
                )?;
                let updated = repo.advance_versions(
                    &id,
                    response.current_version,
                    Some(response.current_version),
                )?;
                Ok((updated, recorded))
            })
            .await?;
        self.inner.runtime.lock().await.last_push = Some(unix_millis_now());

        tracing::info!(
            "Push complete: {} accepted, {} rejected, {} conflicts",
            response.accepted,
            response.rejected,
            response.conflicts
        );
        Ok(PushOutcome {
            success: true,
            message: None,
            pushed: change_ids.len(),
            accepted: response.accepted,
            rejected: response.rejected,
            conflicts: response.conflicts,
            auto_resolved: response.auto_resolved,
            conflicts_recorded: recorded,
            current_version: updated.current_version,
        })
    }

    /// Pull and apply everything after the last synced version.
    pub async fn pull(&self) -> PullOutcome {
        let _gate = self.inner.pull_gate.lock().await;
        match self.try_pull().await {
            Ok(outcome) => outcome,
            Err(error) => {
                self.note_failure("Pull", &error).await;
                PullOutcome::failed(error.to_string())
            }
        }
    }

    async fn try_pull(&self) -> SyncResult<PullOutcome> {
        let connection = self.require_active().await?;
        tracing::debug!(
            "Pulling changes since version {}",
            connection.last_synced_version
        );
        let response = self
            .inner
            .transport
            .pull(
                &connection.server_url,
                &connection.client_id,
                connection.last_synced_version,
            )
            .await?;
        self.set_online(true).await;
        if !response.success {
            return Err(SyncError::Rejected("pull was not accepted".to_string()));
        }

        let id = connection.id;
        if response.up_to_date {
            let updated = self
                .inner
                .db
                .write(|tx| {
                    SqliteSyncRepository::new(tx).advance_versions(
                        &id,
                        response.current_version,
                        None,
                    )
                })
                .await?;
            self.inner.runtime.lock().await.last_pull = Some(unix_millis_now());
            return Ok(PullOutcome {
                success: true,
                message: Some("Already up to date".to_string()),
                up_to_date: true,
                current_version: updated.current_version,
                last_synced_version: updated.last_synced_version,
                ..PullOutcome::default()
            });
        }

        let (report, recorded, updated) = self
            .inner
            .db
            .write(|tx| {
                let consumer = DiffConsumer::new(tx);
                let mut report = ApplyReport::default();
                let mut synced_to = None;
                if !response.diffs.is_empty() {
                    report = consumer.apply_pull_diffs(&response.diffs)?;
                    synced_to = Some(report.max_version);
                }
                if let Some(snapshot) = &response.snapshot {
                    let applied = consumer.apply_snapshot(snapshot)?;
                    report.applied += applied.applied;
                    report.skipped += applied.skipped;
                    synced_to = Some(synced_to.unwrap_or(0).max(snapshot.version));
                }

                let repo = SqliteSyncRepository::new(tx);
                if let Some(strategy) = response.sync_strategy.as_deref() {
                    repo.set_sync_strategy(&id, strategy)?;
                }
                let recorded = record_conflicts(
                    &repo,
                    &id,
                    response.pending_conflicts.iter().map(NewConflict::from),
                )?;
                let ceiling = response.current_version.max(connection.current_version);
                let synced_to = synced_to.map(|version| version.min(ceiling));
                let updated = repo.advance_versions(&id, response.current_version, synced_to)?;
                Ok((report, recorded, updated))
            })
            .await?;
        self.inner.runtime.lock().await.last_pull = Some(unix_millis_now());

        tracing::info!(
            "Pull complete: {} applied, {} skipped, version {}",
            report.applied,
            report.skipped,
            updated.last_synced_version
        );
        Ok(PullOutcome {
            success: true,
            message: None,
            up_to_date: false,
            applied: report.applied,
            skipped: report.skipped,
            snapshot_applied: response.snapshot.is_some(),
            conflicts_recorded: recorded,
            current_version: updated.current_version,
            last_synced_version: updated.last_synced_version,
        })
    }

    /// Replace local workspace state with a full server snapshot.
    pub async fn full_sync(&self) -> FullSyncOutcome {
        match self.require_active().await {
            Ok(connection) => self.full_sync_connection(&connection).await,
            Err(error) => FullSyncOutcome::failed(error.to_string()),
        }
    }

    async fn full_sync_connection(&self, connection: &SyncConnection) -> FullSyncOutcome {
        let _gate = self.inner.pull_gate.lock().await;
        match self.try_full_sync(connection).await {
            Ok(outcome) => outcome,
            Err(error) => {
                self.note_failure("Full sync", &error).await;
                FullSyncOutcome::failed(error.to_string())
            }
        }
    }

    async fn try_full_sync(&self, connection: &SyncConnection) -> SyncResult<FullSyncOutcome> {
        tracing::debug!("Requesting full snapshot of {}", connection.workspace_name);
        let response = self
            .inner
            .transport
            .full_sync(&connection.server_url, &connection.client_id)
            .await?;
        self.set_online(true).await;
        if !response.success {
            return Err(SyncError::Rejected("full sync was not accepted".to_string()));
        }

        let id = connection.id;
        let (report, recorded, updated) = self
            .inner
            .db
            .write(|tx| {
                let report = match &response.snapshot {
                    Some(snapshot) => DiffConsumer::new(tx).apply_snapshot(snapshot)?,
                    None => ApplyReport::default(),
                };
                let repo = SqliteSyncRepository::new(tx);
                if let Some(strategy) = response.sync_strategy.as_deref() {
                    repo.set_sync_strategy(&id, strategy)?;
                }
                let recorded = record_conflicts(
                    &repo,
                    &id,
                    response.pending_conflicts.iter().map(NewConflict::from),
                )?;
                let updated = repo.advance_versions(
                    &id,
                    response.current_version,
                    Some(response.current_version),
                )?;
                Ok((report, recorded, updated))
            })
            .await?;
        self.inner.runtime.lock().await.last_pull = Some(unix_millis_now());

        tracing::info!(
            "Full sync complete: {} rows applied, version {}",
            report.applied,
            updated.current_version
        );
        Ok(FullSyncOutcome {
            success: true,
            message: None,
            applied: report.applied,
            skipped: report.skipped,
            conflicts_recorded: recorded,
            version: updated.current_version,
        })
    }

    /// Probe the server; pulls right away when it reports pending updates.
    pub async fn heartbeat(&self) -> HeartbeatOutcome {
        match self.try_heartbeat().await {
            Ok(outcome) => outcome,
            Err(error) => {
                self.set_online(false).await;
                self.note_failure("Heartbeat", &error).await;
                HeartbeatOutcome::failed(error.to_string())
            }
        }
    }

    async fn try_heartbeat(&self) -> SyncResult<HeartbeatOutcome> {
        let connection = self.require_active().await?;
        let response = self
            .inner
            .transport
            .heartbeat(&connection.server_url, &connection.client_id)
            .await?;
        if !response.success {
            return Err(SyncError::Rejected("heartbeat was not accepted".to_string()));
        }
        {
            let mut runtime = self.inner.runtime.lock().await;
            runtime.is_online = true;
            runtime.last_heartbeat = Some(unix_millis_now());
        }

        let id = connection.id;
        let updated = self
            .inner
            .db
            .write(|tx| {
                let repo = SqliteSyncRepository::new(tx);
                if let Some(strategy) = response.sync_strategy.as_deref() {
                    repo.set_sync_strategy(&id, strategy)?;
                }
                repo.advance_versions(&id, response.current_version, None)
            })
            .await?;

        let has_pending_updates = response.has_pending_updates
            || updated.current_version > updated.last_synced_version;
        let pull = if has_pending_updates {
            Some(self.pull().await)
        } else {
            None
        };

        Ok(HeartbeatOutcome {
            success: true,
            message: None,
            current_version: updated.current_version,
            has_pending_updates,
            pending_conflicts: response.pending_conflicts,
            pull,
        })
    }

    /// Push right away when online and something is waiting.
    pub async fn trigger_push(&self) -> Option<PushOutcome> {
        if !self.inner.runtime.lock().await.is_online {
            return None;
        }
        if !matches!(self.active_connection().await, Ok(Some(_))) {
            return None;
        }
        self.push_pending().await
    }

    /// Push only when the change log has unsynced rows.
    pub async fn push_pending(&self) -> Option<PushOutcome> {
        match self.inner.db.unsynced_count().await {
            Ok(0) => None,
            Ok(_) => Some(self.push().await),
            Err(error) => {
                tracing::warn!("Could not count unsynced changes: {error}");
                None
            }
        }
    }

    /// Mark a conflict resolved. Local bookkeeping only; nothing is re-applied.
    pub async fn resolve_conflict(
        &self,
        id: &ConflictId,
        resolution: Resolution,
    ) -> crate::Result<SyncConflict> {
        let conflict = self
            .inner
            .db
            .write(|tx| SqliteSyncRepository::new(tx).resolve_conflict(id, resolution))
            .await?;
        tracing::info!("Resolved conflict {id} ({resolution})");
        Ok(conflict)
    }

    /// Stop scheduling and mark the connection inactive, keeping its history.
    ///
    /// Without an id the active connection is disconnected.
    pub async fn disconnect(
        &self,
        connection_id: Option<ConnectionId>,
    ) -> crate::Result<Option<SyncConnection>> {
        let target = match connection_id {
            Some(id) => Some(id),
            None => self.active_connection().await?.map(|connection| connection.id),
        };
        let Some(id) = target else {
            return Ok(None);
        };

        self.stop_scheduler_for(&id).await;
        let connection = self
            .inner
            .db
            .write(|tx| {
                let repo = SqliteSyncRepository::new(tx);
                repo.set_active(&id, false)?;
                repo.connection(&id)
            })
            .await?;
        if self.active_connection().await?.is_none() {
            self.set_online(false).await;
        }
        tracing::info!("Disconnected connection {id}");
        Ok(connection)
    }

    /// Disconnect and delete a connection with all of its conflicts.
    pub async fn remove_connection(&self, id: &ConnectionId) -> crate::Result<bool> {
        self.stop_scheduler_for(id).await;
        let removed = self
            .inner
            .db
            .write(|tx| SqliteSyncRepository::new(tx).delete_connection(id))
            .await?;
        if self.active_connection().await?.is_none() {
            self.set_online(false).await;
        }
        if removed {
            tracing::info!("Removed connection {id}");
        }
        Ok(removed)
    }

    /// The connection driving sync, if any
    pub async fn active_connection(&self) -> crate::Result<Option<SyncConnection>> {
        self.inner
            .db
            .read(|conn| {
                Ok(SqliteSyncRepository::new(conn)
                    .active_connections()?
                    .into_iter()
                    .next())
            })
            .await
    }

    pub async fn connections(&self) -> crate::Result<Vec<SyncConnection>> {
        self.inner
            .db
            .read(|conn| SqliteSyncRepository::new(conn).connections())
            .await
    }

    /// Conflicts across connections, optionally filtered
    pub async fn conflicts(
        &self,
        connection_id: Option<&ConnectionId>,
        status: Option<ConflictStatus>,
    ) -> crate::Result<Vec<SyncConflict>> {
        self.inner
            .db
            .read(|conn| SqliteSyncRepository::new(conn).conflicts(connection_id, status))
            .await
    }

    pub async fn status(&self) -> crate::Result<SyncStatus> {
        let connection = self.active_connection().await?;
        let pending_push_count = self.inner.db.unsynced_count().await?;
        let pending_conflicts = match &connection {
            Some(connection) => {
                self.inner
                    .db
                    .read(|conn| SqliteSyncRepository::new(conn).pending_conflict_count(&connection.id))
                    .await?
            }
            None => 0,
        };
        let scheduling = self.is_scheduling().await;
        let runtime = self.inner.runtime.lock().await;

        Ok(SyncStatus {
            state: ConnectionState::derive(runtime.joining, connection.is_some(), runtime.is_online),
            connected: connection.is_some(),
            connection_id: connection.as_ref().map(|c| c.id),
            server_url: connection.as_ref().map(|c| c.server_url.clone()),
            workspace_name: connection.as_ref().map(|c| c.workspace_name.clone()),
            client_id: connection.as_ref().map(|c| c.client_id.clone()),
            current_version: connection.as_ref().map_or(0, |c| c.current_version),
            last_synced_version: connection.as_ref().map_or(0, |c| c.last_synced_version),
            sync_strategy: connection.as_ref().map(|c| c.sync_strategy.clone()),
            pending_push_count,
            pending_conflicts,
            is_online: runtime.is_online,
            scheduling,
            last_heartbeat: runtime.last_heartbeat.map(millis_to_rfc3339),
            last_push: runtime.last_push.map(millis_to_rfc3339),
            last_pull: runtime.last_pull.map(millis_to_rfc3339),
        })
    }

    async fn require_active(&self) -> SyncResult<SyncConnection> {
        self.active_connection()
            .await?
            .ok_or(SyncError::NoActiveConnection)
    }

    async fn set_online(&self, online: bool) {
        self.inner.runtime.lock().await.is_online = online;
    }

    async fn note_failure(&self, operation: &str, error: &SyncError) {
        if error.is_offline() {
            self.set_online(false).await;
        }
        tracing::warn!("{operation} failed: {error}");
    }

    async fn start_scheduler(&self, connection_id: ConnectionId) {
        let scheduler = Scheduler::start(self.clone(), connection_id);
        let previous = self.inner.scheduler.lock().await.replace(scheduler);
        if let Some(previous) = previous {
            previous.stop();
        }
    }

    async fn stop_scheduler_for(&self, connection_id: &ConnectionId) {
        let mut slot = self.inner.scheduler.lock().await;
        if slot
            .as_ref()
            .is_some_and(|scheduler| scheduler.connection_id() == *connection_id)
        {
            if let Some(scheduler) = slot.take() {
                scheduler.stop();
            }
        }
    }
}

fn record_conflicts(
    repo: &SqliteSyncRepository<'_>,
    connection_id: &ConnectionId,
    conflicts: impl IntoIterator<Item = NewConflict>,
) -> crate::Result<usize> {
    let mut recorded = 0;
    for conflict in conflicts {
        if repo.record_conflict(connection_id, &conflict)?.is_some() {
            recorded += 1;
        }
    }
    Ok(recorded)
}
