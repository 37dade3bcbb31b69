//! Background heartbeat and sync loops for the active connection.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::engine::SyncEngine;
use super::transport::SyncTransport;
use crate::models::ConnectionId;

/// Two periodic tasks driving one connection.
///
/// The heartbeat runs immediately and then every heartbeat interval. The
/// sync cycle pushes pending changes right away, then every sync interval
/// pushes (when something is pending) and pulls. A failing tick is logged and
/// retried on the next one. Stopping cancels future ticks; a request already
/// in flight runs to completion.
pub struct Scheduler {
    connection_id: ConnectionId,
    cancel: CancellationToken,
    heartbeat: JoinHandle<()>,
    cycle: JoinHandle<()>,
}

impl Scheduler {
    pub fn start<T: SyncTransport + 'static>(
        engine: SyncEngine<T>,
        connection_id: ConnectionId,
    ) -> Self {
        let cancel = CancellationToken::new();
        let heartbeat_every = engine.settings().heartbeat_interval;
        let sync_every = engine.settings().sync_interval;
        tracing::debug!(
            "Scheduling connection {connection_id}: heartbeat every {}s, sync every {}s",
            heartbeat_every.as_secs(),
            sync_every.as_secs()
        );

        let heartbeat = tokio::spawn(heartbeat_loop(
            engine.clone(),
            heartbeat_every,
            cancel.clone(),
        ));
        let cycle = tokio::spawn(sync_loop(engine, sync_every, cancel.clone()));

        Self {
            connection_id,
            cancel,
            heartbeat,
            cycle,
        }
    }

    pub const fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Cancel both loops without waiting for them.
    pub fn stop(self) {
        self.cancel.cancel();
        tracing::debug!("Stopped scheduling connection {}", self.connection_id);
    }

    /// Cancel both loops and wait until they have exited.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for (name, handle) in [("heartbeat", self.heartbeat), ("sync", self.cycle)] {
            if let Err(error) = handle.await {
                tracing::warn!("Sync {name} task ended abnormally: {error}");
            }
        }
        tracing::debug!("Stopped scheduling connection {}", self.connection_id);
    }
}

async fn heartbeat_loop<T: SyncTransport + 'static>(
    engine: SyncEngine<T>,
    every: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let outcome = engine.heartbeat().await;
        if !outcome.success {
            tracing::debug!(
                "Heartbeat tick failed: {}",
                outcome.message.as_deref().unwrap_or("unknown error")
            );
        }
    }
}

async fn sync_loop<T: SyncTransport + 'static>(
    engine: SyncEngine<T>,
    every: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut first = true;

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        if let Some(push) = engine.push_pending().await {
            if !push.success {
                tracing::debug!(
                    "Scheduled push failed: {}",
                    push.message.as_deref().unwrap_or("unknown error")
                );
            }
        }
        if first {
            first = false;
            continue;
        }
        let pull = engine.pull().await;
        if !pull.success {
            tracing::debug!(
                "Scheduled pull failed: {}",
                pull.message.as_deref().unwrap_or("unknown error")
            );
        }
    }
}
