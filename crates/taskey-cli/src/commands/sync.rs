use std::path::Path;

use taskey_core::models::{ConflictId, ConflictStatus, ConnectionId, Resolution};
use taskey_core::sync::SyncStatus;

use crate::commands::common::{
    connection_to_item, format_conflict_lines, format_connection_lines, open_engine,
    ConnectionItem, Engine,
};
use crate::error::CliError;

fn ensure_success(success: bool, message: Option<String>) -> Result<(), CliError> {
    if success {
        Ok(())
    } else {
        Err(CliError::SyncFailed(
            message.unwrap_or_else(|| "Sync request failed".to_string()),
        ))
    }
}

async fn require_connection(engine: &Engine) -> Result<(), CliError> {
    if engine.active_connection().await?.is_some() {
        Ok(())
    } else {
        Err(CliError::NotConnected)
    }
}

pub async fn run_sync_join(
    server_url: &str,
    join_key: &str,
    name: Option<&str>,
    db_path: &Path,
) -> Result<(), CliError> {
    let engine = open_engine(db_path).await?;
    let outcome = engine.join(server_url, join_key, name).await;
    engine.shutdown().await;
    ensure_success(outcome.success, outcome.message.clone())?;

    let workspace = outcome.workspace_name.as_deref().unwrap_or("workspace");
    if outcome.reused {
        println!("Already connected to {workspace}");
    } else {
        println!("Joined {workspace}");
    }
    if let Some(id) = outcome.connection_id {
        println!("{id}");
    }
    Ok(())
}

pub async fn run_sync_validate(
    server_url: &str,
    join_key: &str,
    db_path: &Path,
) -> Result<(), CliError> {
    let engine = open_engine(db_path).await?;
    let outcome = engine.validate_key(server_url, join_key).await;
    ensure_success(outcome.valid, outcome.message.clone())?;

    match (&outcome.workspace_name, &outcome.workspace_id) {
        (Some(name), Some(id)) => println!("Valid key for {name} ({id})"),
        (Some(name), None) => println!("Valid key for {name}"),
        _ => println!("Valid key"),
    }
    Ok(())
}

pub async fn run_sync_test(server_url: &str, db_path: &Path) -> Result<(), CliError> {
    let engine = open_engine(db_path).await?;
    if engine.test_connection(server_url).await {
        println!("Server reachable");
        Ok(())
    } else {
        Err(CliError::SyncFailed(format!("Server unreachable: {server_url}")))
    }
}

pub async fn run_sync_status(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let engine = open_engine(db_path).await?;
    let status = engine.status().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        for line in format_status_lines(&status) {
            println!("{line}");
        }
    }
    Ok(())
}

pub fn format_status_lines(status: &SyncStatus) -> Vec<String> {
    let mut lines = vec![format!("State:        {:?}", status.state)];
    if let (Some(workspace), Some(url)) = (&status.workspace_name, &status.server_url) {
        lines.push(format!("Workspace:    {workspace} ({url})"));
    }
    if status.connected {
        lines.push(format!(
            "Version:      {} synced / {} known",
            status.last_synced_version, status.current_version
        ));
        if let Some(strategy) = &status.sync_strategy {
            lines.push(format!("Strategy:     {strategy}"));
        }
    }
    lines.push(format!("Pending push: {}", status.pending_push_count));
    lines.push(format!("Conflicts:    {}", status.pending_conflicts));
    lines
}

pub async fn run_sync_push(db_path: &Path) -> Result<(), CliError> {
    let engine = open_engine(db_path).await?;
    require_connection(&engine).await?;
    let outcome = engine.push().await;
    ensure_success(outcome.success, outcome.message.clone())?;

    if outcome.pushed == 0 {
        println!("Nothing to push");
    } else {
        println!(
            "Pushed {}: {} accepted, {} rejected, {} conflicts (version {})",
            outcome.pushed,
            outcome.accepted,
            outcome.rejected,
            outcome.conflicts,
            outcome.current_version
        );
    }
    Ok(())
}

pub async fn run_sync_pull(db_path: &Path) -> Result<(), CliError> {
    let engine = open_engine(db_path).await?;
    require_connection(&engine).await?;
    let outcome = engine.pull().await;
    ensure_success(outcome.success, outcome.message.clone())?;

    if outcome.up_to_date {
        println!("Already up to date (version {})", outcome.current_version);
    } else {
        println!(
            "Applied {}, skipped {} (version {})",
            outcome.applied, outcome.skipped, outcome.last_synced_version
        );
    }
    Ok(())
}

pub async fn run_sync_full(db_path: &Path) -> Result<(), CliError> {
    let engine = open_engine(db_path).await?;
    require_connection(&engine).await?;
    let outcome = engine.full_sync().await;
    ensure_success(outcome.success, outcome.message.clone())?;

    println!(
        "Snapshot applied: {} rows, {} skipped (version {})",
        outcome.applied, outcome.skipped, outcome.version
    );
    Ok(())
}

pub async fn run_sync_heartbeat(db_path: &Path) -> Result<(), CliError> {
    let engine = open_engine(db_path).await?;
    require_connection(&engine).await?;
    let outcome = engine.heartbeat().await;
    ensure_success(outcome.success, outcome.message.clone())?;

    println!(
        "Server at version {}, {} pending conflict(s)",
        outcome.current_version, outcome.pending_conflicts
    );
    if let Some(pull) = outcome.pull {
        ensure_success(pull.success, pull.message.clone())?;
        println!("Pulled {} change(s)", pull.applied);
    }
    Ok(())
}

pub async fn run_sync_disconnect(
    connection: Option<ConnectionId>,
    db_path: &Path,
) -> Result<(), CliError> {
    let engine = open_engine(db_path).await?;
    match engine.disconnect(connection).await? {
        Some(connection) => println!("Disconnected from {}", connection.workspace_name),
        None => println!("No active connection"),
    }
    Ok(())
}

pub async fn run_sync_remove(connection: &ConnectionId, db_path: &Path) -> Result<(), CliError> {
    let engine = open_engine(db_path).await?;
    if engine.remove_connection(connection).await? {
        println!("{connection}");
        Ok(())
    } else {
        Err(CliError::Core(taskey_core::Error::NotFound(format!(
            "connection {connection}"
        ))))
    }
}

pub async fn run_sync_connections(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let engine = open_engine(db_path).await?;
    let connections = engine.connections().await?;

    if as_json {
        let json_items = connections
            .iter()
            .map(connection_to_item)
            .collect::<Vec<ConnectionItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if connections.is_empty() {
        println!("No workspace connections.");
    } else {
        for line in format_connection_lines(&connections) {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn run_sync_conflicts(
    include_resolved: bool,
    connection: Option<ConnectionId>,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let engine = open_engine(db_path).await?;
    let status = (!include_resolved).then_some(ConflictStatus::Pending);
    let conflicts = engine.conflicts(connection.as_ref(), status).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&conflicts)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No sync conflicts recorded.");
        return Ok(());
    }
    for line in format_conflict_lines(&conflicts) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_sync_resolve(
    id: &ConflictId,
    resolution: Resolution,
    db_path: &Path,
) -> Result<(), CliError> {
    let engine = open_engine(db_path).await?;
    let conflict = engine.resolve_conflict(id, resolution).await?;
    println!("{} ({resolution})", conflict.id);
    Ok(())
}

pub async fn run_sync_foreground(db_path: &Path) -> Result<(), CliError> {
    let engine = open_engine(db_path).await?;
    let Some(connection) = engine.start().await? else {
        return Err(CliError::NotConnected);
    };

    println!(
        "Syncing {} every {}s (heartbeat {}s). Press Ctrl-C to stop.",
        connection.workspace_name,
        engine.settings().sync_interval.as_secs(),
        engine.settings().heartbeat_interval.as_secs()
    );
    tokio::signal::ctrl_c().await?;
    engine.shutdown().await;
    println!("Stopped");
    Ok(())
}
