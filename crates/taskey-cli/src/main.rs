//! Taskey CLI - Command-line interface for local-first task tracking
//!
//! Manage projects, columns and tasks in the local store and keep them in
//! sync with a shared workspace.

mod cli;
mod commands;
mod error;
#[cfg(test)]
mod tests;

use clap::Parser;
use taskey_core::models::TaskUpdate;

use crate::cli::{Cli, ColumnCommands, Commands, ProjectCommands, SyncCommands, TaskCommands};
use crate::commands::column::{run_column_add, run_column_delete, run_column_rename};
use crate::commands::common::resolve_db_path;
use crate::commands::history::{run_history, HistoryFilter};
use crate::commands::project::{
    run_project_add, run_project_delete, run_project_list, run_project_rename,
};
use crate::commands::sync::{
    run_sync_conflicts, run_sync_connections, run_sync_disconnect, run_sync_foreground,
    run_sync_full, run_sync_heartbeat, run_sync_join, run_sync_pull, run_sync_push,
    run_sync_remove, run_sync_resolve, run_sync_status, run_sync_test, run_sync_validate,
};
use crate::commands::task::{
    run_task_add, run_task_delete, run_task_list, run_task_move, run_task_update, TaskDraft,
};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "taskey=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);

    match cli.command {
        Commands::Project { command } => match command {
            ProjectCommands::List { json } => run_project_list(json, &db_path).await?,
            ProjectCommands::Add { name, color } => {
                run_project_add(&name, color, &db_path).await?;
            }
            ProjectCommands::Rename { id, name, color } => {
                run_project_rename(&id, &name, color, &db_path).await?;
            }
            ProjectCommands::Delete { id } => run_project_delete(&id, &db_path).await?,
        },
        Commands::Column { command } => match command {
            ColumnCommands::Add {
                project,
                id,
                label,
                done,
            } => run_column_add(&project, &id, &label, done, &db_path).await?,
            ColumnCommands::Rename { project, id, label } => {
                run_column_rename(&project, &id, &label, &db_path).await?;
            }
            ColumnCommands::Delete { project, id } => {
                run_column_delete(&project, &id, &db_path).await?;
            }
        },
        Commands::Task { command } => match command {
            TaskCommands::List { project, json } => {
                run_task_list(project.as_deref(), json, &db_path).await?;
            }
            TaskCommands::Add {
                project,
                title,
                status,
                priority,
                description,
                due,
                tags,
            } => {
                let draft = TaskDraft {
                    status,
                    priority,
                    description,
                    due_date: due,
                    tags,
                };
                run_task_add(&project, &title, draft, &db_path).await?;
            }
            TaskCommands::Update {
                id,
                title,
                description,
                priority,
                due,
                due_time,
                duration,
                progress,
                tags,
            } => {
                let update = TaskUpdate {
                    title,
                    description,
                    priority,
                    due_date: due,
                    due_time,
                    duration,
                    progress,
                    tags,
                    ..TaskUpdate::default()
                };
                run_task_update(&id, &update, &db_path).await?;
            }
            TaskCommands::Move {
                id,
                status,
                progress,
            } => run_task_move(&id, &status, progress, &db_path).await?,
            TaskCommands::Delete { id } => run_task_delete(&id, &db_path).await?,
        },
        Commands::History {
            unsynced,
            entity,
            entity_type,
            project,
            since,
            limit,
            json,
        } => {
            let filter = history_filter(unsynced, entity, entity_type, project, since);
            run_history(filter, limit, json, &db_path).await?;
        }
        Commands::Sync { command } => match command {
            SyncCommands::Join {
                server_url,
                join_key,
                name,
            } => run_sync_join(&server_url, &join_key, name.as_deref(), &db_path).await?,
            SyncCommands::Validate {
                server_url,
                join_key,
            } => run_sync_validate(&server_url, &join_key, &db_path).await?,
            SyncCommands::Test { server_url } => run_sync_test(&server_url, &db_path).await?,
            SyncCommands::Status { json } => run_sync_status(json, &db_path).await?,
            SyncCommands::Push => run_sync_push(&db_path).await?,
            SyncCommands::Pull => run_sync_pull(&db_path).await?,
            SyncCommands::Full => run_sync_full(&db_path).await?,
            SyncCommands::Heartbeat => run_sync_heartbeat(&db_path).await?,
            SyncCommands::Disconnect { connection } => {
                run_sync_disconnect(connection, &db_path).await?;
            }
            SyncCommands::Remove { connection } => {
                run_sync_remove(&connection, &db_path).await?;
            }
            SyncCommands::Connections { json } => run_sync_connections(json, &db_path).await?,
            SyncCommands::Conflicts {
                all,
                connection,
                json,
            } => run_sync_conflicts(all, connection, json, &db_path).await?,
            SyncCommands::Resolve { id, resolution } => {
                run_sync_resolve(&id, resolution, &db_path).await?;
            }
            SyncCommands::Run => run_sync_foreground(&db_path).await?,
        },
    }

    Ok(())
}

fn history_filter(
    unsynced: bool,
    entity: Option<String>,
    entity_type: taskey_core::models::EntityType,
    project: Option<String>,
    since: Option<String>,
) -> HistoryFilter {
    if unsynced {
        HistoryFilter::Unsynced
    } else if let Some(id) = entity {
        HistoryFilter::Entity(entity_type, id)
    } else if let Some(id) = project {
        HistoryFilter::Project(id)
    } else if let Some(value) = since {
        HistoryFilter::Since(value)
    } else {
        HistoryFilter::All
    }
}
