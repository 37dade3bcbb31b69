use std::path::PathBuf;

use clap::Parser;
use taskey_core::models::{EntityType, Resolution};
use taskey_core::state::ConnectionState;
use taskey_core::sync::SyncStatus;

use crate::cli::{Cli, Commands, SyncCommands, TaskCommands};
use crate::commands::column::run_column_delete;
use crate::commands::common::{
    format_relative_time, join_words, open_database, parse_since, resolve_db_path, truncate,
};
use crate::commands::history::HistoryFilter;
use crate::commands::project::{run_project_add, run_project_rename};
use crate::commands::sync::{format_status_lines, run_sync_push};
use crate::commands::task::{build_new_task, run_task_add, TaskDraft};
use crate::error::CliError;
use crate::history_filter;

#[test]
fn join_words_trims_and_rejects_empty() {
    let words = vec!["  Ship".to_string(), "it ".to_string()];
    assert_eq!(join_words(&words, "Title").unwrap(), "Ship it");
    assert!(matches!(
        join_words(&[" ".to_string()], "Title"),
        Err(CliError::EmptyValue("Title"))
    ));
}

#[test]
fn explicit_db_path_wins() {
    let explicit = PathBuf::from("/tmp/explicit.db");
    assert_eq!(resolve_db_path(Some(explicit.clone())), explicit);
}

#[test]
fn parse_since_accepts_rfc3339_only() {
    assert_eq!(parse_since("1970-01-01T00:00:01Z").unwrap(), 1_000);
    assert!(matches!(
        parse_since("yesterday"),
        Err(CliError::InvalidTime(_))
    ));
}

#[test]
fn relative_time_buckets() {
    let now = 10 * 24 * 60 * 60 * 1000;
    assert_eq!(format_relative_time(now - 5_000, now), "just now");
    assert_eq!(format_relative_time(now - 5 * 60_000, now), "5m ago");
    assert_eq!(format_relative_time(now - 3 * 60 * 60_000, now), "3h ago");
    assert_eq!(format_relative_time(0, now), "1w ago");
}

#[test]
fn truncate_collapses_whitespace() {
    assert_eq!(truncate("a   b\nc", 10), "a b c");
    assert_eq!(truncate("abcdefghijk", 8), "abcde...");
}

#[test]
fn history_filter_prefers_unsynced_then_entity() {
    assert_eq!(
        history_filter(true, Some("t1".into()), EntityType::Task, None, None),
        HistoryFilter::Unsynced
    );
    assert_eq!(
        history_filter(false, Some("p1".into()), EntityType::Project, None, None),
        HistoryFilter::Entity(EntityType::Project, "p1".into())
    );
    assert_eq!(
        history_filter(false, None, EntityType::Task, None, None),
        HistoryFilter::All
    );
}

#[test]
fn build_new_task_applies_draft() {
    let task = build_new_task(
        " p1 ",
        &["Write".to_string(), "docs".to_string()],
        TaskDraft {
            status: Some("todo".into()),
            priority: Some("high".into()),
            tags: vec!["docs".into()],
            ..TaskDraft::default()
        },
    )
    .unwrap();

    assert_eq!(task.project_id, "p1");
    assert_eq!(task.title, "Write docs");
    assert_eq!(task.status, "todo");
    assert_eq!(task.priority, "high");
    assert_eq!(task.tags, vec!["docs".to_string()]);
}

#[test]
fn cli_parses_sync_resolve() {
    let cli = Cli::try_parse_from([
        "taskey",
        "sync",
        "resolve",
        "01890a5d-ac96-774b-bcce-b302099a8057",
        "accept",
    ])
    .unwrap();

    match cli.command {
        Commands::Sync {
            command: SyncCommands::Resolve { resolution, .. },
        } => assert_eq!(resolution, Resolution::Accept),
        _ => panic!("expected sync resolve"),
    }
}

#[test]
fn cli_rejects_bad_conflict_id() {
    assert!(Cli::try_parse_from(["taskey", "sync", "resolve", "nope", "accept"]).is_err());
}

#[test]
fn cli_parses_repeated_tags() {
    let cli = Cli::try_parse_from([
        "taskey", "task", "update", "t1", "--tag", "a", "--tag", "b",
    ])
    .unwrap();

    match cli.command {
        Commands::Task {
            command: TaskCommands::Update { tags, title, .. },
        } => {
            assert_eq!(tags, Some(vec!["a".to_string(), "b".to_string()]));
            assert!(title.is_none());
        }
        _ => panic!("expected task update"),
    }
}

#[test]
fn status_lines_show_versions_when_connected() {
    let status = SyncStatus {
        state: ConnectionState::Active,
        connected: true,
        connection_id: None,
        server_url: Some("https://sync.example.com".into()),
        workspace_name: Some("Team".into()),
        client_id: Some("client-1".into()),
        current_version: 7,
        last_synced_version: 5,
        sync_strategy: Some("auto-merge".into()),
        pending_push_count: 2,
        pending_conflicts: 1,
        is_online: true,
        scheduling: false,
        last_heartbeat: None,
        last_push: None,
        last_pull: None,
    };

    let lines = format_status_lines(&status);

    assert!(lines.contains(&"Workspace:    Team (https://sync.example.com)".to_string()));
    assert!(lines.contains(&"Version:      5 synced / 7 known".to_string()));
    assert!(lines.contains(&"Pending push: 2".to_string()));
}

#[tokio::test(flavor = "multi_thread")]
async fn commands_write_through_to_on_disk_store() {
    let tmp = tempfile::tempdir().unwrap();
    let db_path = tmp.path().join("taskey.db");

    run_project_add(&["Launch".to_string()], Some("teal".into()), &db_path)
        .await
        .unwrap();
    let db = open_database(&db_path).await.unwrap();
    let project = db.list_projects().await.unwrap().remove(0);
    assert_eq!(project.project.color, "teal");
    drop(db);

    run_task_add(
        &project.project.id,
        &["Draft".to_string()],
        TaskDraft {
            status: Some("todo".into()),
            ..TaskDraft::default()
        },
        &db_path,
    )
    .await
    .unwrap();
    run_column_delete(&project.project.id, "todo", &db_path)
        .await
        .unwrap();

    let db = open_database(&db_path).await.unwrap();
    let tasks = db.list_tasks(Some(&project.project.id)).await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].status, "backlog");
    assert!(db.unsynced_count().await.unwrap() > 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn rename_without_changes_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let db_path = tmp.path().join("taskey.db");

    let result = run_project_rename("p1", &[], None, &db_path).await;

    assert!(matches!(result, Err(CliError::NothingToUpdate)));
}

#[tokio::test(flavor = "multi_thread")]
async fn push_without_connection_explains_how_to_join() {
    let tmp = tempfile::tempdir().unwrap();
    let db_path = tmp.path().join("taskey.db");

    let result = run_sync_push(&db_path).await;

    assert!(matches!(result, Err(CliError::NotConnected)));
}
