use std::path::Path;

use taskey_core::models::{ChangeLogEntry, EntityType};

use crate::commands::common::{
    format_history_lines, history_to_item, open_database, parse_since, HistoryItem,
};
use crate::error::CliError;

/// Which slice of the change log to show
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryFilter {
    All,
    Unsynced,
    Entity(EntityType, String),
    Project(String),
    Since(String),
}

pub async fn run_history(
    filter: HistoryFilter,
    limit: usize,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let entries: Vec<ChangeLogEntry> = match filter {
        HistoryFilter::All => db.changes_since(0).await?.into_iter().rev().collect(),
        HistoryFilter::Unsynced => db.unsynced_changes().await?,
        HistoryFilter::Entity(entity_type, id) => {
            db.entity_history(entity_type, id.trim()).await?
        }
        HistoryFilter::Project(id) => db.project_history(id.trim()).await?,
        HistoryFilter::Since(value) => db.changes_since(parse_since(&value)?).await?,
    };
    let entries = &entries[..entries.len().min(limit)];

    if as_json {
        let json_items = entries.iter().map(history_to_item).collect::<Vec<HistoryItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No changes recorded.");
        return Ok(());
    }
    for line in format_history_lines(entries) {
        println!("{line}");
    }
    Ok(())
}
