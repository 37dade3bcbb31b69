use std::path::Path;

use taskey_core::models::NewColumn;

use crate::commands::common::{join_words, open_database};
use crate::error::CliError;

pub async fn run_column_add(
    project_id: &str,
    column_id: &str,
    label_parts: &[String],
    is_done: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let column_id = column_id.trim();
    if column_id.is_empty() {
        return Err(CliError::EmptyValue("Column id"));
    }
    let label = join_words(label_parts, "Column label")?;

    let db = open_database(db_path).await?;
    let column = db
        .add_column(project_id.trim(), &NewColumn::new(column_id, label, is_done))
        .await?;
    println!("{}", column.id);
    Ok(())
}

pub async fn run_column_rename(
    project_id: &str,
    column_id: &str,
    label_parts: &[String],
    db_path: &Path,
) -> Result<(), CliError> {
    let label = join_words(label_parts, "Column label")?;
    let db = open_database(db_path).await?;
    let column = db
        .rename_column(project_id.trim(), column_id.trim(), &label)
        .await?;
    println!("{}", column.id);
    Ok(())
}

pub async fn run_column_delete(
    project_id: &str,
    column_id: &str,
    db_path: &Path,
) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let moved = db.delete_column(project_id.trim(), column_id.trim()).await?;
    if moved > 0 {
        println!("{} ({moved} task(s) moved to backlog)", column_id.trim());
    } else {
        println!("{}", column_id.trim());
    }
    Ok(())
}
