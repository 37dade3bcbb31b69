use std::path::Path;

use taskey_core::models::{NewTask, TaskUpdate};

use crate::commands::common::{format_task_lines, join_words, open_database};
use crate::error::CliError;

/// Optional attributes for a new task
#[derive(Debug, Default)]
pub struct TaskDraft {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<String>,
    pub tags: Vec<String>,
}

pub async fn run_task_list(
    project_id: Option<&str>,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let tasks = db.list_tasks(project_id.map(str::trim)).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&tasks)?);
    } else if tasks.is_empty() {
        println!("No tasks.");
    } else {
        for line in format_task_lines(&tasks) {
            println!("{line}");
        }
    }
    Ok(())
}

pub fn build_new_task(
    project_id: &str,
    title_parts: &[String],
    draft: TaskDraft,
) -> Result<NewTask, CliError> {
    let project_id = project_id.trim();
    if project_id.is_empty() {
        return Err(CliError::EmptyValue("Project id"));
    }
    let mut task = NewTask::new(project_id, join_words(title_parts, "Task title")?);
    if let Some(status) = draft.status {
        task = task.with_status(status.trim());
    }
    if let Some(priority) = draft.priority {
        task.priority = priority;
    }
    if let Some(description) = draft.description {
        task.description = description;
    }
    task.due_date = draft.due_date;
    task.tags = draft.tags;
    Ok(task)
}

pub async fn run_task_add(
    project_id: &str,
    title_parts: &[String],
    draft: TaskDraft,
    db_path: &Path,
) -> Result<(), CliError> {
    let task = build_new_task(project_id, title_parts, draft)?;
    let db = open_database(db_path).await?;
    let created = db.create_task(&task).await?;
    println!("{}", created.id);
    Ok(())
}

pub async fn run_task_update(
    id: &str,
    update: &TaskUpdate,
    db_path: &Path,
) -> Result<(), CliError> {
    if update.is_empty() {
        return Err(CliError::NothingToUpdate);
    }
    let db = open_database(db_path).await?;
    let task = db.update_task(id.trim(), update).await?;
    println!("{}", task.id);
    Ok(())
}

pub async fn run_task_move(
    id: &str,
    status: &str,
    progress: Option<i64>,
    db_path: &Path,
) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let task = db.move_task(id.trim(), status.trim(), progress).await?;
    println!("{} -> {}", task.id, task.status);
    Ok(())
}

pub async fn run_task_delete(id: &str, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    db.delete_task(id.trim()).await?;
    println!("{}", id.trim());
    Ok(())
}
