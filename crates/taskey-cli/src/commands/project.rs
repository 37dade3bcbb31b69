use std::path::Path;

use taskey_core::models::{NewProject, ProjectUpdate};

use crate::commands::common::{format_project_lines, join_words, open_database};
use crate::error::CliError;

pub async fn run_project_list(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let projects = db.list_projects().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&projects)?);
    } else if projects.is_empty() {
        println!("No projects yet.");
    } else {
        for line in format_project_lines(&projects) {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn run_project_add(
    name_parts: &[String],
    color: Option<String>,
    db_path: &Path,
) -> Result<(), CliError> {
    let name = join_words(name_parts, "Project name")?;
    let mut project = NewProject::new(name);
    if let Some(color) = color {
        project = project.with_color(color);
    }

    let db = open_database(db_path).await?;
    let created = db.create_project(&project).await?;
    println!("{}", created.project.id);
    Ok(())
}

pub async fn run_project_rename(
    id: &str,
    name_parts: &[String],
    color: Option<String>,
    db_path: &Path,
) -> Result<(), CliError> {
    let name = (!name_parts.is_empty())
        .then(|| join_words(name_parts, "Project name"))
        .transpose()?;
    let update = ProjectUpdate { name, color };
    if update.name.is_none() && update.color.is_none() {
        return Err(CliError::NothingToUpdate);
    }

    let db = open_database(db_path).await?;
    let project = db.update_project(id.trim(), &update).await?;
    println!("{}", project.id);
    Ok(())
}

pub async fn run_project_delete(id: &str, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let id = id.trim();
    if db.get_project(id).await?.is_none() {
        return Err(CliError::ProjectNotFound(id.to_string()));
    }
    db.delete_project(id).await?;
    println!("{id}");
    Ok(())
}
