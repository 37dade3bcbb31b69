use std::path::PathBuf;

use clap::{Parser, Subcommand};
use taskey_core::models::{ConflictId, ConnectionId, EntityType, Resolution};

#[derive(Parser)]
#[command(name = "taskey")]
#[command(about = "Track tasks locally and sync them with a shared workspace")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage projects
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },
    /// Manage the columns of a project board
    Column {
        #[command(subcommand)]
        command: ColumnCommands,
    },
    /// Manage tasks
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },
    /// Show the local change log, newest first
    History {
        /// Only entries not yet pushed (oldest first)
        #[arg(long, conflicts_with_all = ["entity", "project", "since"])]
        unsynced: bool,
        /// Only entries for one entity id
        #[arg(long, value_name = "ID", conflicts_with_all = ["project", "since"])]
        entity: Option<String>,
        /// Entity kind used with --entity
        #[arg(long, value_name = "KIND", default_value = "task")]
        entity_type: EntityType,
        /// Only entries touching a project
        #[arg(long, value_name = "ID", conflicts_with = "since")]
        project: Option<String>,
        /// Only entries after an RFC 3339 time (oldest first)
        #[arg(long, value_name = "TIME")]
        since: Option<String>,
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Synchronize with a remote workspace
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
}

#[derive(Subcommand)]
pub enum ProjectCommands {
    /// List projects with their columns
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create a project with the default board
    Add {
        /// Project name
        name: Vec<String>,
        /// Badge color
        #[arg(long)]
        color: Option<String>,
    },
    /// Rename or recolor a project
    Rename {
        /// Project id
        id: String,
        /// New name
        name: Vec<String>,
        /// New badge color
        #[arg(long)]
        color: Option<String>,
    },
    /// Delete a project with its columns and tasks
    Delete {
        /// Project id
        id: String,
    },
}

#[derive(Subcommand)]
pub enum ColumnCommands {
    /// Add a column to a project
    Add {
        /// Project id
        project: String,
        /// Column id, also used as the task status
        id: String,
        /// Column label
        label: Vec<String>,
        /// Tasks in this column count as done
        #[arg(long)]
        done: bool,
    },
    /// Rename a column
    Rename {
        /// Project id
        project: String,
        /// Column id
        id: String,
        /// New label
        label: Vec<String>,
    },
    /// Delete a column; its tasks move to backlog
    Delete {
        /// Project id
        project: String,
        /// Column id
        id: String,
    },
}

#[derive(Subcommand)]
pub enum TaskCommands {
    /// List tasks
    List {
        /// Only tasks of this project
        #[arg(long, value_name = "ID")]
        project: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create a task
    Add {
        /// Project id
        project: String,
        /// Task title
        title: Vec<String>,
        /// Column id (defaults to backlog)
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        priority: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Due date (YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        due: Option<String>,
        /// Tag; repeat for several
        #[arg(long = "tag", value_name = "TAG")]
        tags: Vec<String>,
    },
    /// Change task fields
    Update {
        /// Task id
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        priority: Option<String>,
        /// Due date (YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        due: Option<String>,
        /// Due time (HH:MM)
        #[arg(long, value_name = "TIME")]
        due_time: Option<String>,
        #[arg(long)]
        duration: Option<String>,
        /// Progress percentage
        #[arg(long)]
        progress: Option<i64>,
        /// Replace tags; repeat for several
        #[arg(long = "tag", value_name = "TAG")]
        tags: Option<Vec<String>>,
    },
    /// Move a task to another column (or backlog)
    Move {
        /// Task id
        id: String,
        /// Target column id or `backlog`
        status: String,
        /// Progress percentage to set with the move
        #[arg(long)]
        progress: Option<i64>,
    },
    /// Delete a task
    Delete {
        /// Task id
        id: String,
    },
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Join a workspace with a join key
    Join {
        /// Sync server base URL
        server_url: String,
        /// Workspace join key
        join_key: String,
        /// Client name shown to other members
        #[arg(long)]
        name: Option<String>,
    },
    /// Check a join key without joining
    Validate {
        /// Sync server base URL
        server_url: String,
        /// Workspace join key
        join_key: String,
    },
    /// Check that a sync server answers
    Test {
        /// Sync server base URL
        server_url: String,
    },
    /// Show connection and queue status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Push unsynced local changes
    Push,
    /// Pull remote changes
    Pull,
    /// Replace local workspace state with a full server snapshot
    Full,
    /// Send one heartbeat (pulls when the server has updates)
    Heartbeat,
    /// Deactivate a connection, keeping its history
    Disconnect {
        /// Connection id (defaults to the active one)
        #[arg(long, value_name = "ID")]
        connection: Option<ConnectionId>,
    },
    /// Delete a connection and its conflicts
    Remove {
        /// Connection id
        connection: ConnectionId,
    },
    /// List workspace connections
    Connections {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List sync conflicts
    Conflicts {
        /// Include resolved conflicts
        #[arg(long)]
        all: bool,
        /// Only conflicts of this connection
        #[arg(long, value_name = "ID")]
        connection: Option<ConnectionId>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark a conflict resolved
    Resolve {
        /// Conflict id
        id: ConflictId,
        /// `accept` (server value) or `reject` (keep local)
        resolution: Resolution,
    },
    /// Run heartbeat and sync cycles in the foreground until Ctrl-C
    Run,
}
