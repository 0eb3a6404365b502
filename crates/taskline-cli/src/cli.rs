use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "taskline")]
#[command(about = "Track tasks offline and sync them when a connection is available")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Directory holding the command log and the local database
    #[arg(long, global = true, value_name = "PATH")]
    pub data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new task
    #[command(alias = "new")]
    Add {
        /// Task title
        title: Vec<String>,
        /// Longer description
        #[arg(short, long)]
        description: Option<String>,
        /// Due date (YYYY-MM-DD or RFC 3339)
        #[arg(long, value_name = "DATE")]
        due: Option<String>,
        /// Folder id
        #[arg(long, value_name = "ID")]
        folder: Option<String>,
        /// Initial status (pending, in_progress, completed)
        #[arg(long)]
        status: Option<String>,
    },
    /// List tasks
    #[command(alias = "ls")]
    List {
        /// Include completed tasks
        #[arg(short, long)]
        all: bool,
        /// Only tasks in this folder
        #[arg(long, value_name = "ID")]
        folder: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change fields of an existing task
    Edit {
        /// Task ID or unique ID prefix
        id: String,
        #[arg(long)]
        title: Option<String>,
        /// New description; an empty value clears it
        #[arg(short, long)]
        description: Option<String>,
        /// New due date; `none` clears it
        #[arg(long, value_name = "DATE")]
        due: Option<String>,
        /// New folder id; `none` clears it
        #[arg(long, value_name = "ID")]
        folder: Option<String>,
        #[arg(long)]
        status: Option<String>,
    },
    /// Mark a task completed
    Done {
        /// Task ID or unique ID prefix
        id: String,
    },
    /// Delete a task
    #[command(alias = "rm")]
    Delete {
        /// Task ID or unique ID prefix
        id: String,
        /// Reason sent along with the delete
        #[arg(long)]
        reason: Option<String>,
    },
    /// Show commands waiting to be synced
    Pending {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Sync with the configured server
    Sync,
    /// Show sync status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Keep syncing on a timer until interrupted
    Watch {
        /// Seconds between rounds; overrides TASKLINE_SYNC_INTERVAL_SECS
        #[arg(long, value_name = "SECS")]
        interval: Option<u64>,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Write completions to a file instead of stdout
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
