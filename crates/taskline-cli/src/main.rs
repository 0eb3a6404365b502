//! Taskline CLI - offline-first task tracking from the terminal
//!
//! Every change is queued locally first and shipped when a server is configured.

mod cli;
mod commands;
mod error;

use clap::{CommandFactory, Parser};

use crate::cli::{Cli, Commands};
use crate::commands::add::{run_add, AddArgs};
use crate::commands::completions::run_completions;
use crate::commands::delete::run_delete;
use crate::commands::done::run_done;
use crate::commands::edit::{run_edit, EditArgs};
use crate::commands::list::run_list;
use crate::commands::pending::run_pending;
use crate::commands::status::run_status;
use crate::commands::sync::run_sync;
use crate::commands::watch::run_watch;
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
    if let Ok(directive) = "taskline=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let data_dir = cli.data_dir;

    match cli.command {
        Some(Commands::Add {
            title,
            description,
            due,
            folder,
            status,
        }) => {
            let args = AddArgs {
                title,
                description,
                due,
                folder,
                status,
            };
            run_add(args, data_dir).await?;
        }
        Some(Commands::List { all, folder, json }) => {
            run_list(all, folder.as_deref(), json, data_dir).await?;
        }
        Some(Commands::Edit {
            id,
            title,
            description,
            due,
            folder,
            status,
        }) => {
            let args = EditArgs {
                title,
                description,
                due,
                folder,
                status,
            };
            run_edit(&id, args, data_dir).await?;
        }
        Some(Commands::Done { id }) => run_done(&id, data_dir).await?,
        Some(Commands::Delete { id, reason }) => run_delete(&id, reason, data_dir).await?,
        Some(Commands::Pending { json }) => run_pending(json, data_dir).await?,
        Some(Commands::Sync) => run_sync(data_dir).await?,
        Some(Commands::Status { json }) => run_status(json, data_dir).await?,
        Some(Commands::Watch { interval }) => run_watch(interval, data_dir).await?,
        Some(Commands::Completions { shell, output }) => {
            run_completions(shell, output.as_deref())?;
        }
        None => {
            Cli::command().print_help().map_err(CliError::Io)?;
            println!();
        }
    }

    Ok(())
}
