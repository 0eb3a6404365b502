use std::io::{self, Write};
use std::path::Path;

use clap::CommandFactory;
use clap_complete::aot::Generator;
use clap_complete::{generate, shells};

use crate::cli::{Cli, CompletionShell};
use crate::error::CliError;

const BIN_NAME: &str = "taskline";

/// Completion script for `shell`
pub fn render_completions(shell: CompletionShell) -> Vec<u8> {
    let mut command = Cli::command();
    match shell {
        CompletionShell::Bash => render_with(shells::Bash, &mut command),
        CompletionShell::Zsh => render_with(shells::Zsh, &mut command),
        CompletionShell::Fish => render_with(shells::Fish, &mut command),
    }
}

pub fn run_completions(shell: CompletionShell, output_path: Option<&Path>) -> Result<(), CliError> {
    let script = render_completions(shell);

    match output_path {
        Some(path) => {
            if let Some(parent) = path
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
            {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &script)?;
            println!("{}", path.display());
        }
        None => io::stdout().write_all(&script)?,
    }
    Ok(())
}

fn render_with<G: Generator>(generator: G, command: &mut clap::Command) -> Vec<u8> {
    let mut buffer = Vec::new();
    generate(generator, command, BIN_NAME, &mut buffer);
    buffer
}
