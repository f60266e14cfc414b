use std::io::Write;

use anyhow::{Context, Result};
use clap::Args;
use clap_complete::{Shell, generate};

/// Arguments for `genea completions`.
#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Target shell.
    #[arg(value_enum)]
    pub shell: Shell,
}

/// Write the completion script for `shell` to stdout.
///
/// # Errors
///
/// Returns an error if writing to stdout fails.
pub fn run_completions(shell: Shell, command: &mut clap::Command) -> Result<()> {
    write_completions(shell, command, &mut std::io::stdout().lock())
}

fn write_completions(shell: Shell, command: &mut clap::Command, out: &mut impl Write) -> Result<()> {
    let mut script = Vec::new();
    generate(shell, command, "genea", &mut script);
    out.write_all(&script).context("failed to write completion script")?;
    out.flush().context("failed to write completion script")?;
    Ok(())
}
