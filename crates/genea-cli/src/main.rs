#![forbid(unsafe_code)]

mod cmd;
mod output;

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{CommandFactory, Parser, Subcommand};
use genea_core::config::{self, GeneaConfig};
use output::{CliError, OutputMode};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "genea: function genealogies from commit history",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: ./genea.toml, then the user config).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Output format.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Shorthand for `--format json`.
    #[arg(long, global = true, hide = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Mining",
        about = "Replay change events into function genealogies",
        long_about = "Walk the commit graph, replay per-commit change events over the branch model and \
                      print replay statistics. Genealogies are written as JSON lines when --out is given.",
        after_help = "EXAMPLES:\n    # Replay and print statistics\n    genea track --commits commits.jsonl --changes changes.jsonl\n\n    # Write genealogies and validate merges against the function lister\n    genea track --commits commits.jsonl --changes changes.jsonl --out genealogies.jsonl --validate\n\n    # Emit machine-readable output\n    genea track --commits commits.jsonl --changes changes.jsonl --json"
    )]
    Track(cmd::track::TrackArgs),

    #[command(
        next_help_heading = "Mining",
        about = "Derive change events from recorded diffs and function spans",
        long_about = "Run the pre-extraction stage over every (commit, parent) pair using diff and span \
                      records from JSON-lines files, and write the resulting change events.",
        after_help = "EXAMPLES:\n    # Extract change events with the configured worker count\n    genea extract --commits commits.jsonl --diffs diffs.jsonl --spans spans.jsonl --out changes.jsonl\n\n    # Override the worker count\n    GENEA_WORKERS=2 genea extract --commits commits.jsonl --diffs diffs.jsonl --spans spans.jsonl --out changes.jsonl"
    )]
    Extract(cmd::extract::ExtractArgs),

    #[command(
        next_help_heading = "Setup",
        about = "Generate shell completions",
        after_help = "EXAMPLES:\n    # Install bash completions\n    genea completions bash > ~/.local/share/bash-completion/completions/genea"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("GENEA_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "genea=debug,genea_core=debug,info"
        } else {
            "genea=info,genea_core=info,warn"
        })
    });

    let format = env::var("GENEA_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    if format == "json" {
        registry
            .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().compact().with_writer(std::io::stderr)).init();
    }
}

/// Effective config and output mode for commands that read inputs.
fn settings(cli: &Cli) -> anyhow::Result<(GeneaConfig, OutputMode)> {
    let cwd = env::current_dir()?;
    let (config, source) = config::resolve_config(cli.config.as_deref(), &cwd)?;
    debug!(source = ?source, "config resolved");
    let mode = output::resolve_output_mode(cli.format, cli.json, config.output.as_deref())?;
    Ok((config, mode))
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Track(args) => {
            let (config, mode) = settings(cli)?;
            cmd::track::run_track(args, &config, mode)
        }
        Commands::Extract(args) => {
            let (config, mode) = settings(cli)?;
            cmd::extract::run_extract(args, &config, mode)
        }
        Commands::Completions(args) => {
            let mut command = Cli::command();
            cmd::completions::run_completions(args.shell, &mut command)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let error_mode = if cli.json || cli.format == Some(OutputMode::Json) {
        OutputMode::Json
    } else {
        OutputMode::Text
    };

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let rendered = CliError::from_anyhow(&err);
            if output::render_error(error_mode, &rendered).is_err() {
                eprintln!("error: {err:#}");
            }
            ExitCode::FAILURE
        }
    }
}
