//! `genea track`: replay change events and report genealogies.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use genea_core::config::GeneaConfig;
use genea_core::dag::GraphDistance;
use genea_core::genealogy::{Genealogies, GenealogyTracker, ReplayStats, ValidationStats};
use genea_core::io::{read_changes, read_commits, write_genealogies};
use genea_core::model::CommitGraph;
use genea_core::oracle::{CachedOracle, CommandLister};
use serde::Serialize;
use tracing::info;

use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

/// Arguments for `genea track`.
#[derive(Args, Debug)]
pub struct TrackArgs {
    /// Commit records, one JSON object per line.
    #[arg(long, value_name = "JSONL")]
    pub commits: PathBuf,

    /// Change events, one JSON object per line.
    #[arg(long, value_name = "JSONL")]
    pub changes: PathBuf,

    /// Write one genealogy per line to this file.
    #[arg(long, value_name = "JSONL")]
    pub out: Option<PathBuf>,

    /// Validate every merge against the configured function lister.
    #[arg(long)]
    pub validate: bool,
}

#[derive(Debug, Serialize)]
struct TrackReport {
    commits: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    history_start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    history_end: Option<String>,
    genealogies: usize,
    live_genealogies: usize,
    guessed_adds: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    out: Option<String>,
    stats: ReplayStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    validation: Option<ValidationStats>,
}

pub fn open(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    Ok(BufReader::new(file))
}

pub fn load_commits(path: &Path) -> Result<CommitGraph> {
    read_commits(open(path)?).with_context(|| format!("failed to load commits from {}", path.display()))
}

fn rfc3339(timestamp: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp(timestamp, 0).map(|t| t.to_rfc3339())
}

/// Run the tracker over the input files and print a summary.
///
/// # Errors
///
/// Fails on unreadable or invalid input, fatal replay errors, oracle
/// failures during validation, and write errors on `--out`.
pub fn run_track(args: &TrackArgs, config: &GeneaConfig, mode: OutputMode) -> Result<()> {
    let graph = load_commits(&args.commits)?;
    let index = read_changes(open(&args.changes)?, &graph)
        .with_context(|| format!("failed to load changes from {}", args.changes.display()))?;
    info!(commits = graph.len(), changes = index.event_count(), "inputs loaded");

    let mut tracker_config = config.tracker.clone();
    tracker_config.validate_merges |= args.validate;

    let oracle = if tracker_config.validate_merges {
        let lister = CommandLister::new(config.oracle.command.clone())?;
        Some(CachedOracle::new(lister, config.oracle.cache_dir.clone()))
    } else {
        None
    };

    let distance = GraphDistance::new(&graph);
    let mut tracker = GenealogyTracker::new(&graph, &index, &distance, tracker_config);
    if let Some(oracle) = &oracle {
        tracker = tracker.with_oracle(oracle);
    }
    let outcome = tracker.run()?;
    let genealogies = Genealogies::collect(&outcome, &graph, &distance)?;

    if let Some(path) = &args.out {
        let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        let written = write_genealogies(&mut writer, &genealogies)?;
        writer.flush()?;
        info!(path = %path.display(), written, "genealogies written");
    }

    let report = TrackReport {
        commits: graph.len(),
        history_start: graph.commits().map(|c| c.timestamp).min().and_then(rfc3339),
        history_end: graph.commits().map(|c| c.timestamp).max().and_then(rfc3339),
        genealogies: genealogies.len(),
        live_genealogies: genealogies.iter().filter(|g| g.live).count(),
        guessed_adds: genealogies.iter().filter(|g| g.adding_guessed).count(),
        out: args.out.as_ref().map(|p| p.display().to_string()),
        stats: outcome.stats.clone(),
        validation: (outcome.validation.merges_validated > 0).then_some(outcome.validation),
    };

    render_mode(mode, &report, render_text, |r, w| render_pretty(r, &outcome.summary(), w))
}

fn render_text(report: &TrackReport, w: &mut dyn Write) -> io::Result<()> {
    let s = &report.stats;
    writeln!(w, "commits {}", report.commits)?;
    writeln!(w, "branches {}", s.branches())?;
    writeln!(w, "changes {}", s.changes)?;
    writeln!(w, "genealogies {}", report.genealogies)?;
    writeln!(w, "live {}", report.live_genealogies)?;
    writeln!(w, "move_conflicts {}", s.move_conflicts)?;
    writeln!(w, "probable_merge_resolutions {}", s.probable_merge_resolutions)?;
    writeln!(w, "ambiguous_deletions {}", s.ambiguous_deletions)?;
    if let Some(v) = &report.validation {
        writeln!(w, "validated_merges {}", v.merges_validated)?;
        writeln!(w, "missing {}", v.missing)?;
        writeln!(w, "superfluous {}", v.superfluous)?;
    }
    Ok(())
}

fn render_pretty(report: &TrackReport, summary: &str, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, "History")?;
    pretty_kv(w, "commits", report.commits.to_string())?;
    if let (Some(start), Some(end)) = (&report.history_start, &report.history_end) {
        pretty_kv(w, "span", format!("{start} .. {end}"))?;
    }
    pretty_kv(w, "genealogies", report.genealogies.to_string())?;
    pretty_kv(w, "live", report.live_genealogies.to_string())?;
    pretty_kv(w, "guessed adds", report.guessed_adds.to_string())?;
    if let Some(out) = &report.out {
        pretty_kv(w, "written to", out)?;
    }
    writeln!(w)?;
    pretty_section(w, "Replay")?;
    writeln!(w, "{summary}")
}
