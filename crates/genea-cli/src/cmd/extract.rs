//! `genea extract`: derive change events from recorded diffs and spans.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use genea_core::config::GeneaConfig;
use genea_core::extract::Extractor;
use genea_core::io::{RecordedDiffs, RecordedSpans, write_changes};
use serde::Serialize;
use tracing::info;

use super::track::{load_commits, open};
use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

/// Arguments for `genea extract`.
#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// Commit records, one JSON object per line.
    #[arg(long, value_name = "JSONL")]
    pub commits: PathBuf,

    /// Diff records keyed by commit and parent hash.
    #[arg(long, value_name = "JSONL")]
    pub diffs: PathBuf,

    /// Function span records keyed by commit hash and path.
    #[arg(long, value_name = "JSONL")]
    pub spans: PathBuf,

    /// Destination for the change events.
    #[arg(long, value_name = "JSONL")]
    pub out: PathBuf,
}

#[derive(Debug, Serialize)]
struct ExtractReport {
    commits: usize,
    events: usize,
    workers: usize,
    span_cache_hits: u64,
    span_cache_misses: u64,
    out: String,
}

/// Run extraction and write one change event per line to `--out`.
///
/// # Errors
///
/// Fails on unreadable or invalid input, on the first failed
/// (commit, parent) job, and on write errors.
pub fn run_extract(args: &ExtractArgs, config: &GeneaConfig, mode: OutputMode) -> Result<()> {
    let graph = load_commits(&args.commits)?;
    let diffs = RecordedDiffs::read(open(&args.diffs)?)
        .with_context(|| format!("failed to load diffs from {}", args.diffs.display()))?;
    let spans = RecordedSpans::read(open(&args.spans)?)
        .with_context(|| format!("failed to load spans from {}", args.spans.display()))?;

    let extractor = Extractor::new(diffs, spans, config.extract.clone());
    let index = extractor.run(&graph)?;

    let file = File::create(&args.out).with_context(|| format!("failed to create {}", args.out.display()))?;
    let mut writer = BufWriter::new(file);
    let events = write_changes(&mut writer, &index, &graph)?;
    writer.flush()?;
    info!(path = %args.out.display(), events, "change events written");

    let (hits, misses) = extractor.span_cache().hit_counts();
    let report = ExtractReport {
        commits: graph.len(),
        events,
        workers: config.extract.workers,
        span_cache_hits: hits,
        span_cache_misses: misses,
        out: args.out.display().to_string(),
    };
    render_mode(mode, &report, render_text, render_pretty)
}

fn render_text(report: &ExtractReport, w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "commits {}", report.commits)?;
    writeln!(w, "events {}", report.events)?;
    writeln!(w, "out {}", report.out)
}

fn render_pretty(report: &ExtractReport, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, "Extraction")?;
    pretty_kv(w, "commits", report.commits.to_string())?;
    pretty_kv(w, "events", report.events.to_string())?;
    pretty_kv(w, "workers", report.workers.to_string())?;
    pretty_kv(w, "span cache", format!("{} hits, {} misses", report.span_cache_hits, report.span_cache_misses))?;
    pretty_kv(w, "written to", &report.out)
}
