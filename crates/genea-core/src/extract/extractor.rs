//! Parallel change extraction over a whole commit graph.

use tracing::{debug, info, instrument};

use super::cache::SpanCache;
use super::changes::derive_changes;
use super::pool::run_bounded;
use super::source::{DiffSource, ExtractError, SpanSource};
use crate::config::ExtractConfig;
use crate::event::{ChangeEvent, ChangeIndex};
use crate::model::{Commit, CommitGraph, CommitKey};

/// Runs one diff job per (commit, parent) pair and collects the events.
///
/// Root commits get a single job diffed against the empty tree. A merge
/// gets one job per parent, so the same edit may be reported once for
/// each side it differs from.
pub struct Extractor<D, S> {
    diffs: D,
    spans: SpanCache<S>,
    config: ExtractConfig,
}

impl<D: DiffSource, S: SpanSource> Extractor<D, S> {
    #[must_use]
    pub fn new(diffs: D, spans: S, config: ExtractConfig) -> Self {
        Self {
            diffs,
            spans: SpanCache::new(spans),
            config,
        }
    }

    /// The shared span cache.
    #[must_use]
    pub const fn span_cache(&self) -> &SpanCache<S> {
        &self.spans
    }

    /// Extract every commit's change events.
    ///
    /// # Errors
    ///
    /// Returns the first [`ExtractError`] any job hit; the rest of the run
    /// is cancelled.
    #[instrument(skip_all, fields(commits = graph.len(), workers = self.config.workers))]
    pub fn run(&self, graph: &CommitGraph) -> Result<ChangeIndex, ExtractError> {
        let jobs: Vec<(CommitKey, Option<CommitKey>)> = graph
            .commits()
            .flat_map(|commit| {
                let parents: Vec<Option<CommitKey>> = if commit.is_root() {
                    vec![None]
                } else {
                    commit.parents.iter().copied().map(Some).collect()
                };
                parents.into_iter().map(move |parent| (commit.key, parent))
            })
            .collect();
        info!(jobs = jobs.len(), "extracting changes");

        let per_job = run_bounded(
            jobs,
            self.config.workers,
            self.config.queue_capacity,
            |(commit, parent)| self.extract_pair(graph, commit, parent),
        )?;

        let index = ChangeIndex::from_events(graph.len(), per_job.into_iter().flatten());
        let (hits, misses) = self.spans.hit_counts();
        info!(events = index.event_count(), span_hits = hits, span_misses = misses, "extraction complete");
        Ok(index)
    }

    fn extract_pair(
        &self,
        graph: &CommitGraph,
        commit: CommitKey,
        parent: Option<CommitKey>,
    ) -> Result<Vec<ChangeEvent>, ExtractError> {
        let lookup = |key: CommitKey| graph.get(key).ok_or(ExtractError::UnknownCommit(key));
        let commit: &Commit = lookup(commit)?;
        let parent: Option<&Commit> = parent.map(lookup).transpose()?;

        let mut events = Vec::new();
        for diff in self.diffs.file_diffs(commit, parent)? {
            let old_spans = match (parent, diff.old_path.as_deref()) {
                (Some(parent), Some(path)) => Some(self.spans.spans(parent, path)?),
                _ => None,
            };
            let new_spans = match diff.new_path.as_deref() {
                Some(path) => Some(self.spans.spans(commit, path)?),
                None => None,
            };
            events.extend(derive_changes(
                commit.key,
                parent.map(|p| p.key),
                &diff,
                old_spans.as_deref().map_or(&[][..], Vec::as_slice),
                new_spans.as_deref().map_or(&[][..], Vec::as_slice),
            ));
        }
        debug!(
            commit = commit.short_hash(),
            parent = parent.map_or("(root)", Commit::short_hash),
            events = events.len(),
            "pair extracted"
        );
        Ok(events)
    }
}
