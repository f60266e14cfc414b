//! Thread-safe function span cache keyed by (commit, file path).
//!
//! A file version is usually needed twice: as the new side of one commit's
//! diff and as the old side of each child's diff. Workers share one
//! [`SpanCache`] so each version is parsed once.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::trace;

use super::source::{ExtractError, FunctionSpan, SpanSource};
use crate::model::{Commit, CommitKey};

/// Memoizing wrapper around a [`SpanSource`].
#[derive(Debug)]
pub struct SpanCache<S> {
    source: S,
    spans: DashMap<(CommitKey, String), Arc<Vec<FunctionSpan>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<S: SpanSource> SpanCache<S> {
    #[must_use]
    pub fn new(source: S) -> Self {
        Self {
            source,
            spans: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Function spans of `path` at `commit`.
    ///
    /// Two workers missing on the same key may both query the source; the
    /// later insert wins and both results are equal.
    ///
    /// # Errors
    ///
    /// Propagates the source's failure. Failures are not cached.
    pub fn spans(&self, commit: &Commit, path: &str) -> Result<Arc<Vec<FunctionSpan>>, ExtractError> {
        let key = (commit.key, path.to_string());
        if let Some(hit) = self.spans.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(hit.value()));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        trace!(commit = commit.short_hash(), path, "parsing function spans");
        let spans = Arc::new(self.source.function_spans(commit, path)?);
        self.spans.insert(key, Arc::clone(&spans));
        Ok(spans)
    }

    /// Cached (commit, path) entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// `(hits, misses)` so far.
    #[must_use]
    pub fn hit_counts(&self) -> (u64, u64) {
        (self.hits.load(Ordering::Relaxed), self.misses.load(Ordering::Relaxed))
    }
}
