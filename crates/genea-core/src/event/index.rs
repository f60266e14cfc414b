//! Change events grouped by commit, in replay order.

use super::change::ChangeEvent;
use crate::model::CommitKey;

/// Per-commit change lists, indexed by [`CommitKey`].
///
/// Within one commit, events are stably sorted by `(hunk, kind rank)` so
/// that deletions precede modifications and moves sharing a hunk number.
#[derive(Debug, Clone, Default)]
pub struct ChangeIndex {
    by_commit: Vec<Vec<ChangeEvent>>,
}

impl ChangeIndex {
    /// An index with an empty change list for each of `commit_count` commits.
    #[must_use]
    pub fn new(commit_count: usize) -> Self {
        Self {
            by_commit: vec![Vec::new(); commit_count],
        }
    }

    /// Group `events` by commit and sort each group into replay order.
    ///
    /// Events whose commit key is out of range grow the index.
    #[must_use]
    pub fn from_events(commit_count: usize, events: impl IntoIterator<Item = ChangeEvent>) -> Self {
        let mut index = Self::new(commit_count);
        for event in events {
            index.push(event);
        }
        index.sort();
        index
    }

    /// Append an event without re-sorting. Call [`Self::sort`] afterwards.
    pub fn push(&mut self, event: ChangeEvent) {
        let slot = event.commit.index();
        if slot >= self.by_commit.len() {
            self.by_commit.resize_with(slot + 1, Vec::new);
        }
        self.by_commit[slot].push(event);
    }

    /// Sort every commit's events into replay order.
    pub fn sort(&mut self) {
        for events in &mut self.by_commit {
            events.sort_by_key(|e| (e.hunk, e.kind.replay_rank()));
        }
    }

    /// The replay-ordered events of one commit.
    #[must_use]
    pub fn for_commit(&self, commit: CommitKey) -> &[ChangeEvent] {
        self.by_commit
            .get(commit.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Total number of events.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.by_commit.iter().map(Vec::len).sum()
    }

    /// All events, commit by commit.
    pub fn iter(&self) -> impl Iterator<Item = &ChangeEvent> {
        self.by_commit.iter().flatten()
    }
}
