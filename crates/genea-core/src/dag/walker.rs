//! Dependency-ordered commit traversal.
//!
//! The [`CommitWalker`] visits every commit exactly once, and only after all
//! of its parents have been visited. Each commit moves through
//! `Unvisited → Queued → Done`.
//!
//! # Algorithm
//!
//! The frontier is a min-heap ordered by `(timestamp, insertion sequence)`,
//! seeded with the roots. Each step pops candidates until one is
//! processable (all parents `Done`); candidates popped on the way are put
//! back with their original sequence number. After the caller processes the
//! commit it is marked `Done` and its children are offered unless already
//! queued or done.
//!
//! The result is a deterministic, mostly chronological order. It is not a
//! strict global sort by time: a merge waits for its slowest parent, and
//! branches interleave as their timestamps dictate.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use tracing::{debug, instrument};

use crate::model::{Commit, CommitGraph, CommitKey};

/// Traversal state of one commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitState {
    Unvisited,
    Queued,
    Done,
}

/// Fatal walker errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalkError {
    /// The frontier is non-empty but no queued commit has all parents done.
    #[error("commit walker stalled with {pending} queued commits and none processable")]
    Stalled { pending: usize },

    /// The frontier drained before every commit was visited.
    #[error("commit walk visited {visited} of {total} commits")]
    Unreachable { visited: usize, total: usize },
}

/// Callback invoked for each commit in dependency order.
pub trait CommitVisitor {
    type Error: From<WalkError>;

    /// Process one commit. All of its parents have already been visited.
    ///
    /// # Errors
    ///
    /// Any error aborts the walk and is returned from [`CommitWalker::walk`].
    fn visit(&mut self, commit: &Commit) -> Result<(), Self::Error>;
}

/// Summary of a completed walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkSummary {
    /// Commit keys in the order they were visited.
    pub order: Vec<CommitKey>,
}

/// Priority-queue scheduler over a [`CommitGraph`].
#[derive(Debug)]
pub struct CommitWalker<'g> {
    graph: &'g CommitGraph,
    states: Vec<VisitState>,
    frontier: BinaryHeap<Reverse<(i64, u64, CommitKey)>>,
    next_sequence: u64,
    done: usize,
}

impl<'g> CommitWalker<'g> {
    /// Create a walker with the roots of `graph` queued.
    #[must_use]
    pub fn new(graph: &'g CommitGraph) -> Self {
        let mut walker = Self {
            graph,
            states: vec![VisitState::Unvisited; graph.len()],
            frontier: BinaryHeap::new(),
            next_sequence: 0,
            done: 0,
        };
        for root in graph.roots() {
            walker.offer(root);
        }
        walker
    }

    /// Current state of a commit.
    #[must_use]
    pub fn state(&self, key: CommitKey) -> VisitState {
        self.states
            .get(key.index())
            .copied()
            .unwrap_or(VisitState::Unvisited)
    }

    /// Number of commits marked done so far.
    #[must_use]
    pub const fn done_count(&self) -> usize {
        self.done
    }

    /// Pop the next processable commit.
    ///
    /// Returns `Ok(None)` once the frontier is empty.
    ///
    /// # Errors
    ///
    /// Returns [`WalkError::Stalled`] if commits remain queued but none of
    /// them is processable, which only happens on a cyclic input.
    pub fn next_commit(&mut self) -> Result<Option<&'g Commit>, WalkError> {
        let mut deferred = Vec::new();
        let mut found = None;

        while let Some(Reverse(entry)) = self.frontier.pop() {
            if self.is_processable(entry.2) {
                found = Some(entry.2);
                break;
            }
            deferred.push(entry);
        }

        let pending = deferred.len();
        for entry in deferred {
            self.frontier.push(Reverse(entry));
        }

        match found {
            Some(key) => {
                let graph = self.graph;
                Ok(graph.get(key))
            }
            None if pending > 0 => Err(WalkError::Stalled { pending }),
            None => Ok(None),
        }
    }

    /// Mark a commit done and offer its children.
    pub fn mark_done(&mut self, key: CommitKey) {
        let Some(state) = self.states.get_mut(key.index()) else {
            return;
        };
        if *state == VisitState::Done {
            return;
        }
        *state = VisitState::Done;
        self.done += 1;

        let graph = self.graph;
        if let Some(commit) = graph.get(key) {
            for &child in &commit.children {
                if self.state(child) == VisitState::Unvisited {
                    self.offer(child);
                }
            }
        }
    }

    /// Drive `visitor` over every commit in dependency order.
    ///
    /// # Errors
    ///
    /// Propagates visitor errors, and fails with [`WalkError::Unreachable`]
    /// if the walk ends before every commit was visited.
    #[instrument(skip_all, fields(commits = self.graph.len()))]
    pub fn walk<V: CommitVisitor>(mut self, visitor: &mut V) -> Result<WalkSummary, V::Error> {
        let mut order = Vec::with_capacity(self.graph.len());

        while let Some(commit) = self.next_commit()? {
            visitor.visit(commit)?;
            self.mark_done(commit.key);
            order.push(commit.key);
        }

        if self.done != self.graph.len() {
            return Err(WalkError::Unreachable {
                visited: self.done,
                total: self.graph.len(),
            }
            .into());
        }

        debug!(visited = self.done, "commit walk complete");
        Ok(WalkSummary { order })
    }

    fn offer(&mut self, key: CommitKey) {
        let Some(commit) = self.graph.get(key) else {
            return;
        };
        self.states[key.index()] = VisitState::Queued;
        self.frontier
            .push(Reverse((commit.timestamp, self.next_sequence, key)));
        self.next_sequence += 1;
    }

    fn is_processable(&self, key: CommitKey) -> bool {
        self.graph.get(key).is_some_and(|commit| {
            commit
                .parents
                .iter()
                .all(|p| self.state(*p) == VisitState::Done)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CommitRecord;

    fn graph(records: &[(&str, i64, &[&str])]) -> CommitGraph {
        CommitGraph::from_records(records.iter().map(|(h, ts, ps)| CommitRecord {
            hash: (*h).to_string(),
            timestamp: *ts,
            parents: ps.iter().map(|p| (*p).to_string()).collect(),
        }))
        .expect("valid graph")
    }

    struct Recorder<'g> {
        graph: &'g CommitGraph,
        seen: Vec<String>,
    }

    impl CommitVisitor for Recorder<'_> {
        type Error = WalkError;

        fn visit(&mut self, commit: &Commit) -> Result<(), WalkError> {
            for parent in &commit.parents {
                let hash = &self.graph.get(*parent).expect("parent").hash;
                assert!(self.seen.contains(hash), "parent {hash} not yet visited");
            }
            self.seen.push(commit.hash.clone());
            Ok(())
        }
    }

    fn walk_hashes(g: &CommitGraph) -> Vec<String> {
        let mut rec = Recorder {
            graph: g,
            seen: Vec::new(),
        };
        CommitWalker::new(g).walk(&mut rec).expect("walk succeeds");
        rec.seen
    }

    #[test]
    fn linear_history_in_order() {
        let g = graph(&[("a", 1, &[]), ("b", 2, &["a"]), ("c", 3, &["b"])]);
        assert_eq!(walk_hashes(&g), vec!["a", "b", "c"]);
    }

    #[test]
    fn merge_waits_for_late_parent() {
        // `m` is older than `b2` by timestamp but must still come after it.
        let g = graph(&[
            ("r", 1, &[]),
            ("a", 2, &["r"]),
            ("b1", 3, &["r"]),
            ("m", 4, &["a", "b2"]),
            ("b2", 10, &["b1"]),
        ]);
        let order = walk_hashes(&g);
        assert_eq!(order, vec!["r", "a", "b1", "b2", "m"]);
    }

    #[test]
    fn timestamp_ties_break_by_insertion() {
        let g = graph(&[("r", 1, &[]), ("x", 5, &["r"]), ("y", 5, &["r"])]);
        assert_eq!(walk_hashes(&g), vec!["r", "x", "y"]);
    }

    #[test]
    fn child_older_than_parent_still_follows_parent() {
        let g = graph(&[("r", 100, &[]), ("c", 1, &["r"])]);
        assert_eq!(walk_hashes(&g), vec!["r", "c"]);
    }

    #[test]
    fn multiple_roots_are_all_visited() {
        let g = graph(&[("r1", 1, &[]), ("r2", 2, &[]), ("m", 3, &["r1", "r2"])]);
        assert_eq!(walk_hashes(&g), vec!["r1", "r2", "m"]);
    }

    #[test]
    fn every_commit_done_exactly_once() {
        let g = graph(&[
            ("r", 1, &[]),
            ("a", 2, &["r"]),
            ("b", 2, &["r"]),
            ("m1", 3, &["a", "b"]),
            ("m2", 3, &["a", "b"]),
            ("m3", 4, &["m1", "m2"]),
        ]);
        let mut walker = CommitWalker::new(&g);
        let mut visits = vec![0_u32; g.len()];
        while let Some(c) = walker.next_commit().expect("no stall") {
            visits[c.key.index()] += 1;
            walker.mark_done(c.key);
        }
        assert!(visits.iter().all(|v| *v == 1));
        assert_eq!(walker.done_count(), g.len());
        assert!(g.commits().all(|c| walker.state(c.key) == VisitState::Done));
    }

    #[test]
    fn cycle_without_root_is_unreachable() {
        let g = graph(&[("a", 1, &["b"]), ("b", 2, &["a"])]);
        let mut rec = Recorder {
            graph: &g,
            seen: Vec::new(),
        };
        let err = CommitWalker::new(&g).walk(&mut rec).expect_err("no roots");
        assert_eq!(err, WalkError::Unreachable { visited: 0, total: 2 });
    }

    #[test]
    fn cycle_behind_root_stalls() {
        // r → x, x also waits on y, y waits on x.
        let g = graph(&[("r", 1, &[]), ("x", 2, &["r", "y"]), ("y", 3, &["x"])]);
        let mut walker = CommitWalker::new(&g);
        let r = walker.next_commit().expect("root").expect("some");
        walker.mark_done(r.key);
        assert_eq!(
            walker.next_commit().expect_err("stall"),
            WalkError::Stalled { pending: 1 }
        );
    }
}
