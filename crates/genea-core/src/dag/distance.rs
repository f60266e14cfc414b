//! Ancestor/descendant and minimum-distance queries over commits.
//!
//! The tracker only depends on the [`CommitDistance`] contract; a
//! precomputed service can stand in for [`GraphDistance`], the in-memory
//! implementation used by default.
//!
//! # Contract
//!
//! - `is_descendant` is irreflexive (a commit is not its own descendant)
//!   and transitive.
//! - `min_distance(a, b)` is the minimum number of edges between `a` and
//!   `b` when one is reachable from the other, otherwise `None`.
//! - `filter_ancestor_commits(set)` keeps the commits of `set` that are not
//!   descendants of any other commit of `set`: the oldest candidates.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::rc::Rc;

use crate::model::{CommitGraph, CommitKey};

/// Errors from a commit-distance backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DistanceError {
    /// The backend does not know this commit.
    #[error("commit {0} is unknown to the distance oracle")]
    UnknownCommit(CommitKey),

    /// The backend itself failed (I/O, corrupt precomputation, ...).
    #[error("distance backend failed: {0}")]
    Backend(String),
}

/// Read-only commit-distance service.
pub trait CommitDistance {
    /// Whether `descendant` is reachable from `ancestor` by following child
    /// links. Always `false` when the two are equal.
    ///
    /// # Errors
    ///
    /// Returns a [`DistanceError`] if either commit is unknown or the backend fails.
    fn is_descendant(&self, descendant: CommitKey, ancestor: CommitKey) -> Result<bool, DistanceError>;

    /// Minimum number of edges between `a` and `b` in either direction.
    ///
    /// # Errors
    ///
    /// Returns a [`DistanceError`] if either commit is unknown or the backend fails.
    fn min_distance(&self, a: CommitKey, b: CommitKey) -> Result<Option<u32>, DistanceError>;

    /// Keep only commits that do not descend from another commit of the set.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`Self::is_descendant`].
    fn filter_ancestor_commits(
        &self,
        commits: &BTreeSet<CommitKey>,
    ) -> Result<BTreeSet<CommitKey>, DistanceError> {
        let mut oldest = BTreeSet::new();
        'candidates: for &candidate in commits {
            for &other in commits {
                if other != candidate && self.is_descendant(candidate, other)? {
                    continue 'candidates;
                }
            }
            oldest.insert(candidate);
        }
        Ok(oldest)
    }
}

/// Default cap on ancestor entries held across all memoized tables.
const MEMO_ENTRY_BUDGET: usize = 1 << 22;

#[derive(Debug, Default)]
struct Memo {
    tables: HashMap<CommitKey, Rc<HashMap<CommitKey, u32>>>,
    entries: usize,
}

/// In-memory [`CommitDistance`] backed by a [`CommitGraph`].
///
/// Ancestor distance tables are computed lazily by breadth-first search up
/// the parent links and memoized per commit. The memo is reset whenever the
/// total number of stored ancestor entries would exceed the budget.
#[derive(Debug)]
pub struct GraphDistance<'g> {
    graph: &'g CommitGraph,
    memo: RefCell<Memo>,
    budget: usize,
}

impl<'g> GraphDistance<'g> {
    #[must_use]
    pub fn new(graph: &'g CommitGraph) -> Self {
        Self::with_memo_budget(graph, MEMO_ENTRY_BUDGET)
    }

    /// Like [`Self::new`], holding at most `budget` memoized ancestor entries.
    #[must_use]
    pub fn with_memo_budget(graph: &'g CommitGraph, budget: usize) -> Self {
        Self {
            graph,
            memo: RefCell::new(Memo::default()),
            budget,
        }
    }

    /// Minimum edge count from `key` up to each of its ancestors.
    fn ancestor_distances(&self, key: CommitKey) -> Result<Rc<HashMap<CommitKey, u32>>, DistanceError> {
        if let Some(table) = self.memo.borrow().tables.get(&key) {
            return Ok(Rc::clone(table));
        }
        if self.graph.get(key).is_none() {
            return Err(DistanceError::UnknownCommit(key));
        }

        let mut distances: HashMap<CommitKey, u32> = HashMap::new();
        let mut queue: VecDeque<(CommitKey, u32)> = VecDeque::new();
        queue.push_back((key, 0));

        while let Some((current, depth)) = queue.pop_front() {
            let Some(commit) = self.graph.get(current) else {
                continue;
            };
            for &parent in &commit.parents {
                if parent != key && !distances.contains_key(&parent) {
                    distances.insert(parent, depth + 1);
                    queue.push_back((parent, depth + 1));
                }
            }
        }

        let table = Rc::new(distances);
        let size = table.len().max(1);
        let mut memo = self.memo.borrow_mut();
        if memo.entries.saturating_add(size) > self.budget {
            memo.tables.clear();
            memo.entries = 0;
        }
        if size <= self.budget {
            memo.entries += size;
            memo.tables.insert(key, Rc::clone(&table));
        }
        Ok(table)
    }

    fn ensure_known(&self, key: CommitKey) -> Result<(), DistanceError> {
        if self.graph.get(key).is_some() {
            Ok(())
        } else {
            Err(DistanceError::UnknownCommit(key))
        }
    }
}

impl CommitDistance for GraphDistance<'_> {
    fn is_descendant(&self, descendant: CommitKey, ancestor: CommitKey) -> Result<bool, DistanceError> {
        self.ensure_known(ancestor)?;
        if descendant == ancestor {
            self.ensure_known(descendant)?;
            return Ok(false);
        }
        Ok(self.ancestor_distances(descendant)?.contains_key(&ancestor))
    }

    fn min_distance(&self, a: CommitKey, b: CommitKey) -> Result<Option<u32>, DistanceError> {
        self.ensure_known(a)?;
        self.ensure_known(b)?;
        if a == b {
            return Ok(Some(0));
        }
        if let Some(d) = self.ancestor_distances(a)?.get(&b) {
            return Ok(Some(*d));
        }
        Ok(self.ancestor_distances(b)?.get(&a).copied())
    }
}
