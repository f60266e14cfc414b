//! Branches: maximal runs of linearly connected commits sharing one
//! function table.
//!
//! # Lifecycle
//!
//! | Kind | Created when | Table starts as |
//! |------|--------------|-----------------|
//! | `Root` | a commit has no parents | empty |
//! | `Split` | the single parent has several children | clone of the parent's table |
//! | `PreMerge` | a branch's tip has a merge child | frozen clone of the parent's table |
//! | `Merge` | a commit has several parents | reconciled from the pre-merge shadows |
//!
//! A commit whose single parent has exactly one child joins the parent's
//! branch. Pre-merge shadows own no commits; they exist so that several
//! merge children of one branch never mutate that branch's table.
//!
//! Branches never remove each other. The arena only grows, and every
//! [`BranchId`] handed out stays valid for the whole run.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use serde::Serialize;

use crate::model::{CommitKey, FunctionId};

use super::handle::HandleId;
use super::table::{FunctionTable, HashFunctionTable};

/// Dense branch identifier, assigned in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BranchId(pub u32);

impl BranchId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// Why a branch was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchKind {
    Root,
    Split,
    Merge,
    /// Snapshot of a parent branch taken right before `merge_commit`.
    PreMerge { merge_commit: CommitKey },
}

impl BranchKind {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Split => "split",
            Self::Merge => "merge",
            Self::PreMerge { .. } => "pre-merge",
        }
    }
}

impl fmt::Display for BranchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One MOVE replayed inside a branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveRecord {
    pub to: FunctionId,
    pub commit: CommitKey,
    pub previous_revision: Option<CommitKey>,
}

/// Fatal branch bookkeeping errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BranchError {
    /// A second pre-merge shadow was requested for the same merge.
    #[error("branch {branch} already has a pre-merge shadow for merge commit {merge_commit}")]
    DuplicateShadow {
        branch: BranchId,
        merge_commit: CommitKey,
    },

    /// A branch id that this arena never handed out.
    #[error("unknown branch {0}")]
    UnknownBranch(BranchId),
}

/// A branch and its private function bookkeeping.
#[derive(Debug, Clone)]
pub struct Branch<T: FunctionTable = HashFunctionTable> {
    pub id: BranchId,
    pub kind: BranchKind,
    /// None for roots, one for splits and shadows, the shadows for merges.
    pub parents: Vec<BranchId>,
    pub first_commit: CommitKey,
    pub last_commit: CommitKey,
    /// Commits directly contained, oldest first.
    pub commits: Vec<CommitKey>,
    pub table: T,
    moves: HashMap<FunctionId, Vec<MoveRecord>>,
    shadows: HashMap<CommitKey, BranchId>,
}

impl<T: FunctionTable> Branch<T> {
    fn new(id: BranchId, kind: BranchKind, parents: Vec<BranchId>, commit: CommitKey, table: T) -> Self {
        Self {
            id,
            kind,
            parents,
            first_commit: commit,
            last_commit: commit,
            commits: Vec::new(),
            table,
            moves: HashMap::new(),
            shadows: HashMap::new(),
        }
    }

    #[must_use]
    pub const fn is_shadow(&self) -> bool {
        matches!(self.kind, BranchKind::PreMerge { .. })
    }

    /// Log a MOVE replayed in this branch.
    pub fn log_move(&mut self, from: FunctionId, record: MoveRecord) {
        self.moves.entry(from).or_default().push(record);
    }

    /// Target of the most recent move away from `from` in this branch.
    #[must_use]
    pub fn last_move_target(&self, from: &FunctionId) -> Option<&FunctionId> {
        self.moves.get(from).and_then(|log| log.last()).map(|m| &m.to)
    }

    /// An earlier move from `from` to `to` in this branch, if any.
    #[must_use]
    pub fn find_move(&self, from: &FunctionId, to: &FunctionId) -> Option<&MoveRecord> {
        self.moves.get(from)?.iter().rev().find(|m| &m.to == to)
    }

    /// Pre-merge shadow created for `merge_commit`.
    #[must_use]
    pub fn shadow_for(&self, merge_commit: CommitKey) -> Option<BranchId> {
        self.shadows.get(&merge_commit).copied()
    }
}

/// Owner of every branch of a run and of the commit → branch mapping.
#[derive(Debug, Clone)]
pub struct BranchArena<T: FunctionTable = HashFunctionTable> {
    branches: Vec<Branch<T>>,
    by_commit: Vec<Option<BranchId>>,
}

impl<T: FunctionTable> BranchArena<T> {
    #[must_use]
    pub fn new(commit_count: usize) -> Self {
        Self {
            branches: Vec::new(),
            by_commit: vec![None; commit_count],
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.branches.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: BranchId) -> Option<&Branch<T>> {
        self.branches.get(id.index())
    }

    pub fn get_mut(&mut self, id: BranchId) -> Option<&mut Branch<T>> {
        self.branches.get_mut(id.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Branch<T>> {
        self.branches.iter()
    }

    /// Branch that directly contains `commit`.
    #[must_use]
    pub fn branch_of(&self, commit: CommitKey) -> Option<BranchId> {
        self.by_commit.get(commit.index()).copied().flatten()
    }

    fn next_id(&self) -> BranchId {
        BranchId(u32::try_from(self.branches.len()).unwrap_or(u32::MAX))
    }

    fn push(&mut self, kind: BranchKind, parents: Vec<BranchId>, commit: CommitKey, table: T) -> BranchId {
        let id = self.next_id();
        self.branches.push(Branch::new(id, kind, parents, commit, table));
        id
    }

    /// Start a root branch at `commit`.
    pub fn create_root(&mut self, commit: CommitKey) -> BranchId {
        let id = self.push(BranchKind::Root, Vec::new(), commit, T::default());
        self.extend(id, commit);
        id
    }

    /// Start a split branch at `commit`, inheriting `parent`'s table.
    pub fn create_split(&mut self, parent: BranchId, commit: CommitKey) -> BranchId {
        let table = self
            .get(parent)
            .map(|p| p.table.clone())
            .unwrap_or_default();
        let id = self.push(BranchKind::Split, vec![parent], commit, table);
        self.extend(id, commit);
        id
    }

    /// Freeze `parent` as it stands right before `merge_commit`.
    ///
    /// # Errors
    ///
    /// Returns [`BranchError::DuplicateShadow`] if `parent` already has a
    /// shadow for `merge_commit`, or [`BranchError::UnknownBranch`].
    pub fn create_pre_merge(&mut self, parent: BranchId, merge_commit: CommitKey) -> Result<BranchId, BranchError> {
        let Some(source) = self.get(parent) else {
            return Err(BranchError::UnknownBranch(parent));
        };
        if source.shadows.contains_key(&merge_commit) {
            return Err(BranchError::DuplicateShadow {
                branch: parent,
                merge_commit,
            });
        }
        let table = source.table.clone();
        let tip = source.last_commit;

        let id = self.push(BranchKind::PreMerge { merge_commit }, vec![parent], tip, table);
        if let Some(source) = self.get_mut(parent) {
            source.shadows.insert(merge_commit, id);
        }
        Ok(id)
    }

    /// Start a merge branch at `commit` from reconciled shadow state.
    pub fn create_merge(&mut self, shadows: Vec<BranchId>, commit: CommitKey, table: T) -> BranchId {
        let id = self.push(BranchKind::Merge, shadows, commit, table);
        self.extend(id, commit);
        id
    }

    /// Append `commit` to `branch`'s direct commits.
    pub fn extend(&mut self, branch: BranchId, commit: CommitKey) {
        if let Some(slot) = self.by_commit.get_mut(commit.index()) {
            *slot = Some(branch);
        } else {
            self.by_commit.resize(commit.index() + 1, None);
            self.by_commit[commit.index()] = Some(branch);
        }
        if let Some(b) = self.get_mut(branch) {
            b.commits.push(commit);
            b.last_commit = commit;
        }
    }

    /// Breadth-first search up the ancestry of `start` for a live handle
    /// of `id`. `start` itself is not searched.
    ///
    /// At most `limit` ancestor branches are inspected; diamond-shaped
    /// ancestry is visited once.
    #[must_use]
    pub fn lineage_lookup(&self, start: BranchId, id: &FunctionId, limit: usize) -> Option<(BranchId, HandleId)> {
        let mut visited: HashSet<BranchId> = HashSet::from([start]);
        let mut queue: VecDeque<BranchId> = self
            .get(start)
            .map(|b| b.parents.iter().copied().collect())
            .unwrap_or_default();
        let mut inspected = 0;

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            if inspected >= limit {
                break;
            }
            inspected += 1;

            let Some(branch) = self.get(current) else {
                continue;
            };
            if let Some(handle) = branch.table.lookup(id) {
                return Some((current, handle));
            }
            queue.extend(branch.parents.iter().copied());
        }
        None
    }
}
