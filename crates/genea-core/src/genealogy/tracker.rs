//! Genealogy tracker: drives the commit walk and replays every change.
//!
//! For each commit in walk order the tracker picks the owning branch
//! (root, inherited, split or merge), dispatches the commit's events to
//! that branch and then freezes a pre-merge shadow for every merge child
//! of the commit. Merge commits can optionally be validated against a
//! [`FunctionOracle`]; validation only logs and counts.

use std::collections::{BTreeSet, HashSet};

use tracing::{debug, info, info_span, instrument, warn};

use crate::config::TrackerConfig;
use crate::dag::{CommitDistance, CommitVisitor, CommitWalker, DistanceError, WalkError};
use crate::error::ErrorCode;
use crate::event::ChangeIndex;
use crate::model::{Commit, CommitGraph, CommitKey, FunctionId};
use crate::oracle::{FunctionOracle, OracleError};

use super::branch::{Branch, BranchArena, BranchError, BranchId, BranchKind};
use super::handle::HandleArena;
use super::resolve::ReplayState;
use super::stats::{MergeValidation, ReplayStats, ValidationStats};
use super::table::{FunctionTable, HashFunctionTable};

/// Fatal tracker errors. Every variant aborts the run.
#[derive(Debug, thiserror::Error)]
pub enum TrackError {
    #[error(transparent)]
    Walk(#[from] WalkError),

    #[error(transparent)]
    Branch(#[from] BranchError),

    /// A commit needs its parent's branch, which was never assigned.
    #[error("commit {commit} has no branch")]
    MissingBranch { commit: String },

    /// A merge parent's branch has no shadow for the merge.
    #[error("branch {branch} has no pre-merge shadow for merge commit {merge}")]
    MissingShadow { branch: BranchId, merge: String },

    /// A shadow's tip is not the merge parent it stands for.
    #[error("merge {merge}: parent {parent} does not match pre-merge branch tip {shadow_tip}")]
    MergeParentMismatch {
        merge: String,
        parent: String,
        shadow_tip: String,
    },

    #[error("distance lookup failed while merging {commit}: {source}")]
    Distance {
        commit: String,
        #[source]
        source: DistanceError,
    },

    #[error("listing functions at {commit} failed: {source}")]
    Oracle {
        commit: String,
        #[source]
        source: OracleError,
    },
}

impl TrackError {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Walk(WalkError::Stalled { .. }) => ErrorCode::WalkStalled,
            Self::Walk(WalkError::Unreachable { .. }) => ErrorCode::CommitUnreachable,
            Self::Branch(BranchError::DuplicateShadow { .. }) => ErrorCode::DuplicateShadow,
            Self::Branch(BranchError::UnknownBranch(_)) => ErrorCode::InternalUnexpected,
            Self::MissingBranch { .. } => ErrorCode::MissingBranch,
            Self::MissingShadow { .. } => ErrorCode::MissingShadow,
            Self::MergeParentMismatch { .. } => ErrorCode::MergeParentMismatch,
            Self::Distance { .. } => ErrorCode::DistanceOracleFailed,
            Self::Oracle { .. } => ErrorCode::FunctionOracleFailed,
        }
    }
}

/// Everything a finished replay leaves behind.
#[derive(Debug, Clone)]
pub struct TrackOutcome<T: FunctionTable = HashFunctionTable> {
    pub branches: BranchArena<T>,
    pub handles: HandleArena,
    pub stats: ReplayStats,
    pub validation: ValidationStats,
    /// Commits in the order they were replayed.
    pub order: Vec<CommitKey>,
}

impl<T: FunctionTable> TrackOutcome<T> {
    /// Branch that directly contains `commit`.
    #[must_use]
    pub fn branch_at(&self, commit: CommitKey) -> Option<&Branch<T>> {
        self.branches.branch_of(commit).and_then(|id| self.branches.get(id))
    }

    /// Branches no other branch continues from: the heads of history.
    pub fn tips(&self) -> impl Iterator<Item = &Branch<T>> {
        let continued: HashSet<BranchId> = self
            .branches
            .iter()
            .flat_map(|b| b.parents.iter().copied())
            .collect();
        self.branches
            .iter()
            .filter(move |b| !b.is_shadow() && !continued.contains(&b.id))
    }

    /// Human-readable run summary.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.validation.merges_validated == 0 {
            self.stats.to_string()
        } else {
            format!("{}\n{}", self.stats, self.validation)
        }
    }
}

/// Replays a change index over a commit graph.
pub struct GenealogyTracker<'g, T: FunctionTable = HashFunctionTable> {
    graph: &'g CommitGraph,
    changes: &'g ChangeIndex,
    distance: &'g dyn CommitDistance,
    oracle: Option<&'g dyn FunctionOracle>,
    config: TrackerConfig,
    state: ReplayState<T>,
    validation: ValidationStats,
}

impl<'g> GenealogyTracker<'g> {
    #[must_use]
    pub fn new(
        graph: &'g CommitGraph,
        changes: &'g ChangeIndex,
        distance: &'g dyn CommitDistance,
        config: TrackerConfig,
    ) -> Self {
        Self::with_table(graph, changes, distance, config)
    }
}

impl<'g, T: FunctionTable> GenealogyTracker<'g, T> {
    /// Tracker over a custom [`FunctionTable`] implementation.
    #[must_use]
    pub fn with_table(
        graph: &'g CommitGraph,
        changes: &'g ChangeIndex,
        distance: &'g dyn CommitDistance,
        config: TrackerConfig,
    ) -> Self {
        let state = ReplayState::new(graph.len(), config.lineage_search_limit);
        Self {
            graph,
            changes,
            distance,
            oracle: None,
            config,
            state,
            validation: ValidationStats::default(),
        }
    }

    /// Validate merges against `oracle` when `validate_merges` is set.
    #[must_use]
    pub fn with_oracle(mut self, oracle: &'g dyn FunctionOracle) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Replay the whole history.
    ///
    /// # Errors
    ///
    /// Returns the first fatal [`TrackError`]. Data anomalies never fail a run.
    #[instrument(skip_all, fields(commits = self.graph.len(), changes = self.changes.event_count()))]
    pub fn run(mut self) -> Result<TrackOutcome<T>, TrackError> {
        info!("replaying history");
        let graph = self.graph;
        let summary = CommitWalker::new(graph).walk(&mut self)?;

        let outcome = TrackOutcome {
            branches: self.state.branches,
            handles: self.state.handles,
            stats: self.state.stats,
            validation: self.validation,
            order: summary.order,
        };
        info!(
            branches = outcome.stats.branches(),
            changes = outcome.stats.changes,
            move_conflicts = outcome.stats.move_conflicts,
            probable_merge_resolutions = outcome.stats.probable_merge_resolutions,
            "replay complete"
        );
        Ok(outcome)
    }

    fn assign_branch(&mut self, commit: &Commit) -> Result<BranchId, TrackError> {
        let changes = self.changes;
        let events = changes.for_commit(commit.key);

        let branch = match commit.parents.as_slice() {
            [] => {
                self.state.stats.count_branch(BranchKind::Root);
                self.state.branches.create_root(commit.key)
            }
            [parent] => {
                let owner = self
                    .state
                    .branches
                    .branch_of(*parent)
                    .ok_or_else(|| TrackError::MissingBranch {
                        commit: commit.short_hash().to_string(),
                    })?;
                let siblings = self.graph.get(*parent).map_or(0, |p| p.children.len());
                if siblings == 1 {
                    self.state.branches.extend(owner, commit.key);
                    owner
                } else {
                    self.state.stats.count_branch(BranchKind::Split);
                    self.state.branches.create_split(owner, commit.key)
                }
            }
            _ => {
                let branch = self.state.merge(self.graph, self.distance, commit, events)?;
                self.validate(commit, branch)?;
                return Ok(branch);
            }
        };

        let mut deleted_now = HashSet::new();
        for event in events {
            self.state.apply(self.graph, branch, event, &mut deleted_now)?;
        }
        Ok(branch)
    }

    fn create_shadows(&mut self, commit: &Commit, branch: BranchId) -> Result<(), TrackError> {
        for &child in &commit.children {
            if self.graph.get(child).is_some_and(Commit::is_merge) {
                self.state.branches.create_pre_merge(branch, child)?;
                self.state
                    .stats
                    .count_branch(BranchKind::PreMerge { merge_commit: child });
            }
        }
        Ok(())
    }

    fn validate(&mut self, commit: &Commit, branch: BranchId) -> Result<(), TrackError> {
        let Some(oracle) = self.oracle.filter(|_| self.config.validate_merges) else {
            return Ok(());
        };
        let span = info_span!("validate", commit = commit.short_hash());
        let _guard = span.enter();

        let actual = oracle
            .list_function_ids(commit)
            .map_err(|source| TrackError::Oracle {
                commit: commit.short_hash().to_string(),
                source,
            })?;
        let computed: HashSet<FunctionId> = self
            .state
            .branch(branch)?
            .table
            .live()
            .map(|(id, _)| id.clone())
            .collect();

        let result = compare_live(&computed, &actual);
        if result.missing + result.superfluous > 0 {
            let limit = self.config.max_reported_discrepancies;
            let missing: BTreeSet<&FunctionId> = actual.difference(&computed).collect();
            let superfluous: BTreeSet<&FunctionId> = computed.difference(&actual).collect();
            warn!(
                matching = result.matching,
                missing = result.missing,
                superfluous = result.superfluous,
                "merge table differs from actual functions"
            );
            for id in missing.iter().take(limit) {
                debug!(function = %id, "missing");
            }
            for id in superfluous.iter().take(limit) {
                debug!(function = %id, "superfluous");
            }
        } else {
            debug!(matching = result.matching, "merge table matches actual functions");
        }
        self.validation.add(result);
        Ok(())
    }
}

/// Compare a computed live set with the actual functions at a commit.
#[must_use]
pub fn compare_live(computed: &HashSet<FunctionId>, actual: &HashSet<FunctionId>) -> MergeValidation {
    let count = |n: usize| u64::try_from(n).unwrap_or(u64::MAX);
    MergeValidation {
        matching: count(computed.intersection(actual).count()),
        missing: count(actual.difference(computed).count()),
        superfluous: count(computed.difference(actual).count()),
    }
}

impl<T: FunctionTable> CommitVisitor for GenealogyTracker<'_, T> {
    type Error = TrackError;

    fn visit(&mut self, commit: &Commit) -> Result<(), TrackError> {
        self.state.stats.commits += 1;
        let branch = self.assign_branch(commit)?;
        debug!(
            commit = commit.short_hash(),
            %branch,
            events = self.changes.for_commit(commit.key).len(),
            "commit replayed"
        );
        self.create_shadows(commit, branch)
    }
}
