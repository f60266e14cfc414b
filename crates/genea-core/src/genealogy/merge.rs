//! Merge reconciliation.
//!
//! A merge commit's branch is built from the pre-merge shadows of its
//! parents, in three steps:
//!
//! 1. MODs of the merge commit whose previous revision is exactly one
//!    shadow's tip are replayed on that shadow, where the function they
//!    touch is known. The rest are left over and dispatched on the merge
//!    branch with every other event of the commit.
//! 2. Deletion records of the shadows are reconciled per id. Records
//!    dominated by a causally later record are ignored. An id is *never
//!    deleted* if no surviving record is active, *always deleted* if no
//!    shadow still has it live, and *ambiguous* otherwise. Ambiguous ids
//!    stay alive.
//! 3. Live entries of every shadow are united, minus the always-deleted
//!    ids. When shadows disagree on the handle of an id, the first one wins
//!    the table slot and the others are merged into its identity.

use std::collections::{BTreeSet, HashSet};

use tracing::{debug, info_span, warn};

use crate::dag::CommitDistance;
use crate::event::{ChangeEvent, ModKind};
use crate::model::{Commit, CommitGraph, CommitKey, FunctionId};

use super::branch::{BranchId, BranchKind};
use super::resolve::{ReplayState, short};
use super::table::{DeletionRecord, FunctionTable};
use super::tracker::TrackError;

/// How the shadows of a merge disagree about one deleted id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionVerdict {
    /// No surviving record is active: the function lives on.
    NeverDeleted,
    /// Deleted in every shadow that knows it.
    AlwaysDeleted,
    /// Deleted in some shadows, live in others. Kept alive.
    Ambiguous,
}

impl<T: FunctionTable> ReplayState<T> {
    /// Locate the pre-merge shadow of every parent of `commit`.
    ///
    /// # Errors
    ///
    /// Fails if a parent has no branch or no shadow for this merge, or if a
    /// shadow's tip is not the parent commit.
    pub fn merge_shadows(&self, graph: &CommitGraph, commit: &Commit) -> Result<Vec<BranchId>, TrackError> {
        let mut shadows = Vec::with_capacity(commit.parents.len());
        for &parent in &commit.parents {
            let parent_hash = short(graph, parent).to_string();
            let owner = self
                .branches
                .branch_of(parent)
                .ok_or_else(|| TrackError::MissingBranch {
                    commit: parent_hash.clone(),
                })?;
            let shadow = self
                .branch(owner)?
                .shadow_for(commit.key)
                .ok_or_else(|| TrackError::MissingShadow {
                    branch: owner,
                    merge: commit.short_hash().to_string(),
                })?;
            let tip = self.branch(shadow)?.last_commit;
            if tip != parent {
                return Err(TrackError::MergeParentMismatch {
                    merge: commit.short_hash().to_string(),
                    parent: parent_hash,
                    shadow_tip: short(graph, tip).to_string(),
                });
            }
            shadows.push(shadow);
        }
        Ok(shadows)
    }

    /// Build the merge branch for `commit` and replay its events.
    ///
    /// # Errors
    ///
    /// Propagates shadow lookup failures and distance oracle errors.
    pub fn merge(
        &mut self,
        graph: &CommitGraph,
        distance: &dyn CommitDistance,
        commit: &Commit,
        events: &[ChangeEvent],
    ) -> Result<BranchId, TrackError> {
        let span = info_span!("merge", commit = commit.short_hash(), parents = commit.parents.len());
        let _guard = span.enter();

        let shadows = self.merge_shadows(graph, commit)?;
        let remaining = self.replay_on_shadows(graph, commit, &shadows, events)?;
        let (mut table, always_deleted) = self.reconcile_deletions(graph, distance, commit, &shadows)?;
        self.reconcile_live(graph, commit, &shadows, &always_deleted, &mut table)?;

        let branch = self.branches.create_merge(shadows, commit.key, table);
        self.stats.count_branch(BranchKind::Merge);

        let mut deleted_now = HashSet::new();
        for event in remaining {
            self.apply(graph, branch, event, &mut deleted_now)?;
        }
        Ok(branch)
    }

    /// Step 1. Returns the events still to be dispatched on the merge branch.
    fn replay_on_shadows<'e>(
        &mut self,
        graph: &CommitGraph,
        commit: &Commit,
        shadows: &[BranchId],
        events: &'e [ChangeEvent],
    ) -> Result<Vec<&'e ChangeEvent>, TrackError> {
        let mut remaining = Vec::with_capacity(events.len());
        let mut leftover = 0_u64;

        for event in events {
            if event.kind != ModKind::Mod {
                remaining.push(event);
                continue;
            }
            let target = match event.previous_revision {
                Some(previous) => self.single_shadow_at(shadows, previous)?,
                None => None,
            };
            let known = match target {
                Some(shadow) => self.branch(shadow)?.table.lookup(&event.function).is_some(),
                None => false,
            };
            match target {
                Some(shadow) if known => {
                    let mut deleted_now = HashSet::new();
                    self.apply(graph, shadow, event, &mut deleted_now)?;
                }
                _ => {
                    leftover += 1;
                    remaining.push(event);
                }
            }
        }

        if leftover > 0 {
            warn!(
                commit = commit.short_hash(),
                leftover, "merge changes could not be replayed on a parent, dispatching on merge branch"
            );
            self.stats.leftover_merge_changes += leftover;
        }
        Ok(remaining)
    }

    fn single_shadow_at(&self, shadows: &[BranchId], tip: CommitKey) -> Result<Option<BranchId>, TrackError> {
        let mut found = None;
        for &shadow in shadows {
            if self.branch(shadow)?.last_commit == tip {
                if found.is_some() {
                    return Ok(None);
                }
                found = Some(shadow);
            }
        }
        Ok(found)
    }

    /// Step 2. Returns the merge table seeded with deletion records, and the
    /// always-deleted ids.
    fn reconcile_deletions(
        &mut self,
        graph: &CommitGraph,
        distance: &dyn CommitDistance,
        commit: &Commit,
        shadows: &[BranchId],
    ) -> Result<(T, HashSet<FunctionId>), TrackError> {
        let mut ids: BTreeSet<FunctionId> = BTreeSet::new();
        for &shadow in shadows {
            ids.extend(self.branch(shadow)?.table.deletions().map(|(id, _)| id.clone()));
        }

        let mut table = T::default();
        let mut always_deleted = HashSet::new();

        for id in ids {
            let mut records: Vec<DeletionRecord> = Vec::new();
            let mut alive_in = 0_usize;
            for &shadow in shadows {
                let t = &self.branch(shadow)?.table;
                if let Some(record) = t.deletion(&id) {
                    records.push(*record);
                }
                if t.lookup(&id).is_some() {
                    alive_in += 1;
                }
            }

            let surviving = surviving_records(graph, distance, commit, &records)?;
            let deleted_by: Vec<&DeletionRecord> = surviving.iter().filter(|r| r.active).collect();

            let verdict = if deleted_by.is_empty() {
                DeletionVerdict::NeverDeleted
            } else if alive_in == 0 {
                DeletionVerdict::AlwaysDeleted
            } else {
                DeletionVerdict::Ambiguous
            };

            let kept = deleted_by
                .first()
                .copied()
                .or_else(|| surviving.first())
                .or_else(|| records.first())
                .copied();
            let Some(mut kept) = kept else {
                continue;
            };

            match verdict {
                DeletionVerdict::AlwaysDeleted => {
                    self.stats.always_deleted += 1;
                    always_deleted.insert(id.clone());
                    kept.active = true;
                }
                DeletionVerdict::Ambiguous => {
                    warn!(
                        commit = commit.short_hash(),
                        function = %id,
                        deleted_in = deleted_by.len(),
                        alive_in,
                        "ambiguous deletion across merge parents, keeping function alive"
                    );
                    self.stats.ambiguous_deletions += 1;
                    kept.active = false;
                }
                DeletionVerdict::NeverDeleted => kept.active = false,
            }
            table.tombstone(id, kept);
        }

        Ok((table, always_deleted))
    }

    /// Step 3. Unite the shadows' live entries into `table`.
    fn reconcile_live(
        &mut self,
        graph: &CommitGraph,
        commit: &Commit,
        shadows: &[BranchId],
        always_deleted: &HashSet<FunctionId>,
        table: &mut T,
    ) -> Result<(), TrackError> {
        for &shadow in shadows {
            let entries = self.branch(shadow)?.table.sorted_live();
            for (id, handle) in entries {
                if always_deleted.contains(&id) {
                    continue;
                }
                match table.lookup(&id) {
                    None => {
                        table.insert(id, handle);
                    }
                    Some(existing) if existing != handle => {
                        if self.handles.union(existing, handle) {
                            warn!(
                                commit = commit.short_hash(),
                                function = %id,
                                kept = %existing,
                                merged = %handle,
                                "merge parents disagree on function identity, merging handles"
                            );
                            self.stats.merge_collisions += 1;
                        } else {
                            debug!(
                                commit = short(graph, commit.key),
                                function = %id,
                                "merge parents hold related handles"
                            );
                        }
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(())
    }
}

/// Drop records dominated by another record of the same id.
///
/// A record is dominated when another record's deleting commit descends
/// from its own, or when another record with the same commit has since been
/// revived while this one is still active.
fn surviving_records(
    graph: &CommitGraph,
    distance: &dyn CommitDistance,
    commit: &Commit,
    records: &[DeletionRecord],
) -> Result<Vec<DeletionRecord>, TrackError> {
    let mut surviving = Vec::with_capacity(records.len());
    'records: for (i, record) in records.iter().enumerate() {
        for (j, other) in records.iter().enumerate() {
            if i == j {
                continue;
            }
            if other.commit == record.commit {
                if record.active && !other.active {
                    continue 'records;
                }
                continue;
            }
            let later = distance
                .is_descendant(other.commit, record.commit)
                .map_err(|source| TrackError::Distance {
                    commit: short(graph, commit.key).to_string(),
                    source,
                })?;
            if later {
                continue 'records;
            }
        }
        surviving.push(*record);
    }
    Ok(surviving)
}
