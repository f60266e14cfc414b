//! Per-event function identity resolution.
//!
//! [`ReplayState`] owns every branch, every handle and the replay counters.
//! Its handlers apply one [`ChangeEvent`] to one branch's table:
//!
//! - **ADD**: re-add a live id, revive a deleted one, or create a handle.
//! - **MOD**: find the handle (live, moved, deleted, ancestor branch,
//!   fabricated) and record the change.
//! - **MOVE**: carry the handle from the old id to the new one, merging
//!   identities when the new id is already live under another handle.
//! - **DEL**: drop the live mapping and tombstone the id.
//!
//! Anomalies are logged and counted; none of them stop the replay.
//!
//! # Copy-on-write handles
//!
//! A split or merge branch starts with table entries pointing at handles
//! owned by its ancestors. Before recording a change on such a handle the
//! branch derives its own handle, unioned with the original, and points its
//! table entry at it. Sibling branches therefore never see each other's
//! changes through a shared handle, while the union keeps them in one
//! genealogy.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::event::{ChangeEvent, ModKind};
use crate::model::{Commit, CommitGraph, CommitKey, FunctionId};

use super::branch::{Branch, BranchArena, BranchError, BranchId, MoveRecord};
use super::handle::{HandleArena, HandleId, HandleOrigin};
use super::stats::ReplayStats;
use super::table::{DeletionRecord, FunctionTable, HashFunctionTable};
use super::tracker::TrackError;

/// Mutable bookkeeping of one replay.
#[derive(Debug, Clone)]
pub struct ReplayState<T: FunctionTable = HashFunctionTable> {
    pub branches: BranchArena<T>,
    pub handles: HandleArena,
    pub stats: ReplayStats,
    lineage_limit: usize,
}

pub(crate) fn short(graph: &CommitGraph, key: CommitKey) -> &str {
    graph.get(key).map_or("?", Commit::short_hash)
}

impl<T: FunctionTable> ReplayState<T> {
    /// Empty state for a graph of `commit_count` commits.
    #[must_use]
    pub fn new(commit_count: usize, lineage_limit: usize) -> Self {
        Self {
            branches: BranchArena::new(commit_count),
            handles: HandleArena::new(),
            stats: ReplayStats::default(),
            lineage_limit,
        }
    }

    pub(crate) fn branch(&self, id: BranchId) -> Result<&Branch<T>, TrackError> {
        self.branches
            .get(id)
            .ok_or(TrackError::Branch(BranchError::UnknownBranch(id)))
    }

    pub(crate) fn branch_mut(&mut self, id: BranchId) -> Result<&mut Branch<T>, TrackError> {
        self.branches
            .get_mut(id)
            .ok_or(TrackError::Branch(BranchError::UnknownBranch(id)))
    }

    /// `handle` if `branch` owns it, otherwise a derived branch-local copy.
    fn owned(&mut self, branch: BranchId, handle: HandleId) -> HandleId {
        if self.handles.owner(handle) == branch {
            handle
        } else {
            self.handles.derive(handle, branch)
        }
    }

    fn fabricate(&mut self, graph: &CommitGraph, branch: BranchId, event: &ChangeEvent, id: &FunctionId) -> HandleId {
        warn!(
            commit = short(graph, event.commit),
            %branch,
            kind = %event.kind,
            function = %id,
            "change targets an unknown function, fabricating a handle"
        );
        self.stats.fabricated_handles += 1;
        self.handles.create(branch, HandleOrigin::Fabricated, id.clone())
    }

    /// Apply one event to `branch`.
    ///
    /// `deleted_now` collects the ids deleted so far in the current commit;
    /// a later MOD of one of them is skipped.
    ///
    /// # Errors
    ///
    /// Fails only if `branch` is not part of this state.
    pub fn apply(
        &mut self,
        graph: &CommitGraph,
        branch: BranchId,
        event: &ChangeEvent,
        deleted_now: &mut HashSet<FunctionId>,
    ) -> Result<(), TrackError> {
        self.stats.count_change(event.kind);
        match event.kind {
            ModKind::Add => self.add(graph, branch, event),
            ModKind::Mod => self.modify(graph, branch, event, deleted_now),
            ModKind::Move => self.moved(graph, branch, event, deleted_now),
            ModKind::Del => self.delete(graph, branch, event, deleted_now),
        }
    }

    fn add(&mut self, graph: &CommitGraph, branch: BranchId, event: &ChangeEvent) -> Result<(), TrackError> {
        let id = &event.function;
        let live = self.branch(branch)?.table.lookup(id);
        let revivable = if live.is_none() {
            self.branch_mut(branch)?.table.resurrect(id)
        } else {
            None
        };

        let handle = match (live, revivable) {
            (Some(h), _) => {
                debug!(
                    commit = short(graph, event.commit),
                    function = %id,
                    "duplicate ADD, keeping existing handle"
                );
                self.stats.duplicate_adds += 1;
                h
            }
            (None, Some(h)) => {
                debug!(commit = short(graph, event.commit), function = %id, "ADD revives deleted function");
                self.stats.revived += 1;
                h
            }
            (None, None) => self.handles.create(branch, HandleOrigin::Fresh, id.clone()),
        };

        let handle = self.owned(branch, handle);
        if live.is_some() {
            self.handles.record_duplicate(handle, branch, event.clone());
        } else {
            self.handles.record(handle, branch, event.clone());
        }
        let table = &mut self.branch_mut(branch)?.table;
        table.insert(id.clone(), handle);
        if live.is_some() {
            table.clear_deletion(id);
        }
        Ok(())
    }

    fn modify(
        &mut self,
        graph: &CommitGraph,
        branch: BranchId,
        event: &ChangeEvent,
        deleted_now: &HashSet<FunctionId>,
    ) -> Result<(), TrackError> {
        let id = &event.function;
        if deleted_now.contains(id) {
            debug!(
                commit = short(graph, event.commit),
                function = %id,
                "skipping MOD of function deleted earlier in the same commit"
            );
            self.stats.skipped_mods_after_del += 1;
            return Ok(());
        }

        let (target, handle) = self.locate(graph, branch, event, id)?;
        let handle = self.owned(branch, handle);
        self.handles.record(handle, branch, event.clone());
        let table = &mut self.branch_mut(branch)?.table;
        table.clear_deletion(&target);
        table.insert(target, handle);
        Ok(())
    }

    /// Find the handle a MOD of `id` applies to, and the id it lives under.
    fn locate(
        &mut self,
        graph: &CommitGraph,
        branch: BranchId,
        event: &ChangeEvent,
        id: &FunctionId,
    ) -> Result<(FunctionId, HandleId), TrackError> {
        let b = self.branch(branch)?;
        if let Some(h) = b.table.lookup(id) {
            return Ok((id.clone(), h));
        }
        if let Some(target) = b.last_move_target(id) {
            if let Some(h) = b.table.lookup(target) {
                debug!(
                    commit = short(graph, event.commit),
                    from = %id,
                    to = %target,
                    "MOD resolved through earlier move"
                );
                return Ok((target.clone(), h));
            }
        }
        if let Some(h) = self.branch_mut(branch)?.table.resurrect(id) {
            debug!(commit = short(graph, event.commit), function = %id, "MOD resurrects deleted function");
            self.stats.revived += 1;
            return Ok((id.clone(), h));
        }
        if let Some((source, h)) = self.branches.lineage_lookup(branch, id, self.lineage_limit) {
            debug!(
                commit = short(graph, event.commit),
                function = %id,
                %source,
                "MOD resolved in ancestor branch"
            );
            self.stats.lineage_hits += 1;
            return Ok((id.clone(), h));
        }
        Ok((id.clone(), self.fabricate(graph, branch, event, id)))
    }

    fn moved(
        &mut self,
        graph: &CommitGraph,
        branch: BranchId,
        event: &ChangeEvent,
        deleted_now: &HashSet<FunctionId>,
    ) -> Result<(), TrackError> {
        let old = &event.function;
        let new = match &event.new_function {
            Some(new) if new != old => new,
            _ => return self.modify(graph, branch, event, deleted_now),
        };

        let b = self.branch(branch)?;
        if b.table.lookup(old).is_none() {
            if let Some(earlier) = b.find_move(old, new) {
                if earlier.commit == event.commit && earlier.previous_revision == event.previous_revision {
                    debug!(
                        commit = short(graph, event.commit),
                        from = %old,
                        to = %new,
                        "duplicate MOVE in the same commit, ignoring"
                    );
                } else {
                    info!(
                        commit = short(graph, event.commit),
                        earlier = short(graph, earlier.commit),
                        from = %old,
                        to = %new,
                        "MOVE already replayed in this branch, ignoring"
                    );
                }
                self.stats.duplicate_moves += 1;
                return Ok(());
            }
        }

        let source = self.take_for_move(graph, branch, event, old)?;
        let existing = self.branch(branch)?.table.lookup(new);
        if let Some(existing) = existing.filter(|h| *h != source) {
            let first_commit = self.branch(branch)?.first_commit;
            let probable = first_commit == event.commit && graph.get(event.commit).is_some_and(Commit::is_merge);
            self.stats.move_conflicts += 1;
            if probable {
                self.stats.probable_merge_resolutions += 1;
            }
            warn!(
                commit = short(graph, event.commit),
                %branch,
                from = %old,
                to = %new,
                probable_merge_resolution = probable,
                "MOVE target is already live under another handle, merging identities"
            );
            self.handles.union(existing, source);
        }

        let handle = self.owned(branch, source);
        self.handles.record(handle, branch, event.clone());
        let b = self.branch_mut(branch)?;
        b.table.insert(new.clone(), handle);
        b.table.tombstone(
            old.clone(),
            DeletionRecord {
                handle,
                commit: event.commit,
                branch,
                active: true,
            },
        );
        b.table.clear_deletion(new);
        b.log_move(
            old.clone(),
            MoveRecord {
                to: new.clone(),
                commit: event.commit,
                previous_revision: event.previous_revision,
            },
        );
        Ok(())
    }

    /// Detach the handle being moved away from `old`.
    fn take_for_move(
        &mut self,
        graph: &CommitGraph,
        branch: BranchId,
        event: &ChangeEvent,
        old: &FunctionId,
    ) -> Result<HandleId, TrackError> {
        let table = &mut self.branch_mut(branch)?.table;
        if let Some(h) = table.remove(old) {
            return Ok(h);
        }
        if let Some(h) = table.resurrect(old) {
            debug!(commit = short(graph, event.commit), function = %old, "MOVE of deleted function");
            self.stats.revived += 1;
            return Ok(h);
        }
        if let Some((_, h)) = self.branches.lineage_lookup(branch, old, self.lineage_limit) {
            self.stats.lineage_hits += 1;
            return Ok(h);
        }
        Ok(self.fabricate(graph, branch, event, old))
    }

    fn delete(
        &mut self,
        graph: &CommitGraph,
        branch: BranchId,
        event: &ChangeEvent,
        deleted_now: &mut HashSet<FunctionId>,
    ) -> Result<(), TrackError> {
        let id = &event.function;
        deleted_now.insert(id.clone());

        let (removed, record) = {
            let table = &mut self.branch_mut(branch)?.table;
            (table.remove(id), table.deletion(id).copied())
        };
        let handle = match (removed, record) {
            (Some(h), _) => h,
            (None, Some(r)) if r.active => {
                debug!(
                    commit = short(graph, event.commit),
                    function = %id,
                    deleted_by = short(graph, r.commit),
                    "duplicate DEL, function already deleted"
                );
                self.stats.duplicate_dels += 1;
                return Ok(());
            }
            (None, Some(r)) => r.handle,
            (None, None) => self.fabricate(graph, branch, event, id),
        };

        let handle = self.owned(branch, handle);
        self.handles.record(handle, branch, event.clone());
        self.branch_mut(branch)?.table.tombstone(
            id.clone(),
            DeletionRecord {
                handle,
                commit: event.commit,
                branch,
                active: true,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CommitRecord;

    fn id(sig: &str) -> FunctionId {
        FunctionId::new(sig, "file.c")
    }

    fn linear(n: usize) -> CommitGraph {
        CommitGraph::from_records((0..n).map(|i| CommitRecord {
            hash: format!("c{i}"),
            timestamp: i64::try_from(i).expect("small"),
            parents: if i == 0 { vec![] } else { vec![format!("c{}", i - 1)] },
        }))
        .expect("graph")
    }

    fn ev(commit: usize, kind: ModKind, f: &str, to: Option<&str>) -> ChangeEvent {
        ChangeEvent {
            commit: CommitKey(commit),
            hunk: 0,
            kind,
            function: id(f),
            new_function: to.map(id),
            previous_revision: commit.checked_sub(1).map(CommitKey),
            lines_added: 1,
            lines_deleted: 0,
        }
    }

    struct Fixture {
        graph: CommitGraph,
        state: ReplayState,
        branch: BranchId,
    }

    impl Fixture {
        fn new(n: usize) -> Self {
            let graph = linear(n);
            let mut state = ReplayState::new(n, 256);
            let branch = state.branches.create_root(CommitKey(0));
            Self { graph, state, branch }
        }

        fn apply(&mut self, events: &[ChangeEvent]) {
            let mut deleted_now = HashSet::new();
            for e in events {
                self.state
                    .apply(&self.graph, self.branch, e, &mut deleted_now)
                    .expect("apply");
            }
        }

        fn table(&self) -> &HashFunctionTable {
            &self.state.branches.get(self.branch).expect("branch").table
        }

        fn kinds(&self, h: HandleId) -> Vec<ModKind> {
            self.state
                .handles
                .group_changes(h)
                .iter()
                .map(|c| c.event.kind)
                .collect()
        }
    }

    #[test]
    fn add_creates_then_duplicate_add_keeps_handle() {
        let mut fx = Fixture::new(2);
        fx.apply(&[ev(0, ModKind::Add, "f", None)]);
        let h = fx.table().lookup(&id("f")).expect("live");
        fx.apply(&[ev(1, ModKind::Add, "f", None)]);

        assert_eq!(fx.table().lookup(&id("f")), Some(h));
        assert_eq!(fx.state.stats.duplicate_adds, 1);
        assert_eq!(fx.state.handles.len(), 1);
        let flags: Vec<bool> = fx.state.handles.changes(h).iter().map(|c| c.duplicate).collect();
        assert_eq!(flags, vec![false, true]);
    }

    #[test]
    fn add_after_delete_revives_the_same_handle() {
        let mut fx = Fixture::new(3);
        fx.apply(&[ev(0, ModKind::Add, "f", None)]);
        let h = fx.table().lookup(&id("f")).expect("live");
        fx.apply(&[ev(1, ModKind::Del, "f", None)]);
        assert!(fx.table().is_deleted(&id("f")));
        fx.apply(&[ev(2, ModKind::Add, "f", None)]);

        assert_eq!(fx.table().lookup(&id("f")), Some(h));
        assert!(!fx.table().is_deleted(&id("f")));
        assert_eq!(fx.kinds(h), vec![ModKind::Add, ModKind::Del, ModKind::Add]);
    }

    #[test]
    fn mod_after_delete_deactivates_the_tombstone() {
        let mut fx = Fixture::new(3);
        fx.apply(&[ev(0, ModKind::Add, "f", None)]);
        let h = fx.table().lookup(&id("f")).expect("live");
        fx.apply(&[ev(1, ModKind::Del, "f", None)]);
        fx.apply(&[ev(2, ModKind::Mod, "f", None)]);

        assert_eq!(fx.table().lookup(&id("f")), Some(h));
        assert!(!fx.table().is_deleted(&id("f")));
        let record = fx.table().deletion(&id("f")).expect("record kept");
        assert!(!record.active);
        assert_eq!(record.handle, h);
        assert_eq!(fx.state.stats.revived, 1);
        assert_eq!(fx.state.stats.fabricated_handles, 0);
    }

    #[test]
    fn mod_of_unknown_function_fabricates() {
        let mut fx = Fixture::new(1);
        fx.apply(&[ev(0, ModKind::Mod, "ghost", None)]);

        let h = fx.table().lookup(&id("ghost")).expect("fabricated");
        assert_eq!(fx.state.handles.origin(h), HandleOrigin::Fabricated);
        assert_eq!(fx.state.stats.fabricated_handles, 1);
    }

    #[test]
    fn mod_after_del_in_same_commit_is_skipped() {
        let mut fx = Fixture::new(2);
        fx.apply(&[ev(0, ModKind::Add, "f", None)]);
        fx.apply(&[ev(1, ModKind::Del, "f", None), ev(1, ModKind::Mod, "f", None)]);

        assert!(fx.table().lookup(&id("f")).is_none());
        assert!(fx.table().is_deleted(&id("f")));
        assert_eq!(fx.state.stats.skipped_mods_after_del, 1);
    }

    #[test]
    fn mod_under_old_name_follows_earlier_move() {
        let mut fx = Fixture::new(2);
        fx.apply(&[ev(0, ModKind::Add, "a", None)]);
        let h = fx.table().lookup(&id("a")).expect("live");
        fx.apply(&[ev(1, ModKind::Move, "a", Some("b")), ev(1, ModKind::Mod, "a", None)]);

        assert_eq!(fx.table().lookup(&id("b")), Some(h));
        assert!(fx.table().lookup(&id("a")).is_none());
        assert_eq!(fx.kinds(h), vec![ModKind::Add, ModKind::Move, ModKind::Mod]);
    }

    #[test]
    fn moves_chain_onto_the_original_handle() {
        let mut fx = Fixture::new(3);
        fx.apply(&[ev(0, ModKind::Add, "a", None)]);
        let h = fx.table().lookup(&id("a")).expect("live");
        fx.apply(&[ev(1, ModKind::Move, "a", Some("b"))]);
        fx.apply(&[ev(2, ModKind::Move, "b", Some("c"))]);

        assert_eq!(fx.table().lookup(&id("c")), Some(h));
        assert!(fx.table().is_deleted(&id("a")));
        assert!(fx.table().is_deleted(&id("b")));
        assert_eq!(fx.table().live_count(), 1);
    }

    #[test]
    fn repeated_move_is_ignored() {
        let mut fx = Fixture::new(2);
        fx.apply(&[ev(0, ModKind::Add, "a", None)]);
        fx.apply(&[ev(1, ModKind::Move, "a", Some("b")), ev(1, ModKind::Move, "a", Some("b"))]);

        assert_eq!(fx.state.stats.duplicate_moves, 1);
        assert_eq!(fx.state.stats.fabricated_handles, 0);
        assert_eq!(fx.table().live_count(), 1);
    }

    #[test]
    fn move_onto_live_function_merges_identities() {
        let mut fx = Fixture::new(2);
        fx.apply(&[ev(0, ModKind::Add, "a", None), ev(0, ModKind::Add, "b", None)]);
        let ha = fx.table().lookup(&id("a")).expect("a");
        let hb = fx.table().lookup(&id("b")).expect("b");
        fx.apply(&[ev(1, ModKind::Move, "a", Some("b"))]);

        assert!(fx.state.handles.same(ha, hb));
        assert_eq!(fx.state.stats.move_conflicts, 1);
        // Not a merge commit.
        assert_eq!(fx.state.stats.probable_merge_resolutions, 0);
    }

    #[test]
    fn move_to_same_id_is_a_mod() {
        let mut fx = Fixture::new(2);
        fx.apply(&[ev(0, ModKind::Add, "a", None)]);
        fx.apply(&[ev(1, ModKind::Move, "a", Some("a"))]);

        assert!(!fx.table().is_deleted(&id("a")));
        assert_eq!(fx.state.stats.move_conflicts, 0);
        assert_eq!(fx.table().live_count(), 1);
    }

    #[test]
    fn delete_variants() {
        let mut fx = Fixture::new(3);
        fx.apply(&[ev(0, ModKind::Add, "f", None)]);
        fx.apply(&[ev(1, ModKind::Del, "f", None)]);
        fx.apply(&[ev(2, ModKind::Del, "f", None), ev(2, ModKind::Del, "ghost", None)]);

        assert_eq!(fx.state.stats.duplicate_dels, 1);
        assert_eq!(fx.state.stats.fabricated_handles, 1);
        assert!(fx.table().is_deleted(&id("ghost")));
        assert_eq!(fx.table().live_count(), 0);
    }

    #[test]
    fn split_branch_derives_its_own_handle_on_write() {
        let mut fx = Fixture::new(2);
        fx.apply(&[ev(0, ModKind::Add, "f", None)]);
        let h = fx.table().lookup(&id("f")).expect("live");

        let split = fx.state.branches.create_split(fx.branch, CommitKey(1));
        let mut deleted_now = HashSet::new();
        fx.state
            .apply(&fx.graph, split, &ev(1, ModKind::Mod, "f", None), &mut deleted_now)
            .expect("apply");

        let derived = fx
            .state
            .branches
            .get(split)
            .and_then(|b| b.table.lookup(&id("f")))
            .expect("live in split");
        assert_ne!(derived, h);
        assert!(fx.state.handles.same(derived, h));
        assert_eq!(fx.state.handles.changes(h).len(), 1);
        assert_eq!(fx.table().lookup(&id("f")), Some(h));
    }
}
