//! Per-branch function tables: live identities and deletion tombstones.
//!
//! Branch code only talks to its table through [`FunctionTable`], so the
//! hash-map implementation here can be swapped for a persistent map (cheap
//! snapshots on branch split) without touching call sites.
//!
//! A table holds two maps:
//!
//! - **live**: `FunctionId → HandleId` for functions that currently exist.
//! - **deletions**: `FunctionId → DeletionRecord`, the most recent deletion
//!   of that identity in the branch's visible history. A record stays after
//!   the function comes back, marked inactive, so the old handle can be
//!   revived. Keeping one record per identity means a table never holds two
//!   active deletions for the same `FunctionId`.

use std::collections::HashMap;
use std::fmt;

use crate::model::{CommitKey, FunctionId};

use super::branch::BranchId;
use super::handle::HandleId;

/// The most recent deletion of a [`FunctionId`] within a branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeletionRecord {
    /// Handle the identity mapped to when it was deleted.
    pub handle: HandleId,
    /// Commit that deleted (or moved away) the identity.
    pub commit: CommitKey,
    /// Branch in which the deletion was replayed.
    pub branch: BranchId,
    /// `false` once the function has been revived.
    pub active: bool,
}

/// Storage interface for one branch's live functions and tombstones.
pub trait FunctionTable: Clone + Default + fmt::Debug {
    /// Live handle for `id`.
    fn lookup(&self, id: &FunctionId) -> Option<HandleId>;

    /// Map `id` to `handle`, returning the previous live handle.
    fn insert(&mut self, id: FunctionId, handle: HandleId) -> Option<HandleId>;

    /// Drop the live mapping for `id`, returning it.
    fn remove(&mut self, id: &FunctionId) -> Option<HandleId>;

    /// Number of live identities.
    fn live_count(&self) -> usize;

    /// Live entries in unspecified order.
    fn live(&self) -> impl Iterator<Item = (&FunctionId, HandleId)> + '_;

    /// Record a deletion, replacing any earlier record for `id`.
    fn tombstone(&mut self, id: FunctionId, record: DeletionRecord);

    /// Deletion record for `id`, active or not.
    fn deletion(&self, id: &FunctionId) -> Option<&DeletionRecord>;

    /// Deactivate the deletion record for `id` and return its handle.
    fn resurrect(&mut self, id: &FunctionId) -> Option<HandleId>;

    /// Mark the deletion record for `id` inactive. Returns `true` if it was active.
    fn clear_deletion(&mut self, id: &FunctionId) -> bool;

    /// Deletion records in unspecified order.
    fn deletions(&self) -> impl Iterator<Item = (&FunctionId, &DeletionRecord)> + '_;

    /// Whether `id` carries an active deletion record.
    fn is_deleted(&self, id: &FunctionId) -> bool {
        self.deletion(id).is_some_and(|r| r.active)
    }

    /// Live entries sorted by identity.
    fn sorted_live(&self) -> Vec<(FunctionId, HandleId)> {
        let mut entries: Vec<(FunctionId, HandleId)> =
            self.live().map(|(id, h)| (id.clone(), h)).collect();
        entries.sort();
        entries
    }

    /// Deletion records sorted by identity.
    fn sorted_deletions(&self) -> Vec<(FunctionId, DeletionRecord)> {
        let mut entries: Vec<(FunctionId, DeletionRecord)> =
            self.deletions().map(|(id, r)| (id.clone(), *r)).collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

/// [`FunctionTable`] backed by two hash maps. Snapshots are full clones.
#[derive(Debug, Clone, Default)]
pub struct HashFunctionTable {
    live: HashMap<FunctionId, HandleId>,
    deletions: HashMap<FunctionId, DeletionRecord>,
}

impl FunctionTable for HashFunctionTable {
    fn lookup(&self, id: &FunctionId) -> Option<HandleId> {
        self.live.get(id).copied()
    }

    fn insert(&mut self, id: FunctionId, handle: HandleId) -> Option<HandleId> {
        self.live.insert(id, handle)
    }

    fn remove(&mut self, id: &FunctionId) -> Option<HandleId> {
        self.live.remove(id)
    }

    fn live_count(&self) -> usize {
        self.live.len()
    }

    fn live(&self) -> impl Iterator<Item = (&FunctionId, HandleId)> + '_ {
        self.live.iter().map(|(id, h)| (id, *h))
    }

    fn tombstone(&mut self, id: FunctionId, record: DeletionRecord) {
        self.deletions.insert(id, record);
    }

    fn deletion(&self, id: &FunctionId) -> Option<&DeletionRecord> {
        self.deletions.get(id)
    }

    fn resurrect(&mut self, id: &FunctionId) -> Option<HandleId> {
        let record = self.deletions.get_mut(id)?;
        record.active = false;
        Some(record.handle)
    }

    fn clear_deletion(&mut self, id: &FunctionId) -> bool {
        match self.deletions.get_mut(id) {
            Some(record) if record.active => {
                record.active = false;
                true
            }
            _ => false,
        }
    }

    fn deletions(&self) -> impl Iterator<Item = (&FunctionId, &DeletionRecord)> + '_ {
        self.deletions.iter()
    }
}
