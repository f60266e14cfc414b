//! Opaque function handles and union-find identity merging.
//!
//! A [`HandleId`] stands for "one logical function" inside one branch's
//! bookkeeping. Handles are never merged in place. Instead every handle
//! belongs to a disjoint-set group, and declaring two handles the same
//! function is a `union` of their groups. All identity questions resolve
//! through [`HandleArena::find`], so references held in any branch table
//! stay valid after a merge.
//!
//! Groups are united by size (smaller under larger, lower root id on ties),
//! which keeps trees shallow enough that `find` needs no path compression
//! and can take `&self`.

use std::fmt;

use crate::event::ChangeEvent;
use crate::model::FunctionId;

use super::branch::BranchId;

/// Opaque handle for one logical function within one branch.
///
/// Handles compare by identity, never by the function they describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u32);

impl HandleId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

/// How a handle came into being.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOrigin {
    /// First ADD (or MOD) of an identity never seen before.
    Fresh,
    /// Branch-local copy of a handle owned by an ancestor branch.
    Derived(HandleId),
    /// Placeholder for a change whose function could not be located.
    Fabricated,
}

/// A change recorded against a handle, stamped with its replay position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedChange {
    /// Global replay sequence number; orders changes across handles.
    pub sequence: u64,
    pub branch: BranchId,
    pub event: ChangeEvent,
    /// An ADD of an identity that was already live in the branch.
    pub duplicate: bool,
}

#[derive(Debug, Clone)]
struct HandleData {
    owner: BranchId,
    origin: HandleOrigin,
    first_id: FunctionId,
    changes: Vec<RecordedChange>,
}

/// Factory and union-find store for every handle of a run.
#[derive(Debug, Clone, Default)]
pub struct HandleArena {
    handles: Vec<HandleData>,
    parent: Vec<u32>,
    size: Vec<u32>,
    next_sequence: u64,
}

impl HandleArena {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of handles ever created.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Create a handle in a singleton group.
    pub fn create(&mut self, owner: BranchId, origin: HandleOrigin, first_id: FunctionId) -> HandleId {
        let raw = u32::try_from(self.handles.len()).unwrap_or(u32::MAX);
        let id = HandleId(raw);
        self.handles.push(HandleData {
            owner,
            origin,
            first_id,
            changes: Vec::new(),
        });
        self.parent.push(raw);
        self.size.push(1);
        id
    }

    /// Create a branch-local copy of `source`, already in `source`'s group.
    pub fn derive(&mut self, source: HandleId, owner: BranchId) -> HandleId {
        let first_id = self.handles[source.index()].first_id.clone();
        let derived = self.create(owner, HandleOrigin::Derived(source), first_id);
        self.union(source, derived);
        derived
    }

    /// Branch that owns the handle.
    #[must_use]
    pub fn owner(&self, handle: HandleId) -> BranchId {
        self.handles[handle.index()].owner
    }

    #[must_use]
    pub fn origin(&self, handle: HandleId) -> HandleOrigin {
        self.handles[handle.index()].origin
    }

    /// The identity the handle was created for.
    #[must_use]
    pub fn first_id(&self, handle: HandleId) -> &FunctionId {
        &self.handles[handle.index()].first_id
    }

    /// Append a change to the handle's own list.
    pub fn record(&mut self, handle: HandleId, branch: BranchId, event: ChangeEvent) {
        self.push(handle, branch, event, false);
    }

    /// Append an ADD that found its identity already live.
    pub fn record_duplicate(&mut self, handle: HandleId, branch: BranchId, event: ChangeEvent) {
        self.push(handle, branch, event, true);
    }

    fn push(&mut self, handle: HandleId, branch: BranchId, event: ChangeEvent, duplicate: bool) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.handles[handle.index()].changes.push(RecordedChange {
            sequence,
            branch,
            event,
            duplicate,
        });
    }

    /// Changes recorded directly on this handle, in recording order.
    #[must_use]
    pub fn changes(&self, handle: HandleId) -> &[RecordedChange] {
        &self.handles[handle.index()].changes
    }

    /// Representative of the handle's group.
    #[must_use]
    pub fn find(&self, handle: HandleId) -> HandleId {
        let mut current = handle.0;
        while self.parent[current as usize] != current {
            current = self.parent[current as usize];
        }
        HandleId(current)
    }

    /// Whether two handles denote the same logical function.
    #[must_use]
    pub fn same(&self, a: HandleId, b: HandleId) -> bool {
        self.find(a) == self.find(b)
    }

    /// Declare `a` and `b` the same function. Returns `true` if two
    /// distinct groups were merged.
    pub fn union(&mut self, a: HandleId, b: HandleId) -> bool {
        let ra = self.find(a).0;
        let rb = self.find(b).0;
        if ra == rb {
            return false;
        }
        let (size_a, size_b) = (self.size[ra as usize], self.size[rb as usize]);
        let (root, child) = if size_a > size_b || (size_a == size_b && ra < rb) {
            (ra, rb)
        } else {
            (rb, ra)
        };
        self.parent[child as usize] = root;
        self.size[root as usize] = size_a + size_b;
        true
    }

    /// Every member of the group containing `handle`, in id order.
    #[must_use]
    pub fn members(&self, handle: HandleId) -> Vec<HandleId> {
        let root = self.find(handle);
        self.ids().filter(|h| self.find(*h) == root).collect()
    }

    /// All changes of the group containing `handle`, in replay order.
    #[must_use]
    pub fn group_changes(&self, handle: HandleId) -> Vec<&RecordedChange> {
        let mut changes: Vec<&RecordedChange> = self
            .members(handle)
            .into_iter()
            .flat_map(|h| self.handles[h.index()].changes.iter())
            .collect();
        changes.sort_by_key(|c| c.sequence);
        changes
    }

    /// Group representatives, each listed once, in id order.
    #[must_use]
    pub fn groups(&self) -> Vec<HandleId> {
        self.ids().filter(|h| self.find(*h) == *h).collect()
    }

    /// All handle ids in creation order.
    pub fn ids(&self) -> impl Iterator<Item = HandleId> + '_ {
        (0..self.handles.len()).filter_map(|i| u32::try_from(i).ok().map(HandleId))
    }
}
