//! Per-function genealogies handed to downstream stages.
//!
//! One [`FunctionGenealogy`] is emitted per union-find group that recorded
//! at least one change. It lists every `(FunctionId, commit)` alias the
//! function was seen under, its changes in replay order, and the commits
//! that added it. When no explicit ADD exists (history starts mid-life or
//! the ADD was lost), the oldest changing commits stand in and
//! `adding_guessed` is set.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::dag::{CommitDistance, DistanceError};
use crate::event::{ChangeRecord, ModKind};
use crate::model::{CommitGraph, CommitKey, FunctionId, FunctionIdWithCommit};

use super::handle::{HandleId, RecordedChange};
use super::table::FunctionTable;
use super::tracker::TrackOutcome;

/// Full history of one logical function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionGenealogy {
    /// Stable index, ordered by the group's representative handle.
    pub group: usize,
    pub aliases: BTreeSet<FunctionIdWithCommit>,
    /// Changes in replay order.
    pub changes: Vec<ChangeRecord>,
    /// Hashes of the adding commits, or of the oldest changing commits
    /// when `adding_guessed` is set.
    pub adding_commits: Vec<String>,
    pub adding_guessed: bool,
    pub first_change: i64,
    pub last_change: i64,
    pub lines_added: u64,
    pub lines_deleted: u64,
    /// Live at the tip of some branch at the end of history.
    pub live: bool,
}

impl FunctionGenealogy {
    /// Whether the function was ever known as `id`.
    #[must_use]
    pub fn has_alias(&self, id: &FunctionId) -> bool {
        self.aliases.iter().any(|a| &a.function == id)
    }

    /// Change kinds in replay order.
    #[must_use]
    pub fn kinds(&self) -> Vec<ModKind> {
        self.changes.iter().map(|c| c.kind).collect()
    }
}

/// Every genealogy of a finished replay.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genealogies {
    pub items: Vec<FunctionGenealogy>,
}

impl Genealogies {
    /// Group the recorded changes of `outcome` into genealogies.
    ///
    /// # Errors
    ///
    /// Propagates distance oracle failures from guessing adding commits.
    pub fn collect<T: FunctionTable>(
        outcome: &TrackOutcome<T>,
        graph: &CommitGraph,
        distance: &dyn CommitDistance,
    ) -> Result<Self, DistanceError> {
        let handles = &outcome.handles;

        let mut groups: BTreeMap<HandleId, Vec<HandleId>> = BTreeMap::new();
        for handle in handles.ids() {
            groups.entry(handles.find(handle)).or_default().push(handle);
        }

        let live: HashSet<HandleId> = outcome
            .tips()
            .flat_map(|tip| tip.table.live().map(|(_, h)| handles.find(h)).collect::<Vec<_>>())
            .collect();

        let mut items = Vec::new();
        for (root, members) in groups {
            let mut changes: Vec<&RecordedChange> = members
                .iter()
                .flat_map(|h| handles.changes(*h).iter())
                .collect();
            if changes.is_empty() {
                continue;
            }
            changes.sort_by_key(|c| c.sequence);

            let group = items.len();
            items.push(build(group, &changes, live.contains(&root), graph, distance)?);
        }
        Ok(Self { items })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FunctionGenealogy> {
        self.items.iter()
    }

    /// Genealogies that were ever known as `id`.
    pub fn with_alias<'a>(&'a self, id: &'a FunctionId) -> impl Iterator<Item = &'a FunctionGenealogy> {
        self.items.iter().filter(move |g| g.has_alias(id))
    }
}

fn build(
    group: usize,
    changes: &[&RecordedChange],
    live: bool,
    graph: &CommitGraph,
    distance: &dyn CommitDistance,
) -> Result<FunctionGenealogy, DistanceError> {
    let hash = |key: CommitKey| graph.get(key).map(|c| c.hash.clone());

    let mut aliases = BTreeSet::new();
    let mut records = Vec::with_capacity(changes.len());
    let mut changing: BTreeSet<CommitKey> = BTreeSet::new();
    let mut adding: BTreeSet<CommitKey> = BTreeSet::new();
    let (mut first_change, mut last_change) = (i64::MAX, i64::MIN);
    let (mut lines_added, mut lines_deleted) = (0_u64, 0_u64);

    for change in changes {
        let event = &change.event;
        let Some(commit_hash) = hash(event.commit) else {
            continue;
        };
        aliases.insert(FunctionIdWithCommit {
            function: event.function.clone(),
            commit: commit_hash.clone(),
        });
        if let Some(new) = &event.new_function {
            aliases.insert(FunctionIdWithCommit {
                function: new.clone(),
                commit: commit_hash,
            });
        }
        if let Some(record) = ChangeRecord::from_event(event, graph) {
            records.push(record);
        }
        changing.insert(event.commit);
        if event.kind == ModKind::Add && !change.duplicate {
            adding.insert(event.commit);
        }
        if let Some(commit) = graph.get(event.commit) {
            first_change = first_change.min(commit.timestamp);
            last_change = last_change.max(commit.timestamp);
        }
        lines_added += u64::from(event.lines_added);
        lines_deleted += u64::from(event.lines_deleted);
    }

    let adding_guessed = adding.is_empty();
    let adding = if adding_guessed {
        distance.filter_ancestor_commits(&changing)?
    } else {
        adding
    };

    Ok(FunctionGenealogy {
        group,
        aliases,
        changes: records,
        adding_commits: adding.into_iter().filter_map(hash).collect(),
        adding_guessed,
        first_change: if changing.is_empty() { 0 } else { first_change },
        last_change: if changing.is_empty() { 0 } else { last_change },
        lines_added,
        lines_deleted,
        live,
    })
}
