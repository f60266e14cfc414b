//! Replay and validation counters.

use std::fmt;

use serde::Serialize;

use crate::event::ModKind;

use super::branch::BranchKind;

/// Counters accumulated over one replay.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplayStats {
    pub commits: u64,
    pub root_branches: u64,
    pub split_branches: u64,
    pub merge_branches: u64,
    pub pre_merge_branches: u64,

    pub changes: u64,
    pub adds: u64,
    pub mods: u64,
    pub moves: u64,
    pub dels: u64,

    pub duplicate_adds: u64,
    pub duplicate_dels: u64,
    pub duplicate_moves: u64,
    pub revived: u64,
    pub fabricated_handles: u64,
    pub lineage_hits: u64,
    pub skipped_mods_after_del: u64,

    pub move_conflicts: u64,
    pub probable_merge_resolutions: u64,

    pub ambiguous_deletions: u64,
    pub always_deleted: u64,
    pub merge_collisions: u64,
    pub leftover_merge_changes: u64,
}

impl ReplayStats {
    pub(crate) fn count_branch(&mut self, kind: BranchKind) {
        match kind {
            BranchKind::Root => self.root_branches += 1,
            BranchKind::Split => self.split_branches += 1,
            BranchKind::Merge => self.merge_branches += 1,
            BranchKind::PreMerge { .. } => self.pre_merge_branches += 1,
        }
    }

    pub(crate) fn count_change(&mut self, kind: ModKind) {
        self.changes += 1;
        match kind {
            ModKind::Add => self.adds += 1,
            ModKind::Mod => self.mods += 1,
            ModKind::Move => self.moves += 1,
            ModKind::Del => self.dels += 1,
        }
    }

    /// Branches of every kind, shadows included.
    #[must_use]
    pub const fn branches(&self) -> u64 {
        self.root_branches + self.split_branches + self.merge_branches + self.pre_merge_branches
    }

    /// Share of move conflicts classified as probable merge resolutions.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn probable_merge_fraction(&self) -> f64 {
        if self.move_conflicts == 0 {
            0.0
        } else {
            self.probable_merge_resolutions as f64 / self.move_conflicts as f64
        }
    }
}

impl fmt::Display for ReplayStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "commits: {}  branches: {} (root {}, split {}, merge {}, pre-merge {})",
            self.commits,
            self.branches(),
            self.root_branches,
            self.split_branches,
            self.merge_branches,
            self.pre_merge_branches
        )?;
        writeln!(
            f,
            "changes: {} (ADD {}, MOD {}, MOVE {}, DEL {})",
            self.changes, self.adds, self.mods, self.moves, self.dels
        )?;
        writeln!(
            f,
            "anomalies: {} duplicate ADD, {} duplicate DEL, {} duplicate MOVE, {} fabricated, {} skipped MOD after DEL",
            self.duplicate_adds,
            self.duplicate_dels,
            self.duplicate_moves,
            self.fabricated_handles,
            self.skipped_mods_after_del
        )?;
        writeln!(
            f,
            "move conflicts: {} ({} probable merge resolutions, {:.1}%)",
            self.move_conflicts,
            self.probable_merge_resolutions,
            self.probable_merge_fraction() * 100.0
        )?;
        write!(
            f,
            "merges: {} ambiguous deletions, {} always deleted, {} handle collisions, {} leftover changes",
            self.ambiguous_deletions, self.always_deleted, self.merge_collisions, self.leftover_merge_changes
        )
    }
}

/// Outcome of comparing one merge's live table with the functions oracle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeValidation {
    pub matching: u64,
    /// Present at the commit but not live in the computed table.
    pub missing: u64,
    /// Live in the computed table but absent at the commit.
    pub superfluous: u64,
}

/// Aggregate of every validated merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ValidationStats {
    pub merges_validated: u64,
    pub matching: u64,
    pub missing: u64,
    pub superfluous: u64,
}

impl ValidationStats {
    pub(crate) fn add(&mut self, merge: MergeValidation) {
        self.merges_validated += 1;
        self.matching += merge.matching;
        self.missing += merge.missing;
        self.superfluous += merge.superfluous;
    }
}

impl fmt::Display for ValidationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "validated merges: {}  matching: {}  missing: {}  superfluous: {}",
            self.merges_validated, self.matching, self.missing, self.superfluous
        )
    }
}
