//! Function-level change events.
//!
//! A [`ChangeEvent`] is the in-memory form of one persisted change row: one
//! per (commit × function × hunk). [`ChangeRecord`] is the serialized form,
//! which names commits by hash instead of by dense key.

use serde::{Deserialize, Serialize};

use super::types::ModKind;
use crate::model::{CommitGraph, CommitKey, FunctionId};

/// One function-level edit observed in one commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// The changing commit.
    pub commit: CommitKey,
    /// Hunk sequence number within the commit's diff.
    pub hunk: u32,
    pub kind: ModKind,
    /// The subject function. For a MOVE, the identity before the move.
    pub function: FunctionId,
    /// The identity after a MOVE. `None` for every other kind.
    pub new_function: Option<FunctionId>,
    /// The parent commit this change was diffed against. `None` for roots.
    pub previous_revision: Option<CommitKey>,
    pub lines_added: u32,
    pub lines_deleted: u32,
}

/// Errors raised while resolving persisted change rows against a graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChangeError {
    /// The row names a commit that is not in the graph.
    #[error("change references unknown commit {0}")]
    UnknownCommit(String),

    /// The row's previous revision is not in the graph.
    #[error("change in {commit} references unknown previous revision {previous}")]
    UnknownPreviousRevision { commit: String, previous: String },

    /// A MOVE row without a target identity.
    #[error("MOVE of {function} in {commit} has no new function")]
    MissingMoveTarget { commit: String, function: FunctionId },

    /// A non-MOVE row carrying a target identity.
    #[error("{kind} of {function} in {commit} must not carry a new function")]
    UnexpectedMoveTarget {
        commit: String,
        kind: ModKind,
        function: FunctionId,
    },
}

/// Serialized change row, one JSON object per line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub commit: String,
    #[serde(default)]
    pub hunk: u32,
    pub kind: ModKind,
    pub function: FunctionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_function: Option<FunctionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_revision: Option<String>,
    #[serde(default)]
    pub lines_added: u32,
    #[serde(default)]
    pub lines_deleted: u32,
}

impl ChangeRecord {
    /// Resolve commit hashes to keys and check the MOVE target invariant.
    ///
    /// # Errors
    ///
    /// Returns a [`ChangeError`] for unknown commits or a MOVE/target mismatch.
    pub fn resolve(self, graph: &CommitGraph) -> Result<ChangeEvent, ChangeError> {
        let commit = graph
            .key_of(&self.commit)
            .ok_or_else(|| ChangeError::UnknownCommit(self.commit.clone()))?;

        let previous_revision = match &self.previous_revision {
            Some(previous) => Some(graph.key_of(previous).ok_or_else(|| {
                ChangeError::UnknownPreviousRevision {
                    commit: self.commit.clone(),
                    previous: previous.clone(),
                }
            })?),
            None => None,
        };

        match (self.kind, &self.new_function) {
            (ModKind::Move, None) => {
                return Err(ChangeError::MissingMoveTarget {
                    commit: self.commit,
                    function: self.function,
                });
            }
            (kind, Some(_)) if kind != ModKind::Move => {
                return Err(ChangeError::UnexpectedMoveTarget {
                    commit: self.commit,
                    kind,
                    function: self.function,
                });
            }
            _ => {}
        }

        Ok(ChangeEvent {
            commit,
            hunk: self.hunk,
            kind: self.kind,
            function: self.function,
            new_function: self.new_function,
            previous_revision,
            lines_added: self.lines_added,
            lines_deleted: self.lines_deleted,
        })
    }

    /// Build the serialized form of an event.
    ///
    /// Returns `None` if the event's commits are not part of `graph`.
    #[must_use]
    pub fn from_event(event: &ChangeEvent, graph: &CommitGraph) -> Option<Self> {
        let commit = graph.get(event.commit)?.hash.clone();
        let previous_revision = match event.previous_revision {
            Some(key) => Some(graph.get(key)?.hash.clone()),
            None => None,
        };
        Some(Self {
            commit,
            hunk: event.hunk,
            kind: event.kind,
            function: event.function.clone(),
            new_function: event.new_function.clone(),
            previous_revision,
            lines_added: event.lines_added,
            lines_deleted: event.lines_deleted,
        })
    }
}
