//! Immutable commit DAG with parent/child links.
//!
//! The [`CommitGraph`] is built once from persisted commit records and never
//! mutated afterwards. Every commit gets a dense [`CommitKey`] so that
//! per-commit state (walker marks, branch assignment, change lists) can live
//! in plain vectors indexed by key.
//!
//! # Construction
//!
//! Records may arrive in any order. Parent links are resolved after all
//! records are known, and child links are derived from them. Duplicate
//! records (same hash) are skipped; the first occurrence wins.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Dense index of a commit inside a [`CommitGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommitKey(pub usize);

impl CommitKey {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for CommitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A commit as persisted by the upstream history export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// External identity (the VCS hash).
    pub hash: String,
    /// Commit timestamp, seconds since the Unix epoch.
    pub timestamp: i64,
    /// Parent hashes in declaration order.
    #[serde(default)]
    pub parents: Vec<String>,
}

/// A node of the commit DAG.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub key: CommitKey,
    pub hash: String,
    pub timestamp: i64,
    /// Parents in declaration order (first parent first).
    pub parents: Vec<CommitKey>,
    /// Children in key order.
    pub children: Vec<CommitKey>,
}

impl Commit {
    /// A merge has more than one parent.
    #[must_use]
    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    /// A root has no parents.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    /// Abbreviated hash for log lines.
    #[must_use]
    pub fn short_hash(&self) -> &str {
        let end = self
            .hash
            .char_indices()
            .nth(10)
            .map_or(self.hash.len(), |(i, _)| i);
        &self.hash[..end]
    }
}

/// Errors raised while building a [`CommitGraph`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// A commit names a parent that is not in the record set.
    #[error("commit {commit} references unknown parent {parent}")]
    UnknownParent { commit: String, parent: String },

    /// A commit lists itself as its own parent.
    #[error("commit {0} lists itself as a parent")]
    SelfParent(String),
}

/// The commit DAG, indexed by dense key and by hash.
#[derive(Debug, Clone, Default)]
pub struct CommitGraph {
    commits: Vec<Commit>,
    by_hash: HashMap<String, CommitKey>,
}

impl CommitGraph {
    /// Build the graph from commit records.
    ///
    /// Keys are assigned in record order after dropping duplicates.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownParent`] if a parent hash has no record,
    /// or [`GraphError::SelfParent`] for a commit that is its own parent.
    pub fn from_records(records: impl IntoIterator<Item = CommitRecord>) -> Result<Self, GraphError> {
        let mut unique: Vec<CommitRecord> = Vec::new();
        let mut by_hash: HashMap<String, CommitKey> = HashMap::new();

        for record in records {
            if by_hash.contains_key(&record.hash) {
                debug!(hash = %record.hash, "skipping duplicate commit record");
                continue;
            }
            by_hash.insert(record.hash.clone(), CommitKey(unique.len()));
            unique.push(record);
        }

        let mut commits: Vec<Commit> = Vec::with_capacity(unique.len());
        for (index, record) in unique.into_iter().enumerate() {
            let mut parents: Vec<CommitKey> = Vec::with_capacity(record.parents.len());
            for parent_hash in &record.parents {
                if *parent_hash == record.hash {
                    return Err(GraphError::SelfParent(record.hash));
                }
                let parent = by_hash.get(parent_hash).copied().ok_or_else(|| {
                    GraphError::UnknownParent {
                        commit: record.hash.clone(),
                        parent: parent_hash.clone(),
                    }
                })?;
                // A parent listed twice is still one edge.
                if !parents.contains(&parent) {
                    parents.push(parent);
                }
            }
            commits.push(Commit {
                key: CommitKey(index),
                hash: record.hash,
                timestamp: record.timestamp,
                parents,
                children: Vec::new(),
            });
        }

        for index in 0..commits.len() {
            let parents = commits[index].parents.clone();
            for parent in parents {
                commits[parent.index()].children.push(CommitKey(index));
            }
        }

        Ok(Self { commits, by_hash })
    }

    /// Number of commits.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commits.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    /// Look up a commit by key.
    ///
    /// Keys handed out by this graph are always valid; foreign keys yield `None`.
    #[must_use]
    pub fn get(&self, key: CommitKey) -> Option<&Commit> {
        self.commits.get(key.index())
    }

    /// Look up a commit by its hash.
    #[must_use]
    pub fn by_hash(&self, hash: &str) -> Option<&Commit> {
        self.by_hash.get(hash).map(|key| &self.commits[key.index()])
    }

    /// Resolve a hash to its key.
    #[must_use]
    pub fn key_of(&self, hash: &str) -> Option<CommitKey> {
        self.by_hash.get(hash).copied()
    }

    /// Keys of all root commits, in key order.
    #[must_use]
    pub fn roots(&self) -> Vec<CommitKey> {
        self.commits
            .iter()
            .filter(|c| c.is_root())
            .map(|c| c.key)
            .collect()
    }

    /// All commits in key order.
    pub fn commits(&self) -> impl Iterator<Item = &Commit> {
        self.commits.iter()
    }
}
