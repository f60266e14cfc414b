//! Branch-aware function genealogy tracking.
//!
//! # Sub-modules
//!
//! - [`handle`]: Opaque function handles with union-find identity merging.
//!   ([`HandleArena`], [`HandleId`])
//! - [`table`]: Per-branch live/deleted function tables.
//!   ([`FunctionTable`], [`HashFunctionTable`], [`DeletionRecord`])
//! - [`branch`]: Branches, pre-merge shadows and lineage search.
//!   ([`BranchArena`], [`Branch`], [`BranchKind`])
//! - [`resolve`]: ADD/MOD/MOVE/DEL handlers. ([`ReplayState`])
//! - [`merge`]: Reconciling parent shadows into a merge branch.
//! - [`tracker`]: The orchestrator. ([`GenealogyTracker`], [`TrackError`])
//! - [`history`]: Per-function genealogy output. ([`Genealogies`])
//! - [`stats`]: Replay and validation counters.
//!
//! # Data flow
//!
//! ```text
//! CommitWalker ──► GenealogyTracker ──► ReplayState ──► Branch tables
//!                        │                   │
//!                        │                   └──► HandleArena (changes, union-find)
//!                        └──► FunctionOracle (merge validation)
//! TrackOutcome ──► Genealogies
//! ```

pub mod branch;
pub mod handle;
pub mod history;
pub mod merge;
pub mod resolve;
pub mod stats;
pub mod table;
pub mod tracker;

pub use branch::{Branch, BranchArena, BranchError, BranchId, BranchKind, MoveRecord};
pub use handle::{HandleArena, HandleId, HandleOrigin, RecordedChange};
pub use history::{FunctionGenealogy, Genealogies};
pub use merge::DeletionVerdict;
pub use resolve::ReplayState;
pub use stats::{MergeValidation, ReplayStats, ValidationStats};
pub use table::{DeletionRecord, FunctionTable, HashFunctionTable};
pub use tracker::{GenealogyTracker, TrackError, TrackOutcome, compare_live};
