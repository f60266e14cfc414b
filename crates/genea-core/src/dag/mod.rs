//! Commit DAG traversal and reachability queries.
//!
//! # Sub-modules
//!
//! - [`walker`]: Dependency-ordered, timestamp-prioritized traversal.
//!   ([`CommitWalker`], [`CommitVisitor`])
//! - [`distance`]: Ancestor/descendant and minimum-distance queries.
//!   ([`CommitDistance`], [`GraphDistance`])
//!
//! # Related Modules
//!
//! - [`crate::model::commit`]: The immutable [`crate::model::CommitGraph`]
//!   both sub-modules operate on.

pub mod distance;
pub mod walker;

pub use distance::{CommitDistance, DistanceError, GraphDistance};
pub use walker::{CommitVisitor, CommitWalker, VisitState, WalkError, WalkSummary};
