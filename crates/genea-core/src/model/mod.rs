//! Core value types: commits and function identities.

pub mod commit;
pub mod function;

pub use commit::{Commit, CommitGraph, CommitKey, CommitRecord, GraphError};
pub use function::{FunctionId, FunctionIdWithCommit};
