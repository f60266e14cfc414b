//! Function identities as observed at a single point in history.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A function's identity at one point in time: its signature and the file
/// that contains it.
///
/// Equality and hashing are structural. The same logical function usually
/// carries many `FunctionId`s over its lifetime (renames, file moves,
/// signature changes); tying them together is the job of
/// [`crate::genealogy`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FunctionId {
    /// Normalized C signature, e.g. `int f(void)`.
    pub signature: String,
    /// Repository-relative path of the containing file.
    pub file: String,
}

impl FunctionId {
    pub fn new(signature: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            signature: signature.into(),
            file: file.into(),
        }
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.signature, self.file)
    }
}

/// A [`FunctionId`] paired with the hash of the commit where it was seen.
///
/// Genealogies are reported as sets of these aliases.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FunctionIdWithCommit {
    pub function: FunctionId,
    pub commit: String,
}
