//! Collaborator contracts of the extraction stage.
//!
//! Textual diffing and C parsing happen outside this crate. The stage only
//! sees their results: per-file hunk lists ([`DiffSource`]) and function
//! boundaries ([`SpanSource`]).

use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;
use crate::model::{Commit, CommitKey};

/// Extraction failures. The first one aborts the whole stage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    #[error("diff of {commit} against {parent} failed: {message}")]
    Diff {
        commit: String,
        parent: String,
        message: String,
    },

    #[error("function spans of {path} at {commit} failed: {message}")]
    Spans {
        commit: String,
        path: String,
        message: String,
    },

    #[error("commit {0} is not part of the graph")]
    UnknownCommit(CommitKey),
}

impl ExtractError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Diff { .. } | Self::Spans { .. } => ErrorCode::ExtractionFailed,
            Self::UnknownCommit(_) => ErrorCode::InternalUnexpected,
        }
    }
}

/// One hunk of a unified diff, in 1-based line numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hunk {
    pub old_start: u32,
    pub old_lines: u32,
    pub new_start: u32,
    pub new_lines: u32,
}

impl Hunk {
    /// Old-side line range, inclusive. `None` for pure insertions.
    #[must_use]
    pub const fn old_range(&self) -> Option<(u32, u32)> {
        range(self.old_start, self.old_lines)
    }

    /// New-side line range, inclusive. `None` for pure deletions.
    #[must_use]
    pub const fn new_range(&self) -> Option<(u32, u32)> {
        range(self.new_start, self.new_lines)
    }
}

const fn range(start: u32, lines: u32) -> Option<(u32, u32)> {
    if lines == 0 {
        None
    } else {
        Some((start, start.saturating_add(lines - 1)))
    }
}

/// Changes to one file between a parent and a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiff {
    /// Path in the parent. `None` for an added file.
    #[serde(default)]
    pub old_path: Option<String>,
    /// Path in the commit. `None` for a deleted file.
    #[serde(default)]
    pub new_path: Option<String>,
    #[serde(default)]
    pub hunks: Vec<Hunk>,
}

/// Location of one function definition in one file version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSpan {
    pub signature: String,
    /// First line, 1-based.
    pub start_line: u32,
    /// Last line, inclusive.
    pub end_line: u32,
}

impl FunctionSpan {
    #[must_use]
    pub const fn line_count(&self) -> u32 {
        self.end_line.saturating_sub(self.start_line).saturating_add(1)
    }

    /// Lines shared with the inclusive range `(start, end)`.
    #[must_use]
    pub fn overlap(&self, (start, end): (u32, u32)) -> u32 {
        let lo = self.start_line.max(start);
        let hi = self.end_line.min(end);
        if lo > hi { 0 } else { (hi - lo).saturating_add(1) }
    }
}

/// Per-file diffs of a commit against one parent.
pub trait DiffSource: Send + Sync {
    /// Diffs of `commit` against `parent`, or against the empty tree for a root.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Diff`] when the diff cannot be produced.
    fn file_diffs(&self, commit: &Commit, parent: Option<&Commit>) -> Result<Vec<FileDiff>, ExtractError>;
}

/// Function boundaries of one file at one commit.
pub trait SpanSource: Send + Sync {
    /// # Errors
    ///
    /// Returns [`ExtractError::Spans`] when the file cannot be parsed.
    fn function_spans(&self, commit: &Commit, path: &str) -> Result<Vec<FunctionSpan>, ExtractError>;
}
