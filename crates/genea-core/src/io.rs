//! JSONL input and output.
//!
//! Every stream holds one JSON object per line. Blank lines are ignored;
//! any other line that fails to parse aborts the read with its 1-based
//! line number.
//!
//! | stream      | row type                  |
//! |-------------|---------------------------|
//! | commits     | [`CommitRecord`]          |
//! | changes     | [`ChangeRecord`]          |
//! | diffs       | [`DiffRecord`]            |
//! | spans       | [`SpanRecord`]            |
//! | genealogies | [`crate::genealogy::FunctionGenealogy`] |

use std::collections::HashMap;
use std::io::{self, BufRead, Write};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ErrorCode;
use crate::event::{ChangeError, ChangeIndex, ChangeRecord};
use crate::extract::{DiffSource, ExtractError, FileDiff, FunctionSpan, SpanSource};
use crate::genealogy::Genealogies;
use crate::model::{Commit, CommitGraph, CommitRecord, GraphError};

/// Failures reading or writing JSONL streams.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("line {line}: read failed: {source}")]
    Read {
        line: usize,
        #[source]
        source: io::Error,
    },

    #[error("line {line}: invalid JSON: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("line {line}: {source}")]
    Change {
        line: usize,
        #[source]
        source: ChangeError,
    },

    #[error("write failed: {0}")]
    Write(#[source] serde_json::Error),

    #[error("write failed: {0}")]
    Io(#[from] io::Error),
}

impl InputError {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Graph(GraphError::UnknownParent { .. })
            | Self::Change {
                source: ChangeError::UnknownCommit(_) | ChangeError::UnknownPreviousRevision { .. },
                ..
            } => ErrorCode::UnknownCommit,
            Self::Change { .. } => ErrorCode::InvalidChangeEvent,
            Self::Read { .. } | Self::Parse { .. } | Self::Graph(_) | Self::Write(_) | Self::Io(_) => {
                ErrorCode::InputParseError
            }
        }
    }
}

/// Parse every non-blank line of `reader` as a `T`, keeping line numbers.
///
/// # Errors
///
/// Returns [`InputError::Read`] or [`InputError::Parse`] for the first bad line.
pub fn read_jsonl<T: DeserializeOwned>(reader: impl BufRead) -> Result<Vec<(usize, T)>, InputError> {
    let mut rows = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let raw = line.map_err(|source| InputError::Read { line: line_no, source })?;
        if raw.trim().is_empty() {
            continue;
        }
        let row = serde_json::from_str(&raw).map_err(|source| InputError::Parse { line: line_no, source })?;
        rows.push((line_no, row));
    }
    Ok(rows)
}

/// Write one JSON object per line.
///
/// # Errors
///
/// Propagates serialization and I/O failures.
pub fn write_jsonl<'a, T: Serialize + 'a>(
    mut writer: impl Write,
    rows: impl IntoIterator<Item = &'a T>,
) -> Result<usize, InputError> {
    let mut written = 0;
    for row in rows {
        serde_json::to_writer(&mut writer, row).map_err(InputError::Write)?;
        writer.write_all(b"\n")?;
        written += 1;
    }
    writer.flush()?;
    Ok(written)
}

/// Read a commit stream into a graph.
///
/// # Errors
///
/// Fails on malformed lines and unknown parent hashes.
pub fn read_commits(reader: impl BufRead) -> Result<CommitGraph, InputError> {
    let records = read_jsonl::<CommitRecord>(reader)?;
    let graph = CommitGraph::from_records(records.into_iter().map(|(_, r)| r))?;
    debug!(commits = graph.len(), "commit graph loaded");
    Ok(graph)
}

/// Read a change stream and group it by commit.
///
/// # Errors
///
/// Fails on malformed lines, unknown commits and MOVE target mismatches.
pub fn read_changes(reader: impl BufRead, graph: &CommitGraph) -> Result<ChangeIndex, InputError> {
    let rows = read_jsonl::<ChangeRecord>(reader)?;
    let mut index = ChangeIndex::new(graph.len());
    for (line, row) in rows {
        let event = row
            .resolve(graph)
            .map_err(|source| InputError::Change { line, source })?;
        index.push(event);
    }
    index.sort();
    debug!(events = index.event_count(), "change events loaded");
    Ok(index)
}

/// Write every event of `index`, commit by commit.
///
/// # Errors
///
/// Propagates serialization and I/O failures.
pub fn write_changes(writer: impl Write, index: &ChangeIndex, graph: &CommitGraph) -> Result<usize, InputError> {
    let rows: Vec<ChangeRecord> = index
        .iter()
        .filter_map(|event| ChangeRecord::from_event(event, graph))
        .collect();
    write_jsonl(writer, &rows)
}

/// Write one genealogy per line.
///
/// # Errors
///
/// Propagates serialization and I/O failures.
pub fn write_genealogies(writer: impl Write, genealogies: &Genealogies) -> Result<usize, InputError> {
    write_jsonl(writer, genealogies.iter())
}

/// Pre-computed diffs of one (commit, parent) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffRecord {
    pub commit: String,
    /// `None` for a root commit diffed against the empty tree.
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub files: Vec<FileDiff>,
}

/// Pre-computed function spans of one file at one commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanRecord {
    pub commit: String,
    pub path: String,
    #[serde(default)]
    pub spans: Vec<FunctionSpan>,
}

/// [`DiffSource`] answering from [`DiffRecord`] rows.
///
/// A pair without a row has no changed files.
#[derive(Debug, Default)]
pub struct RecordedDiffs {
    by_pair: HashMap<(String, Option<String>), Vec<FileDiff>>,
}

impl RecordedDiffs {
    /// # Errors
    ///
    /// Fails on malformed lines.
    pub fn read(reader: impl BufRead) -> Result<Self, InputError> {
        Ok(read_jsonl::<DiffRecord>(reader)?
            .into_iter()
            .map(|(_, record)| record)
            .collect())
    }
}

impl FromIterator<DiffRecord> for RecordedDiffs {
    fn from_iter<I: IntoIterator<Item = DiffRecord>>(iter: I) -> Self {
        let mut by_pair: HashMap<(String, Option<String>), Vec<FileDiff>> = HashMap::new();
        for record in iter {
            by_pair
                .entry((record.commit, record.parent))
                .or_default()
                .extend(record.files);
        }
        Self { by_pair }
    }
}

impl DiffSource for RecordedDiffs {
    fn file_diffs(&self, commit: &Commit, parent: Option<&Commit>) -> Result<Vec<FileDiff>, ExtractError> {
        let key = (commit.hash.clone(), parent.map(|p| p.hash.clone()));
        Ok(self.by_pair.get(&key).cloned().unwrap_or_default())
    }
}

/// [`SpanSource`] answering from [`SpanRecord`] rows.
#[derive(Debug, Default)]
pub struct RecordedSpans {
    by_file: HashMap<(String, String), Vec<FunctionSpan>>,
}

impl RecordedSpans {
    /// # Errors
    ///
    /// Fails on malformed lines.
    pub fn read(reader: impl BufRead) -> Result<Self, InputError> {
        Ok(read_jsonl::<SpanRecord>(reader)?
            .into_iter()
            .map(|(_, record)| record)
            .collect())
    }
}

impl FromIterator<SpanRecord> for RecordedSpans {
    fn from_iter<I: IntoIterator<Item = SpanRecord>>(iter: I) -> Self {
        let by_file = iter
            .into_iter()
            .map(|record| ((record.commit, record.path), record.spans))
            .collect();
        Self { by_file }
    }
}

impl SpanSource for RecordedSpans {
    fn function_spans(&self, commit: &Commit, path: &str) -> Result<Vec<FunctionSpan>, ExtractError> {
        self.by_file
            .get(&(commit.hash.clone(), path.to_string()))
            .cloned()
            .ok_or_else(|| ExtractError::Spans {
                commit: commit.hash.clone(),
                path: path.to_string(),
                message: "no span record".to_string(),
            })
    }
}
