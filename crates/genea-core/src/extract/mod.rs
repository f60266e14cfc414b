//! Pre-extraction of change events, before genealogy tracking starts.
//!
//! Extraction is embarrassingly parallel: each (commit, parent) pair is
//! diffed and its touched files parsed independently. The only shared
//! state is the [`SpanCache`].
//!
//! # Sub-modules
//!
//! - [`source`]: Collaborator traits and their value types.
//!   ([`DiffSource`], [`SpanSource`], [`FileDiff`], [`FunctionSpan`])
//! - [`pool`]: Bounded worker pool with cancel-on-first-error. ([`run_bounded`])
//! - [`cache`]: (commit, path) span cache. ([`SpanCache`])
//! - [`changes`]: Per-file event derivation. ([`derive_changes`])
//! - [`extractor`]: Whole-graph driver. ([`Extractor`])

pub mod cache;
pub mod changes;
pub mod extractor;
pub mod pool;
pub mod source;

pub use cache::SpanCache;
pub use changes::derive_changes;
pub use extractor::Extractor;
pub use pool::run_bounded;
pub use source::{DiffSource, ExtractError, FileDiff, FunctionSpan, Hunk, SpanSource};
