//! genea-core library.
//!
//! Reconstructs the genealogy of every C function in a repository: which
//! `(signature, file)` identities over the commit history belong to the
//! same logical function, and which commits changed it.
//!
//! # Pipeline
//!
//! ```text
//! commits.jsonl ──► CommitGraph ─┬─► Extractor (optional) ──► ChangeIndex
//!                                │                                │
//! changes.jsonl ─────────────────┴────────────────────────────────┤
//!                                                                 ▼
//!                     GenealogyTracker ──► TrackOutcome ──► Genealogies
//! ```
//!
//! # Conventions
//!
//! - **Errors**: one `thiserror` enum per module for library failures,
//!   each mapped to a stable [`error::ErrorCode`]. `anyhow::Result` only in
//!   configuration loading.
//! - **Logging**: `tracing` macros. Data anomalies are `warn!`/`debug!`
//!   and never fail a run.

pub mod config;
pub mod dag;
pub mod error;
pub mod event;
pub mod extract;
pub mod genealogy;
pub mod io;
pub mod model;
pub mod oracle;
