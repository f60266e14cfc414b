//! Change event model.
//!
//! Change events are normalized records of per-function edits. Each one is
//! tagged with the changing commit, its hunk number, the previous revision
//! it was diffed against, and the old/new function identity.
//!
//! Events are produced once, before genealogy tracking starts (either read
//! from JSONL or derived by [`crate::extract`]), and are immutable
//! afterwards. The tracker consumes them through a [`ChangeIndex`].

pub mod change;
pub mod index;
pub mod types;

pub use change::{ChangeError, ChangeEvent, ChangeRecord};
pub use index::ChangeIndex;
pub use types::{ModKind, UnknownModKind};
