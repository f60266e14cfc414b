//! Modification kinds for function-level change events.
//!
//! The string representation uses the upper-case tags of the persisted
//! change rows (`ADD`, `MOD`, `MOVE`, `DEL`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of a function-level change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModKind {
    /// The function appears for the first time (or reappears).
    Add,
    /// The function body or signature context changed in place.
    Mod,
    /// The function's identity changed: renamed, re-signatured or moved
    /// to another file.
    Move,
    /// The function disappeared.
    Del,
}

/// Error returned when parsing an unknown modification kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownModKind {
    /// The unrecognised input string.
    pub raw: String,
}

impl fmt::Display for UnknownModKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown modification kind '{}': expected one of ADD, MOD, MOVE, DEL",
            self.raw
        )
    }
}

impl std::error::Error for UnknownModKind {}

impl ModKind {
    /// All kinds in replay-rank order.
    pub const ALL: [Self; 4] = [Self::Del, Self::Add, Self::Move, Self::Mod];

    /// Return the persisted tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "ADD",
            Self::Mod => "MOD",
            Self::Move => "MOVE",
            Self::Del => "DEL",
        }
    }

    /// Tie-break rank among events sharing a hunk number.
    ///
    /// Deletions replay first so that a later `MOD` of a function deleted
    /// in the same commit can be recognised and skipped.
    #[must_use]
    pub const fn replay_rank(self) -> u8 {
        match self {
            Self::Del => 0,
            Self::Add => 1,
            Self::Move => 2,
            Self::Mod => 3,
        }
    }
}

impl fmt::Display for ModKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModKind {
    type Err = UnknownModKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADD" => Ok(Self::Add),
            "MOD" => Ok(Self::Mod),
            "MOVE" => Ok(Self::Move),
            "DEL" => Ok(Self::Del),
            _ => Err(UnknownModKind { raw: s.to_string() }),
        }
    }
}

impl Serialize for ModKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ModKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}
