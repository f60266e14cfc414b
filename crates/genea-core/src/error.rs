use std::fmt;

/// Machine-readable error codes for fatal failures of a genealogy run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    InputParseError,
    UnknownCommit,
    InvalidChangeEvent,
    WalkStalled,
    CommitUnreachable,
    MissingBranch,
    DuplicateShadow,
    MissingShadow,
    MergeParentMismatch,
    DistanceOracleFailed,
    FunctionOracleFailed,
    ExtractionFailed,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::InputParseError => "E1002",
            Self::UnknownCommit => "E1003",
            Self::InvalidChangeEvent => "E1004",
            Self::WalkStalled => "E2001",
            Self::CommitUnreachable => "E2002",
            Self::MissingBranch => "E3001",
            Self::DuplicateShadow => "E3002",
            Self::MissingShadow => "E3003",
            Self::MergeParentMismatch => "E3004",
            Self::DistanceOracleFailed => "E4001",
            Self::FunctionOracleFailed => "E4002",
            Self::ExtractionFailed => "E5001",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::InputParseError => "Input file parse error",
            Self::UnknownCommit => "Unknown commit",
            Self::InvalidChangeEvent => "Invalid change event",
            Self::WalkStalled => "Commit walker cannot make progress",
            Self::CommitUnreachable => "Commit unreachable from any root",
            Self::MissingBranch => "Commit has no branch",
            Self::DuplicateShadow => "Pre-merge branch created twice",
            Self::MissingShadow => "Pre-merge branch missing",
            Self::MergeParentMismatch => "Merge parents do not match parent branches",
            Self::DistanceOracleFailed => "Commit distance lookup failed",
            Self::FunctionOracleFailed => "Function listing failed",
            Self::ExtractionFailed => "Change extraction failed",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in genea.toml and retry."),
            Self::InputParseError => Some("Check that the input is one JSON object per line."),
            Self::UnknownCommit => {
                Some("Every referenced commit hash must appear in the commit list.")
            }
            Self::InvalidChangeEvent => {
                Some("MOVE rows need a new function; other kinds must not carry one.")
            }
            Self::WalkStalled | Self::CommitUnreachable => {
                Some("The commit list must be a complete, acyclic history.")
            }
            Self::MissingBranch
            | Self::DuplicateShadow
            | Self::MissingShadow
            | Self::MergeParentMismatch
            | Self::InternalUnexpected => {
                Some("Retry once. If persistent, report a bug with logs.")
            }
            Self::DistanceOracleFailed => None,
            Self::FunctionOracleFailed => {
                Some("Check the oracle command and its cache directory.")
            }
            Self::ExtractionFailed => Some("Inspect the diff and span inputs for the commit."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
