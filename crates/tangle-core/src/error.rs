use std::{fmt, time::Duration};

use crate::model::EntityKeys;
use crate::revlog::RevisionItem;

/// Machine-readable error codes for operators and scripted callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    ConfigParseError,
    ValidationFailed,
    MergeConflict,
    EntityNotFound,
    CyclicImport,
    ReadOnlyView,
    StoreFailure,
    ReplayAborted,
    CorruptDocument,
    FederationNotConverged,
    FederationDeadline,
    LockContention,
    LockIoFailure,
    InternalUnexpected,
}

impl ErrorCode {
    /// Every known code, in declaration order.
    pub const ALL: [Self; 15] = [
        Self::NotInitialized,
        Self::ConfigParseError,
        Self::ValidationFailed,
        Self::MergeConflict,
        Self::EntityNotFound,
        Self::CyclicImport,
        Self::ReadOnlyView,
        Self::StoreFailure,
        Self::ReplayAborted,
        Self::CorruptDocument,
        Self::FederationNotConverged,
        Self::FederationDeadline,
        Self::LockContention,
        Self::LockIoFailure,
        Self::InternalUnexpected,
    ];

    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotInitialized => "E1001",
            Self::ConfigParseError => "E1002",
            Self::ValidationFailed => "E2001",
            Self::MergeConflict => "E2002",
            Self::EntityNotFound => "E2003",
            Self::CyclicImport => "E2004",
            Self::ReadOnlyView => "E2005",
            Self::StoreFailure => "E3001",
            Self::ReplayAborted => "E3002",
            Self::CorruptDocument => "E3003",
            Self::FederationNotConverged => "E4001",
            Self::FederationDeadline => "E4002",
            Self::LockContention => "E5001",
            Self::LockIoFailure => "E5002",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotInitialized => "Project not initialized",
            Self::ConfigParseError => "Config file parse error",
            Self::ValidationFailed => "Operation failed validation",
            Self::MergeConflict => "Merge conflict",
            Self::EntityNotFound => "Entity not found",
            Self::CyclicImport => "Branch import cycle",
            Self::ReadOnlyView => "Write attempted on a read-only view",
            Self::StoreFailure => "Entity store failure",
            Self::ReplayAborted => "Replay aborted",
            Self::CorruptDocument => "Corrupt stored document",
            Self::FederationNotConverged => "Federated lookup did not converge",
            Self::FederationDeadline => "Federated lookup exceeded its deadline",
            Self::LockContention => "Lock contention",
            Self::LockIoFailure => "Lock file I/O failure",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run `tg init` to initialize this directory."),
            Self::ConfigParseError => Some("Fix syntax in .tangle/config.toml and retry."),
            Self::ValidationFailed => {
                Some("Give every entity a type and at least one uid or name.")
            }
            Self::MergeConflict => {
                Some("Use a merge policy other than `err`, or check that entity types agree.")
            }
            Self::EntityNotFound | Self::InternalUnexpected => None,
            Self::CyclicImport => Some("Remove the branch import that points back at itself."),
            Self::ReadOnlyView => Some("Write to one of the underlying graphs instead."),
            Self::StoreFailure => Some("Check disk space and permissions on .tangle/."),
            Self::ReplayAborted => {
                Some("Inspect the reported revision with `tg log`, then run `tg replay`.")
            }
            Self::CorruptDocument => Some("Run `tg replay` to rebuild the entity store."),
            Self::FederationNotConverged => {
                Some("Raise [federation] max_rounds or check for runaway identifiers.")
            }
            Self::FederationDeadline => Some("Raise [federation] round_deadline_ms and retry."),
            Self::LockContention => Some("Retry after the other `tg` process releases its lock."),
            Self::LockIoFailure => Some("Check write permissions on .tangle/."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors raised by the graph core.
///
/// Every variant renders as a single line that starts with its [`ErrorCode`],
/// so callers can print it without inspecting internals.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// Missing type, name without type, missing identifiers or endpoints.
    #[error("{}: invalid entity {keys}: {reason}", ErrorCode::ValidationFailed.code())]
    Validation { reason: String, keys: EntityKeys },

    /// Merge policy `err` triggered, or the two keysets disagree on type.
    #[error(
        "{}: cannot merge {incoming} into {existing}: {reason}",
        ErrorCode::MergeConflict.code()
    )]
    Conflict {
        reason: String,
        existing: EntityKeys,
        incoming: EntityKeys,
    },

    /// The target of a delete, repair or property update does not exist.
    #[error("{}: {what} not found", ErrorCode::EntityNotFound.code())]
    NotFound { what: String },

    /// Underlying store or log I/O failure.
    #[error("{}: {context}: {source}", ErrorCode::StoreFailure.code())]
    Store {
        context: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A stored document or revision could not be decoded.
    #[error("{}: {what}: {source}", ErrorCode::CorruptDocument.code())]
    Corrupt {
        what: String,
        source: serde_json::Error,
    },

    /// A replayed revision failed; replay of the remaining log was abandoned.
    #[error(
        "{}: replay of {graph}/{branch} stopped at revision {} ({} txn {} seq {}): {source}",
        ErrorCode::ReplayAborted.code(),
        .item.position,
        .item.operation.kind(),
        .item.txn_id,
        .item.seq_no
    )]
    Replay {
        graph: String,
        branch: String,
        item: Box<RevisionItem>,
        source: Box<Self>,
    },

    /// A write was attempted against a federated view.
    #[error("{}: `{operation}` is not supported on a federated view", ErrorCode::ReadOnlyView.code())]
    ReadOnly { operation: &'static str },

    /// The fixpoint loop hit its round cap while identifiers were still growing.
    #[error(
        "{}: federated lookup still growing after {rounds} rounds (keys {keys})",
        ErrorCode::FederationNotConverged.code()
    )]
    NotConverged { rounds: usize, keys: EntityKeys },

    /// A single fixpoint round took longer than the configured deadline.
    #[error(
        "{}: federated round {round} took {elapsed:?}, deadline is {deadline:?}",
        ErrorCode::FederationDeadline.code()
    )]
    DeadlineExceeded {
        round: usize,
        elapsed: Duration,
        deadline: Duration,
    },

    /// A branch import would replay a log that is already being replayed.
    #[error("{}: import of {graph}/{branch} would recurse into itself", ErrorCode::CyclicImport.code())]
    CyclicImport { graph: String, branch: String },
}

/// Result alias used across the graph core.
pub type Result<T, E = GraphError> = std::result::Result<T, E>;

impl GraphError {
    /// Machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { .. } => ErrorCode::ValidationFailed,
            Self::Conflict { .. } => ErrorCode::MergeConflict,
            Self::NotFound { .. } => ErrorCode::EntityNotFound,
            Self::Store { .. } => ErrorCode::StoreFailure,
            Self::Corrupt { .. } => ErrorCode::CorruptDocument,
            Self::Replay { .. } => ErrorCode::ReplayAborted,
            Self::ReadOnly { .. } => ErrorCode::ReadOnlyView,
            Self::NotConverged { .. } => ErrorCode::FederationNotConverged,
            Self::DeadlineExceeded { .. } => ErrorCode::FederationDeadline,
            Self::CyclicImport { .. } => ErrorCode::CyclicImport,
        }
    }

    /// Optional remediation hint for operators.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }

    /// Error for a failed request to the underlying store.
    #[must_use]
    pub fn store(
        context: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Store {
            context: context.into(),
            source: source.into(),
        }
    }

    #[must_use]
    pub fn validation(reason: impl Into<String>, keys: &EntityKeys) -> Self {
        Self::Validation {
            reason: reason.into(),
            keys: keys.clone(),
        }
    }

    #[must_use]
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// The innermost error, looking through replay wrappers.
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::Replay { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

impl From<rusqlite::Error> for GraphError {
    fn from(err: rusqlite::Error) -> Self {
        Self::store("sqlite", err)
    }
}

impl From<serde_json::Error> for GraphError {
    fn from(err: serde_json::Error) -> Self {
        Self::Corrupt {
            what: "document encoding".to_string(),
            source: err,
        }
    }
}
