use std::fmt;

use thiserror::Error;

use crate::store::StoreError;

/// Failure to bring an archive table in line with its live counterpart.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Cannot read {side} table structure: {source}")]
    Describe {
        side: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("Live table does not exist")]
    MissingLiveTable,

    #[error("Unexpected column description: {0}")]
    Malformed(String),

    #[error("Cannot express change on this store: {0}")]
    Unsupported(String),

    #[error("Failed to apply '{statement}': {source}")]
    Apply {
        statement: String,
        #[source]
        source: StoreError,
    },
}

/// Coarse classification of an [`ArchiveError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Config,
    Fetch,
    Write,
    Schema,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Config => "config",
            ErrorKind::Fetch => "fetch",
            ErrorKind::Write => "write",
            ErrorKind::Schema => "schema",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("No predicate set for table '{table}'")]
    MissingPredicate { table: String },

    #[error("Table '{table}' is not a configured root table")]
    UnknownTable { table: String },

    #[error("Record in '{table}' has no '{field}' column")]
    MissingKey { table: String, field: String },

    #[error("Failed to retrieve records from '{table}': {source}")]
    Fetch {
        table: String,
        #[source]
        source: StoreError,
    },

    #[error("Unable to insert record into '{table}' (ID: {key}): {source}")]
    Insert {
        table: String,
        key: String,
        #[source]
        source: StoreError,
    },

    /// The record was copied to the archive but is still live.
    #[error("Unable to delete record from '{table}' (ID: {key}): {source}")]
    Purge {
        table: String,
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("Unable to update structure of '{table}': {source}")]
    Schema {
        table: String,
        #[source]
        source: SchemaError,
    },

    #[error("Archive run cancelled")]
    Cancelled,
}

impl ArchiveError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ArchiveError::MissingPredicate { .. } | ArchiveError::UnknownTable { .. } => {
                ErrorKind::Config
            }
            ArchiveError::Fetch { .. } => ErrorKind::Fetch,
            ArchiveError::MissingKey { .. }
            | ArchiveError::Insert { .. }
            | ArchiveError::Purge { .. } => ErrorKind::Write,
            ArchiveError::Schema { .. } => ErrorKind::Schema,
            ArchiveError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Whether running again without operator intervention may succeed.
    ///
    /// Rows already moved stay moved, so a later run resumes where this one
    /// stopped. Configuration and schema failures, and rows without a key
    /// column, repeat until fixed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ArchiveError::MissingKey { .. } => false,
            _ => matches!(
                self.kind(),
                ErrorKind::Fetch | ErrorKind::Write | ErrorKind::Cancelled
            ),
        }
    }

    /// Table the failure happened in, when there is one.
    pub fn table(&self) -> Option<&str> {
        match self {
            ArchiveError::MissingPredicate { table }
            | ArchiveError::UnknownTable { table }
            | ArchiveError::MissingKey { table, .. }
            | ArchiveError::Fetch { table, .. }
            | ArchiveError::Insert { table, .. }
            | ArchiveError::Purge { table, .. }
            | ArchiveError::Schema { table, .. } => Some(table),
            ArchiveError::Cancelled => None,
        }
    }
}

/// A failed run together with what it achieved before failing.
///
/// Moved records are never rolled back, so `records_archived` is exact even
/// on failure and a failure is distinguishable from a run that archived
/// nothing.
#[derive(Debug, Error)]
#[error("{error} ({records_archived} records archived before failure)")]
pub struct ArchiveFailure {
    #[source]
    pub error: ArchiveError,
    pub records_archived: u64,
}

impl ArchiveFailure {
    pub fn new(error: ArchiveError, records_archived: u64) -> Self {
        Self {
            error,
            records_archived,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}
