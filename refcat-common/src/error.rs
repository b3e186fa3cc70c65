//! Common error types for the reference catalog
//!
//! Every storage failure is folded into a closed set of outcomes (see
//! [`ErrorKind`]) before it leaves the repository layer, so callers never
//! inspect engine-specific codes.

use std::fmt;
use thiserror::Error;

/// Common result type for catalog operations
pub type Result<T> = std::result::Result<T, Error>;

/// Closed outcome set callers branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    Validation,
    Canceled,
    DeadlineExceeded,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::AlreadyExists => "already exists",
            ErrorKind::Validation => "validation",
            ErrorKind::Canceled => "canceled",
            ErrorKind::DeadlineExceeded => "deadline exceeded",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Catalog error
#[derive(Error, Debug)]
pub enum Error {
    /// Requested row (or the parent it references) does not exist
    #[error("{entity} {id}: not found")]
    NotFound { entity: &'static str, id: String },

    /// Uniqueness constraint already satisfied by another row
    #[error("{entity} {id}: already exists")]
    AlreadyExists { entity: &'static str, id: String },

    /// Input rejected by a check constraint or boundary validation
    #[error("{entity} {id}: invalid: {message}")]
    Validation {
        entity: &'static str,
        id: String,
        message: String,
    },

    /// Caller canceled the operation before it completed
    #[error("operation canceled")]
    Canceled,

    /// Caller-imposed deadline or pool acquire timeout elapsed
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Unclassified storage failure, wrapped with diagnostic context
    #[error("{op} {entity} {id}: {source}")]
    Database {
        op: &'static str,
        entity: &'static str,
        id: String,
        #[source]
        source: sqlx::Error,
    },

    /// Internal invariant violation (e.g. undecodable stored value)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn not_found(entity: &'static str, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn already_exists(entity: &'static str, id: impl fmt::Display) -> Self {
        Error::AlreadyExists {
            entity,
            id: id.to_string(),
        }
    }

    pub fn validation(
        entity: &'static str,
        id: impl fmt::Display,
        message: impl Into<String>,
    ) -> Self {
        Error::Validation {
            entity,
            id: id.to_string(),
            message: message.into(),
        }
    }

    /// Outcome class of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Error::Validation { .. } => ErrorKind::Validation,
            Error::Canceled => ErrorKind::Canceled,
            Error::DeadlineExceeded => ErrorKind::DeadlineExceeded,
            Error::Database { .. } | Error::Internal(_) | Error::Config(_) | Error::Io(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// True when SQLite reported a busy or locked database.
    ///
    /// These are transient under write contention and safe to retry as a
    /// whole operation.
    pub fn is_lock_contention(&self) -> bool {
        match self {
            Error::Database { source, .. } => is_sqlite_busy(source),
            _ => false,
        }
    }
}

fn is_sqlite_busy(err: &sqlx::Error) -> bool {
    let sqlx::Error::Database(db_err) = err else {
        return false;
    };
    // SQLITE_BUSY = 5, SQLITE_LOCKED = 6; extended codes keep the primary
    // code in the low byte.
    let primary = db_err
        .code()
        .and_then(|code| code.parse::<i32>().ok())
        .map(|code| code & 0xff);
    matches!(primary, Some(5) | Some(6)) || db_err.message().contains("database is locked")
}

impl From<sqlx::Error> for Error {
    fn from(source: sqlx::Error) -> Self {
        Error::Database {
            op: "query",
            entity: "database",
            id: String::new(),
            source,
        }
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Error::DeadlineExceeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_folds_internal_variants() {
        assert_eq!(Error::Internal("x".into()).kind(), ErrorKind::Internal);
        assert_eq!(Error::Config("x".into()).kind(), ErrorKind::Internal);
        assert_eq!(Error::from(sqlx::Error::PoolClosed).kind(), ErrorKind::Internal);
        assert_eq!(Error::Canceled.kind(), ErrorKind::Canceled);
    }

    #[test]
    fn test_message_carries_entity_and_id() {
        let err = Error::not_found("ref_entry", "0000-abc");
        assert_eq!(err.to_string(), "ref_entry 0000-abc: not found");

        let err = Error::validation("ref_sense", 7, "position must be non-negative");
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("ref_sense 7"));
    }

    #[test]
    fn test_non_database_errors_are_not_lock_contention() {
        assert!(!Error::Internal("database is locked".into()).is_lock_contention());
        assert!(!Error::from(sqlx::Error::RowNotFound).is_lock_contention());
    }
}
