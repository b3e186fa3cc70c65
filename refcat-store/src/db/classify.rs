//! Error Classifier
//!
//! Folds `sqlx` failures into the closed [`refcat_common::ErrorKind`] set at
//! the repository boundary. Anything not recognised is kept as
//! [`Error::Database`] with the operation, entity and id that failed.

use refcat_common::Error;
use sqlx::error::ErrorKind as DbErrorKind;
use std::fmt::Display;

/// SQLITE_CONSTRAINT_PRIMARYKEY
const SQLITE_CONSTRAINT_PRIMARYKEY: &str = "1555";
/// SQLITE_CONSTRAINT_UNIQUE
const SQLITE_CONSTRAINT_UNIQUE: &str = "2067";

/// Classify a storage failure for `op` on `entity` identified by `id`
pub fn classify(err: sqlx::Error, op: &'static str, entity: &'static str, id: impl Display) -> Error {
    match &err {
        sqlx::Error::RowNotFound => return Error::not_found(entity, id),
        sqlx::Error::PoolTimedOut => return Error::DeadlineExceeded,
        sqlx::Error::Database(db_err) => {
            let unique_by_code = matches!(
                db_err.code().as_deref(),
                Some(SQLITE_CONSTRAINT_PRIMARYKEY) | Some(SQLITE_CONSTRAINT_UNIQUE)
            );
            match db_err.kind() {
                DbErrorKind::UniqueViolation => return Error::already_exists(entity, id),
                _ if unique_by_code => return Error::already_exists(entity, id),
                DbErrorKind::ForeignKeyViolation => return Error::not_found(entity, id),
                DbErrorKind::CheckViolation | DbErrorKind::NotNullViolation => {
                    let message = db_err.message().to_string();
                    return Error::validation(entity, id, message);
                }
                _ => {}
            }
        }
        _ => {}
    }

    Error::Database {
        op,
        entity,
        id: id.to_string(),
        source: err,
    }
}

/// Attach classification context to a `sqlx` result
pub trait ClassifyExt<T> {
    fn classify(self, op: &'static str, entity: &'static str, id: impl Display) -> refcat_common::Result<T>;
}

impl<T> ClassifyExt<T> for Result<T, sqlx::Error> {
    fn classify(self, op: &'static str, entity: &'static str, id: impl Display) -> refcat_common::Result<T> {
        self.map_err(|e| classify(e, op, entity, id))
    }
}
