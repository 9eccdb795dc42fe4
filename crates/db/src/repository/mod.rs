//! Repository functions — one function per database operation.
//!
//! Every function takes a `&DbPool` and returns a `Result<T, DbError>`.
//! No business logic, no domain types — pure SQL.

pub mod workflows;
pub mod executions;

use crate::DbError;

/// Map a unique-key violation to [`DbError::Conflict`].
pub(crate) fn conflict_on_duplicate(err: sqlx::Error, what: &str) -> DbError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            DbError::Conflict(format!("{what} already exists"))
        }
        _ => DbError::Sqlx(err),
    }
}
