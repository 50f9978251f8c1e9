//! Client error type.

use std::time::Duration;

use sqlx::error::ErrorKind;
use thiserror::Error;

/// Errors returned by every client operation.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The record required by the operation does not exist.
    #[error("{model} record not found")]
    NotFound {
        /// Model name, e.g. `"Order"`.
        model: &'static str,
    },

    /// A unique constraint rejected the write.
    #[error("unique constraint violated on {model}: {constraint}")]
    UniqueViolation {
        /// Model name.
        model: &'static str,
        /// Constraint or index name reported by the database.
        constraint: String,
    },

    /// A foreign key constraint rejected the write.
    #[error("foreign key constraint violated on {model}: {constraint}")]
    ForeignKeyViolation {
        /// Model name.
        model: &'static str,
        /// Constraint name reported by the database.
        constraint: String,
    },

    /// A check constraint rejected the write.
    #[error("check constraint violated on {model}: {constraint}")]
    CheckViolation {
        /// Model name.
        model: &'static str,
        /// Constraint name reported by the database.
        constraint: String,
    },

    /// The arguments of a call are invalid.
    #[error("invalid arguments: {0}")]
    Validation(String),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// An interactive transaction ran longer than its timeout.
    #[error("transaction exceeded its timeout of {0:?}")]
    TransactionTimeout(Duration),

    /// No connection became available within `max_wait`.
    #[error("could not start a transaction within {0:?}")]
    TransactionStartTimeout(Duration),

    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration error from sqlx.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl ClientError {
    /// Map a sqlx error raised while operating on `model` to a typed error.
    pub(crate) fn from_sqlx(model: &'static str, err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            let constraint = db_err.constraint().unwrap_or_default().to_owned();
            match db_err.kind() {
                ErrorKind::UniqueViolation => {
                    return Self::UniqueViolation { model, constraint };
                }
                ErrorKind::ForeignKeyViolation => {
                    return Self::ForeignKeyViolation { model, constraint };
                }
                ErrorKind::CheckViolation => {
                    return Self::CheckViolation { model, constraint };
                }
                ErrorKind::NotNullViolation => {
                    return Self::Validation(format!("{model}: {}", db_err.message()));
                }
                _ => {}
            }
        }
        if matches!(err, sqlx::Error::RowNotFound) {
            return Self::NotFound { model };
        }
        Self::Database(err)
    }

    /// Whether this error means the target record is missing.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether this error is a unique constraint violation.
    #[must_use]
    pub const fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation { .. })
    }
}
