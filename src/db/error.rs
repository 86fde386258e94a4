//! Database error definitions.

use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

use crate::config::Driver;

/// Errors raised by the connection handle, query builder and models.
#[derive(Debug, Error)]
pub enum DbError {
    /// Opening the connection failed. The DSN never carries credentials.
    #[error("could not connect to `{dsn}`: {source}")]
    Connect {
        dsn: String,
        #[source]
        source: rusqlite::Error,
    },

    /// The configured driver is recognized but not linked into this build.
    #[error("database driver `{0}` is not supported by this build")]
    UnsupportedDriver(Driver),

    /// The builder was given something it refuses to put in SQL.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    /// `find_or_fail` and `refresh` on a missing row.
    #[error("{model} with {key} `{id}` not found")]
    ModelNotFound {
        model: &'static str,
        key: &'static str,
        id: String,
    },

    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

/// A unit of work failed and was rolled back.
///
/// When the rollback itself fails, its error is kept alongside the cause.
#[derive(Debug)]
pub struct TransactionError {
    cause: Box<dyn StdError + Send + Sync>,
    rollback: Option<rusqlite::Error>,
}

impl TransactionError {
    pub(crate) fn new(cause: Box<dyn StdError + Send + Sync>, rollback: Option<rusqlite::Error>) -> Self {
        Self { cause, rollback }
    }

    /// The error that aborted the unit of work.
    pub fn cause(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.cause.as_ref()
    }

    /// Take the cause out, e.g. to downcast it back to the caller's error type.
    pub fn into_cause(self) -> Box<dyn StdError + Send + Sync> {
        self.cause
    }

    /// The rollback failure, if rolling back also failed.
    pub fn rollback_error(&self) -> Option<&rusqlite::Error> {
        self.rollback.as_ref()
    }
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transaction rolled back: {}", self.cause)?;
        if let Some(rollback) = &self.rollback {
            write!(f, " (rollback also failed: {rollback})")?;
        }
        Ok(())
    }
}

impl StdError for TransactionError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.cause.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_error_chains_rollback_failure() {
        let err = TransactionError::new(
            "stock went negative".into(),
            Some(rusqlite::Error::InvalidQuery),
        );
        let text = err.to_string();
        assert!(text.starts_with("transaction rolled back: stock went negative"));
        assert!(text.contains("rollback also failed"));
        assert!(err.source().is_some());
        assert!(err.rollback_error().is_some());
    }

    #[test]
    fn test_model_not_found_display() {
        let err = DbError::ModelNotFound {
            model: "Product",
            key: "id",
            id: "9".into(),
        };
        assert_eq!(err.to_string(), "Product with id `9` not found");
    }
}
