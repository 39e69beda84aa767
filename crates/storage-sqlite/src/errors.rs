//! Storage failures and their mapping into the shared error type.

use daybook_core::errors::{DatabaseError, Error};
use thiserror::Error;

/// Internal storage error. Converted into [`Error::Database`] at the
/// repository boundary so callers only ever see the shared type.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("query failed: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("connection failed: {0}")]
    Connection(#[from] diesel::result::ConnectionError),

    #[error("migration failed: {0}")]
    Migration(String),
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Pool(e) => Error::Database(DatabaseError::Pool(e.to_string())),
            StorageError::Query(e) => Error::Database(DatabaseError::Query(e.to_string())),
            StorageError::Connection(e) => Error::Database(DatabaseError::Query(e.to_string())),
            StorageError::Migration(message) => Error::Database(DatabaseError::Migration(message)),
        }
    }
}
