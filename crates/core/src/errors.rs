//! Error types shared across the workspace.

use thiserror::Error;

/// Convenient result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The remote blob store has not been configured. Sync entry points
    /// return this before performing any I/O.
    #[error("sync is not configured: {0}")]
    Configuration(String),

    /// Another sync attempt holds the in-process guard. Surfaced to callers
    /// as a busy result, never as a crash.
    #[error("another sync is already in progress")]
    SyncInProgress,

    /// A downloaded blob could not be decoded as an operation array.
    #[error("malformed remote blob '{name}': {reason}")]
    MalformedBlob { name: String, reason: String },

    #[error("validation error: {0}")]
    Validation(String),
}

impl Error {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn malformed_blob(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedBlob {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Storage-level failures, produced by the SQLite crate and mapped into
/// [`Error::Database`].
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("connection pool error: {0}")]
    Pool(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("{0}")]
    Internal(String),
}

/// Failures talking to the remote blob store. No retry is attempted at this
/// level; the engine's caller decides whether to re-invoke sync.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("remote store error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl TransportError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound(key.into())
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }
}
