//! Storage error types.

use thiserror::Error;

/// Errors from storage backends.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Backend I/O failure (database open, transaction, table access)
    #[error("storage I/O error: {0}")]
    Io(String),

    /// Record could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A stored key is not a valid identifier
    #[error("corrupt key {key:?}: {reason}")]
    CorruptKey {
        /// The stored key text
        key: String,
        /// Why it was rejected
        reason: String,
    },
}

impl StorageError {
    /// Returns true if retrying the same operation may succeed.
    ///
    /// Only I/O failures are transient. Encoding and key corruption are
    /// properties of the stored bytes and will fail again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
