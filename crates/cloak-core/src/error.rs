//! Error types for the Cloak identity layer.
//!
//! Strongly-typed errors per concern: identifier parsing, and identity
//! operations over the record store. Absence of a profile, persona or key is
//! never an error on read paths - it is an `Option`.

use cloak_crypto::KeyDerivationError;
use thiserror::Error;

use crate::{
    identifier::{PersonaIdentifier, ProfileIdentifier},
    storage::StorageError,
};

/// Malformed identifier text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    /// Text does not start with a known identifier prefix
    #[error("unknown identifier prefix in {0:?}")]
    UnknownPrefix(String),

    /// Prefix is known but the body is malformed
    #[error("malformed identifier {text:?}: {reason}")]
    Malformed {
        /// The rejected text
        text: String,
        /// What is wrong with it
        reason: &'static str,
    },
}

/// Errors from identity service and record store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// Mnemonic or key material was rejected
    #[error(transparent)]
    KeyDerivation(#[from] KeyDerivationError),

    /// Safe delete refused: the persona holds private key material that
    /// would be unrecoverable after deletion
    #[error("refusing to delete {persona}: it holds a private key")]
    UnsafeDeleteRefused {
        /// Persona that was kept
        persona: PersonaIdentifier,
    },

    /// Persona still has linked profiles and cannot be deleted
    #[error("persona {persona} is still linked to {linked} profile(s)")]
    PersonaStillLinked {
        /// Persona that was kept
        persona: PersonaIdentifier,
        /// Number of profiles still linked
        linked: usize,
    },

    /// A persona with this identifier already exists
    #[error("persona {0} already exists")]
    PersonaAlreadyExists(PersonaIdentifier),

    /// A profile with this identifier already exists
    #[error("profile {0} already exists")]
    ProfileAlreadyExists(ProfileIdentifier),

    /// Write targeted a persona that is not stored
    #[error("persona {0} not found")]
    PersonaNotFound(PersonaIdentifier),

    /// Write targeted a profile that is not stored
    #[error("profile {0} not found")]
    ProfileNotFound(ProfileIdentifier),

    /// A step inside a consistent write scope failed in storage; nothing
    /// from the scope was applied
    #[error("transaction aborted: {0}")]
    TransactionAborted(StorageError),

    /// Storage failure outside a write scope
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl IdentityError {
    /// Returns true if the error needs user-visible handling (wrong recovery
    /// phrase, refused delete, duplicate persona) rather than indicating a
    /// storage fault.
    pub fn is_user_facing(&self) -> bool {
        match self {
            Self::KeyDerivation(_)
            | Self::UnsafeDeleteRefused { .. }
            | Self::PersonaStillLinked { .. }
            | Self::PersonaAlreadyExists(_)
            | Self::ProfileAlreadyExists(_)
            | Self::PersonaNotFound(_)
            | Self::ProfileNotFound(_) => true,
            Self::TransactionAborted(_) | Self::Storage(_) => false,
        }
    }

    /// Reclassify storage failures that happened inside a write scope.
    pub(crate) fn into_aborted(self) -> Self {
        match self {
            Self::Storage(err) => Self::TransactionAborted(err),
            other => other,
        }
    }
}
