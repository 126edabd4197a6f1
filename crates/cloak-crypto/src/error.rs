//! Error types for key derivation and key conversion

use thiserror::Error;

use crate::jwk::KeyAlgorithm;

/// Errors from mnemonic handling, key derivation and JWK conversion.
///
/// These are surfaced to the caller verbatim: a wrong recovery phrase or a
/// corrupt key file needs user-visible handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyDerivationError {
    /// Mnemonic phrase is not a valid word sequence
    #[error("invalid mnemonic: {reason}")]
    InvalidMnemonic {
        /// Why the phrase was rejected
        reason: String,
    },

    /// Key material is malformed (bad encoding, wrong length, off-curve point)
    #[error("invalid key material: {reason}")]
    InvalidKey {
        /// Why the key was rejected
        reason: String,
    },

    /// JWK key type does not belong to the requested algorithm family
    #[error("unsupported key type {kty:?} for {algorithm:?} keys")]
    UnsupportedKeyType {
        /// The `kty` member found in the JWK
        kty: String,
        /// The family the caller asked for
        algorithm: KeyAlgorithm,
    },

    /// Hierarchical derivation from the seed failed
    #[error("key derivation failed: {reason}")]
    Derivation {
        /// Underlying failure
        reason: String,
    },

    /// AEAD authentication failed (wrong key, nonce or tampered ciphertext)
    #[error("decryption failed")]
    Decryption,
}

impl KeyDerivationError {
    /// Returns true if the error points at user input (phrase or password)
    /// rather than at stored key material.
    pub fn is_user_input(&self) -> bool {
        matches!(self, Self::InvalidMnemonic { .. } | Self::Decryption)
    }
}
