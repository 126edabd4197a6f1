//! Cloak Cryptographic Primitives
//!
//! Key material for personas: secp256k1 key pairs recovered from mnemonic
//! phrases, symmetric local keys derived from a public key plus the mnemonic
//! words, and conversion between in-memory keys and portable JSON Web Keys.
//! Pure functions with deterministic outputs. Callers provide random bytes
//! for deterministic testing.
//!
//! # Key Lifecycle
//!
//! ```text
//! Entropy (16 bytes) ──► BIP-39 mnemonic (12 words)
//!                               │  + password
//!                               ▼
//!                        BIP-39 seed (64 bytes)
//!                               │  BIP-32 m/44'/60'/0'/0/0
//!                               ▼
//!                     secp256k1 key pair ──► PersonaIdentifier
//!                               │
//!      public key x||y (salt) + mnemonic words (password)
//!                               │  PBKDF2-HMAC-SHA256
//!                               ▼
//!                     Local key (AES-256-GCM)
//! ```
//!
//! The password is never part of any stored record. Losing it makes the
//! mnemonic useless for recovery.
//!
//! # Security
//!
//! - The local key never requires the private key, so a persona imported
//!   with only its public half can still read data scoped to it once the
//!   words are known
//! - Secret key bytes are zeroized on drop
//! - `Debug` output redacts every secret component

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
mod jwk;
mod keys;
mod local_key;
mod mnemonic;

pub use error::KeyDerivationError;
pub use jwk::{CryptoKey, JsonWebKey, KeyAlgorithm};
pub use keys::{KeyPair, PrivateKey, PublicKey};
pub use local_key::{
    LOCAL_KEY_ITERATIONS, LOCAL_KEY_NONCE_SIZE, LOCAL_KEY_SIZE, LocalKey, derive_local_key,
};
pub use mnemonic::{
    DERIVATION_PATH, MNEMONIC_ENTROPY_SIZE, MnemonicKeyPair, MnemonicParameter, MnemonicRecord,
    generate_key_pair_from_mnemonic, recover_key_pair_from_mnemonic,
};
