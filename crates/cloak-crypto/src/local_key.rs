//! Local key derivation and AES-256-GCM encryption
//!
//! All functions are pure - nonces must be provided by the caller.

use std::fmt;

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::{
    error::KeyDerivationError,
    jwk::CryptoKey,
    keys::PublicKey,
};

/// Local key size (AES-256)
pub const LOCAL_KEY_SIZE: usize = 32;

/// AES-GCM nonce size
pub const LOCAL_KEY_NONCE_SIZE: usize = 12;

/// PBKDF2 iteration count for local key derivation
pub const LOCAL_KEY_ITERATIONS: u32 = 100_000;

/// Symmetric key encrypting data scoped to one persona.
#[derive(Clone)]
pub struct LocalKey {
    key: [u8; LOCAL_KEY_SIZE],
}

impl LocalKey {
    /// Wrap raw key bytes.
    ///
    /// # Errors
    ///
    /// - `InvalidKey`: length is not [`LOCAL_KEY_SIZE`]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyDerivationError> {
        let key: [u8; LOCAL_KEY_SIZE] =
            bytes.try_into().map_err(|_| KeyDerivationError::InvalidKey {
                reason: format!("local key must be {LOCAL_KEY_SIZE} bytes, got {}", bytes.len()),
            })?;
        Ok(Self { key })
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; LOCAL_KEY_SIZE] {
        &self.key
    }

    /// Encrypt with AES-256-GCM. Output is ciphertext followed by the tag.
    ///
    /// # Security
    ///
    /// A nonce must never be reused with the same key. Callers MUST supply
    /// cryptographically secure random nonces in production.
    pub fn encrypt(&self, nonce: [u8; LOCAL_KEY_NONCE_SIZE], plaintext: &[u8]) -> Vec<u8> {
        let cipher = Aes256Gcm::new((&self.key).into());

        let Ok(ciphertext) = cipher.encrypt(Nonce::from_slice(&nonce), plaintext) else {
            unreachable!("AES-256-GCM encryption cannot fail with valid inputs");
        };

        ciphertext
    }

    /// Decrypt and authenticate.
    ///
    /// # Errors
    ///
    /// - `Decryption`: wrong key or nonce, or the ciphertext was modified
    pub fn decrypt(
        &self,
        nonce: [u8; LOCAL_KEY_NONCE_SIZE],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, KeyDerivationError> {
        let cipher = Aes256Gcm::new((&self.key).into());
        cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext)
            .map_err(|_| KeyDerivationError::Decryption)
    }
}

impl PartialEq for LocalKey {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for LocalKey {}

impl fmt::Debug for LocalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LocalKey([REDACTED])")
    }
}

impl Drop for LocalKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// Derive the local key of a persona from its public key and mnemonic words.
///
/// PBKDF2-HMAC-SHA256 with the words as password and the public key's JWK
/// `x || y` text as salt. The private key is not needed, so anyone holding
/// the words can rebuild the key.
///
/// # Errors
///
/// - `InvalidMnemonic`: the words are empty
pub fn derive_local_key(
    public_key: &PublicKey,
    mnemonic_words: &str,
) -> Result<LocalKey, KeyDerivationError> {
    if mnemonic_words.trim().is_empty() {
        return Err(KeyDerivationError::InvalidMnemonic {
            reason: "mnemonic words are empty".to_string(),
        });
    }

    let jwk = CryptoKey::EcdhPublic(*public_key).to_jwk();
    let mut salt = String::with_capacity(86);
    salt.push_str(jwk.x.as_deref().unwrap_or_default());
    salt.push_str(jwk.y.as_deref().unwrap_or_default());

    let mut key = [0u8; LOCAL_KEY_SIZE];
    pbkdf2::pbkdf2_hmac::<Sha256>(
        mnemonic_words.as_bytes(),
        salt.as_bytes(),
        LOCAL_KEY_ITERATIONS,
        &mut key,
    );

    let local_key = LocalKey { key };
    key.zeroize();
    Ok(local_key)
}
