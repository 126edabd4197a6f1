//! Mnemonic-based key pair generation and recovery
//!
//! A persona created from a mnemonic can always be rebuilt from the same
//! words and password. Generation is recovery applied to fresh words.

use std::fmt;

use bip32::{DerivationPath, XPrv};
use bip39::Mnemonic;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::{
    error::KeyDerivationError,
    keys::{KeyPair, PrivateKey},
};

/// BIP-32 path the persona key is derived along
pub const DERIVATION_PATH: &str = "m/44'/60'/0'/0/0";

/// Entropy for a 12-word mnemonic
pub const MNEMONIC_ENTROPY_SIZE: usize = 16;

/// Parameters needed to reproduce a key pair from its words.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MnemonicParameter {
    /// BIP-32 derivation path
    pub path: String,
    /// Whether a non-empty password was mixed into the seed
    pub with_password: bool,
}

/// Mnemonic words as stored with a persona. Never contains the password.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MnemonicRecord {
    /// Space separated, normalized BIP-39 words
    pub words: String,
    /// Derivation parameters
    pub parameter: MnemonicParameter,
}

impl fmt::Debug for MnemonicRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MnemonicRecord")
            .field("words", &"[REDACTED]")
            .field("parameter", &self.parameter)
            .finish()
    }
}

/// Result of generating or recovering a persona key pair.
#[derive(Debug, Clone)]
pub struct MnemonicKeyPair {
    /// The derived key pair
    pub key_pair: KeyPair,
    /// Words and parameters to store alongside the persona
    pub mnemonic_record: MnemonicRecord,
}

/// Generate a fresh mnemonic from `entropy` and derive its key pair.
///
/// Same entropy and password always give the same key pair.
///
/// # Errors
///
/// - `InvalidMnemonic`: entropy could not be encoded (never for 16 bytes)
/// - `Derivation`: hierarchical derivation failed
pub fn generate_key_pair_from_mnemonic(
    password: &str,
    entropy: [u8; MNEMONIC_ENTROPY_SIZE],
) -> Result<MnemonicKeyPair, KeyDerivationError> {
    let entropy = Zeroizing::new(entropy);
    let mnemonic = Mnemonic::from_entropy(entropy.as_slice())
        .map_err(|e| KeyDerivationError::InvalidMnemonic { reason: e.to_string() })?;
    let words = Zeroizing::new(mnemonic.to_string());

    recover_key_pair_from_mnemonic(&words, password)
}

/// Rebuild a key pair from mnemonic words and the password used at creation.
///
/// Words are matched case-insensitively and extra whitespace is ignored. A
/// wrong password still yields a valid, but different, key pair; callers
/// detect it by comparing the resulting persona identifier.
///
/// # Errors
///
/// - `InvalidMnemonic`: unknown words, wrong word count or bad checksum
/// - `Derivation`: hierarchical derivation failed
pub fn recover_key_pair_from_mnemonic(
    words: &str,
    password: &str,
) -> Result<MnemonicKeyPair, KeyDerivationError> {
    let normalized = Zeroizing::new(normalize_words(words));
    if normalized.is_empty() {
        return Err(KeyDerivationError::InvalidMnemonic {
            reason: "mnemonic words are empty".to_string(),
        });
    }

    let mnemonic = Mnemonic::parse(normalized.as_str())
        .map_err(|e| KeyDerivationError::InvalidMnemonic { reason: e.to_string() })?;
    let seed = Zeroizing::new(mnemonic.to_seed(password));

    let path: DerivationPath = DERIVATION_PATH
        .parse()
        .map_err(|e: bip32::Error| KeyDerivationError::Derivation { reason: e.to_string() })?;
    let xprv = XPrv::derive_from_path(seed.as_slice(), &path)
        .map_err(|e| KeyDerivationError::Derivation { reason: e.to_string() })?;

    let private_key = PrivateKey::from_bytes(&xprv.private_key().to_bytes())?;

    Ok(MnemonicKeyPair {
        key_pair: KeyPair::from_private_key(private_key),
        mnemonic_record: MnemonicRecord {
            words: normalized.to_string(),
            parameter: MnemonicParameter {
                path: DERIVATION_PATH.to_string(),
                with_password: !password.is_empty(),
            },
        },
    })
}

fn normalize_words(words: &str) -> String {
    words.split_whitespace().map(str::to_lowercase).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENTROPY: [u8; MNEMONIC_ENTROPY_SIZE] = [0u8; MNEMONIC_ENTROPY_SIZE];

    const ZERO_ENTROPY_WORDS: &str = "abandon abandon abandon abandon abandon abandon abandon \
                                      abandon abandon abandon abandon about";

    #[test]
    fn zero_entropy_gives_reference_words() {
        let generated = generate_key_pair_from_mnemonic("", ENTROPY).unwrap();
        assert_eq!(generated.mnemonic_record.words, ZERO_ENTROPY_WORDS);
        assert_eq!(generated.mnemonic_record.parameter.path, DERIVATION_PATH);
        assert!(!generated.mnemonic_record.parameter.with_password);
    }

    #[test]
    fn generation_is_deterministic() {
        let a = generate_key_pair_from_mnemonic("hunter2", [9u8; 16]).unwrap();
        let b = generate_key_pair_from_mnemonic("hunter2", [9u8; 16]).unwrap();
        assert_eq!(a.key_pair, b.key_pair);
        assert_eq!(a.mnemonic_record, b.mnemonic_record);
    }

    #[test]
    fn recovery_matches_generation() {
        let generated = generate_key_pair_from_mnemonic("pw", [5u8; 16]).unwrap();
        let recovered =
            recover_key_pair_from_mnemonic(&generated.mnemonic_record.words, "pw").unwrap();
        assert_eq!(generated.key_pair, recovered.key_pair);
        assert!(recovered.mnemonic_record.parameter.with_password);
    }

    #[test]
    fn password_changes_key_pair() {
        let a = recover_key_pair_from_mnemonic(ZERO_ENTROPY_WORDS, "").unwrap();
        let b = recover_key_pair_from_mnemonic(ZERO_ENTROPY_WORDS, "other").unwrap();
        assert_ne!(a.key_pair.public_key, b.key_pair.public_key);
    }

    #[test]
    fn recovery_tolerates_case_and_spacing() {
        let messy = format!("  {}  ", ZERO_ENTROPY_WORDS.to_uppercase().replace(' ', "   "));
        let a = recover_key_pair_from_mnemonic(&messy, "pw").unwrap();
        let b = recover_key_pair_from_mnemonic(ZERO_ENTROPY_WORDS, "pw").unwrap();
        assert_eq!(a.key_pair, b.key_pair);
        assert_eq!(a.mnemonic_record.words, ZERO_ENTROPY_WORDS);
    }

    #[test]
    fn bad_checksum_is_rejected() {
        let words = "abandon abandon abandon abandon abandon abandon abandon abandon abandon \
                     abandon abandon abandon";
        let err = recover_key_pair_from_mnemonic(words, "").unwrap_err();
        assert!(matches!(err, KeyDerivationError::InvalidMnemonic { .. }));
    }

    #[test]
    fn unknown_word_is_rejected() {
        let err = recover_key_pair_from_mnemonic("notaword ".repeat(12).as_str(), "").unwrap_err();
        assert!(matches!(err, KeyDerivationError::InvalidMnemonic { .. }));
    }

    #[test]
    fn empty_words_are_rejected() {
        let err = recover_key_pair_from_mnemonic("", "").unwrap_err();
        assert!(matches!(err, KeyDerivationError::InvalidMnemonic { .. }));
    }

    #[test]
    fn debug_redacts_words() {
        let generated = generate_key_pair_from_mnemonic("", ENTROPY).unwrap();
        assert!(!format!("{:?}", generated.mnemonic_record).contains("abandon"));
    }
}
