//! Property-based tests for persona key derivation
//!
//! These verify invariants that must hold for all inputs:
//! - Recovery is deterministic for the same words and password
//! - JWK conversion preserves every key's behavior
//! - Malformed key material never yields a key

use cloak_crypto::{
    CryptoKey, JsonWebKey, KeyAlgorithm, LocalKey, derive_local_key,
    generate_key_pair_from_mnemonic, recover_key_pair_from_mnemonic,
};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: Generating twice with the same entropy and password yields
    /// byte-identical key pairs
    #[test]
    fn prop_generation_is_deterministic(
        entropy in any::<[u8; 16]>(),
        password in "[a-zA-Z0-9]{0,16}",
    ) {
        let a = generate_key_pair_from_mnemonic(&password, entropy).unwrap();
        let b = generate_key_pair_from_mnemonic(&password, entropy).unwrap();

        let (a_bytes, b_bytes) =
            (a.key_pair.private_key.to_bytes(), b.key_pair.private_key.to_bytes());
        prop_assert_eq!(a_bytes.as_slice(), b_bytes.as_slice());
        prop_assert_eq!(
            a.key_pair.public_key.to_compressed_point(),
            b.key_pair.public_key.to_compressed_point()
        );
    }

    /// Property: The stored words plus the password recover the key pair
    #[test]
    fn prop_recovery_restores_generated_pair(
        entropy in any::<[u8; 16]>(),
        password in "[a-zA-Z0-9]{0,16}",
    ) {
        let generated = generate_key_pair_from_mnemonic(&password, entropy).unwrap();
        let recovered =
            recover_key_pair_from_mnemonic(&generated.mnemonic_record.words, &password).unwrap();

        prop_assert_eq!(generated.key_pair, recovered.key_pair);
        prop_assert_eq!(generated.mnemonic_record, recovered.mnemonic_record);
    }

    /// Property: An EC key pair survives JWK text export and import
    #[test]
    fn prop_ec_jwk_preserves_key_pair(entropy in any::<[u8; 16]>()) {
        let pair = generate_key_pair_from_mnemonic("", entropy).unwrap().key_pair;

        let private_jwk = CryptoKey::EcdhPrivate(pair.private_key.clone()).to_jwk();
        let parsed = JsonWebKey::from_json(&private_jwk.to_json()).unwrap();
        let imported = CryptoKey::from_jwk(&parsed, KeyAlgorithm::Ecdh).unwrap();

        prop_assert_eq!(imported.clone().into_private_key(), Some(pair.private_key));
        prop_assert_eq!(imported.into_public_key(), Some(pair.public_key));
    }

    /// Property: Any non-32-byte symmetric key is rejected
    #[test]
    fn prop_wrong_length_local_key_rejected(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
        prop_assume!(bytes.len() != 32);
        prop_assert!(LocalKey::from_bytes(&bytes).is_err());
    }
}

proptest! {
    // PBKDF2 runs 100k iterations per case
    #![proptest_config(ProptestConfig::with_cases(8))]

    /// Property: A local key converted to JWK and back encrypts identically
    #[test]
    fn prop_local_key_jwk_round_trip_encrypts_identically(
        entropy in any::<[u8; 16]>(),
        nonce in any::<[u8; 12]>(),
        plaintext in prop::collection::vec(any::<u8>(), 0..256),
    ) {
        let generated = generate_key_pair_from_mnemonic("", entropy).unwrap();
        let local_key = derive_local_key(
            &generated.key_pair.public_key,
            &generated.mnemonic_record.words,
        ).unwrap();

        let jwk = CryptoKey::Aes(local_key.clone()).to_jwk();
        let imported = CryptoKey::from_jwk(&jwk, KeyAlgorithm::Aes)
            .unwrap()
            .into_local_key()
            .unwrap();

        let original_ciphertext = local_key.encrypt(nonce, &plaintext);
        prop_assert_eq!(&imported.encrypt(nonce, &plaintext), &original_ciphertext);
        prop_assert_eq!(imported.decrypt(nonce, &original_ciphertext).unwrap(), plaintext);
    }

    /// Property: The local key depends only on the public key and the words
    #[test]
    fn prop_local_key_needs_no_private_key(entropy in any::<[u8; 16]>()) {
        let generated = generate_key_pair_from_mnemonic("pw", entropy).unwrap();
        let words = &generated.mnemonic_record.words;

        let public_only = CryptoKey::from_jwk(
            &CryptoKey::EcdhPublic(generated.key_pair.public_key).to_jwk(),
            KeyAlgorithm::Ecdh,
        ).unwrap().into_public_key().unwrap();

        prop_assert_eq!(
            derive_local_key(&generated.key_pair.public_key, words).unwrap(),
            derive_local_key(&public_only, words).unwrap()
        );
    }
}
