//! Shared fixtures for cloak-core integration tests.

#![allow(dead_code, clippy::disallowed_types)]

use std::{
    collections::BTreeSet,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use bytes::Bytes;
use cloak_core::{
    AvatarError, AvatarSource, Environment, PersonaKeys, ProfileIdentifier, Storage,
};
use cloak_crypto::{CryptoKey, PrivateKey};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Deterministic environment: seeded ChaCha RNG and a clock that advances
/// one millisecond per reading.
#[derive(Clone)]
pub struct SeededEnv {
    rng: Arc<Mutex<ChaCha20Rng>>,
    clock_ms: Arc<AtomicU64>,
}

impl SeededEnv {
    /// Environment whose randomness is fixed by `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Arc::new(Mutex::new(ChaCha20Rng::seed_from_u64(seed))),
            clock_ms: Arc::new(AtomicU64::new(1_700_000_000_000)),
        }
    }
}

impl Environment for SeededEnv {
    fn wall_clock_ms(&self) -> u64 {
        self.clock_ms.fetch_add(1, Ordering::SeqCst)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().unwrap().fill_bytes(buffer);
    }
}

/// Avatar source serving a fixed image for a set of profiles and failing
/// for everyone else.
#[derive(Clone, Default)]
pub struct FixedAvatars {
    known: Arc<BTreeSet<ProfileIdentifier>>,
}

impl FixedAvatars {
    /// Serve [`AVATAR`] for `profiles`.
    pub fn for_profiles(profiles: impl IntoIterator<Item = ProfileIdentifier>) -> Self {
        Self { known: Arc::new(profiles.into_iter().collect()) }
    }
}

/// Image bytes every known profile gets
pub const AVATAR: &[u8] = b"\x89PNG avatar";

impl AvatarSource for FixedAvatars {
    async fn fetch_avatar(&self, profile: &ProfileIdentifier) -> Result<Bytes, AvatarError> {
        if self.known.contains(profile) {
            Ok(Bytes::from_static(AVATAR))
        } else {
            Err(AvatarError::Fetch("connection reset".to_string()))
        }
    }
}

/// `person:twitter.com/<user_id>`
pub fn profile(user_id: &str) -> ProfileIdentifier {
    ProfileIdentifier::new("twitter.com", user_id).unwrap()
}

/// Deterministic valid scalar distinguished by `byte`
pub fn private_key(byte: u8) -> PrivateKey {
    let mut scalar = [0u8; 32];
    scalar[31] = byte;
    scalar[0] = 0x11;
    PrivateKey::from_bytes(&scalar).unwrap()
}

/// Keys for a persona derived from `byte`, with or without the private half.
pub fn persona_keys(byte: u8, with_private_key: bool) -> PersonaKeys {
    let key = private_key(byte);
    PersonaKeys {
        public_key: CryptoKey::EcdhPublic(key.public_key()).to_jwk(),
        private_key: with_private_key.then(|| CryptoKey::EcdhPrivate(key).to_jwk()),
        ..PersonaKeys::default()
    }
}

/// Asserts both sides of every link agree.
pub fn assert_links_consistent(storage: &impl Storage) {
    let profiles = storage.list_profiles().unwrap();
    let personas = storage.list_personas().unwrap();

    for profile in &profiles {
        if let Some(linked) = &profile.linked_persona {
            let persona = personas
                .iter()
                .find(|p| &p.identifier == linked)
                .unwrap_or_else(|| panic!("{} points at missing {linked}", profile.identifier));
            assert!(
                persona.linked_profiles.contains_key(&profile.identifier),
                "{linked} does not list {}",
                profile.identifier
            );
        }
    }
    for persona in &personas {
        for linked in persona.linked_profiles.keys() {
            let profile = profiles
                .iter()
                .find(|p| &p.identifier == linked)
                .unwrap_or_else(|| panic!("{} lists missing {linked}", persona.identifier));
            assert_eq!(profile.linked_persona.as_ref(), Some(&persona.identifier));
        }
    }
}
