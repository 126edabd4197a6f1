//! Identity service: the public API over the record store.
//!
//! Every mutating call runs as exactly one consistent write scope, so a
//! logical operation is either fully applied or not at all. Reads never
//! fail for "not found": missing profiles and personas come back as
//! synthesized views and missing keys as `None`.
//!
//! After each successful write, and before the next write may start, the
//! service republishes the persona list on its [`ValueRef`], so subscribers
//! see committed changes in commit order.

use cloak_crypto::{
    CryptoKey, JsonWebKey, KeyAlgorithm, KeyDerivationError, LocalKey, MNEMONIC_ENTROPY_SIZE,
    MnemonicKeyPair, MnemonicRecord, PrivateKey, PublicKey, derive_local_key,
    generate_key_pair_from_mnemonic, recover_key_pair_from_mnemonic,
};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::{
    avatar::AvatarSource,
    db::{PersonaDb, match_all},
    env::Environment,
    error::IdentityError,
    identifier::{Identifier, PersonaIdentifier, ProfileIdentifier},
    record::{
        LinkedProfileDetails, NewPersona, PersonaPatch, PersonaRecord, ProfilePatch,
        ProfileRecord, UpdateMode,
    },
    storage::{Storage, Transaction},
    value_ref::ValueRef,
    view::{Persona, Profile},
};

/// How [`IdentityService::delete_persona`] treats private key material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteMode {
    /// Delete even when the persona holds a private key
    ForceDelete,
    /// Refuse with `UnsafeDeleteRefused` when it holds a private key
    SafeDelete,
}

/// Key material for creating a persona directly (the import path).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersonaKeys {
    /// Public key; the persona identifier is derived from it
    pub public_key: JsonWebKey,
    /// Private key; must belong to `public_key`
    pub private_key: Option<JsonWebKey>,
    /// AES local key
    pub local_key: Option<JsonWebKey>,
    /// Recovery words
    pub mnemonic: Option<MnemonicRecord>,
    /// User-chosen name
    pub nickname: Option<String>,
}

impl PersonaKeys {
    /// Keys of a freshly generated or recovered pair, with its derived local
    /// key.
    pub fn from_mnemonic_key_pair(
        generated: &MnemonicKeyPair,
        nickname: Option<String>,
    ) -> Result<Self, KeyDerivationError> {
        let key_pair = &generated.key_pair;
        let local_key =
            derive_local_key(&key_pair.public_key, &generated.mnemonic_record.words)?;

        Ok(Self {
            public_key: CryptoKey::EcdhPublic(key_pair.public_key).to_jwk(),
            private_key: Some(CryptoKey::EcdhPrivate(key_pair.private_key.clone()).to_jwk()),
            local_key: Some(CryptoKey::Aes(local_key).to_jwk()),
            mnemonic: Some(generated.mnemonic_record.clone()),
            nickname,
        })
    }

    /// Validate the key material and turn it into a persona to store.
    ///
    /// # Errors
    ///
    /// - `InvalidKey`/`UnsupportedKeyType`: a key is malformed, the private
    ///   key has no `d` or does not belong to the public key, or the local
    ///   key is not AES
    pub fn into_new_persona(self) -> Result<NewPersona, KeyDerivationError> {
        let mut persona = NewPersona::from_public_key(self.public_key)?;

        if let Some(private_key) = &self.private_key {
            let imported = CryptoKey::from_jwk(private_key, KeyAlgorithm::Ecdh)?;
            if imported.into_private_key().is_none() {
                return Err(KeyDerivationError::InvalidKey {
                    reason: "private key JWK has no d member".to_string(),
                });
            }
            if PersonaIdentifier::from_json_web_key(private_key)? != *persona.identifier() {
                return Err(KeyDerivationError::InvalidKey {
                    reason: "private key does not belong to the public key".to_string(),
                });
            }
        }
        if let Some(local_key) = &self.local_key {
            CryptoKey::from_jwk(local_key, KeyAlgorithm::Aes)?;
        }

        persona.private_key = self.private_key;
        persona.local_key = self.local_key;
        persona.mnemonic = self.mnemonic;
        persona.nickname = self.nickname;
        Ok(persona)
    }
}

/// Persona and profile identity service.
pub struct IdentityService<S: Storage, E: Environment, A: AvatarSource> {
    db: PersonaDb<S, E>,
    avatars: A,
    personas: ValueRef<Vec<Persona>>,
}

impl<S: Storage, E: Environment, A: AvatarSource> IdentityService<S, E, A> {
    /// Service over `storage`, publishing the stored personas immediately.
    ///
    /// # Errors
    ///
    /// - `Storage`: the initial persona list could not be read
    pub fn open(storage: S, env: E, avatars: A) -> Result<Self, IdentityError> {
        let db = PersonaDb::new(storage, env);
        let personas = ValueRef::new(persona_views(db.query_personas(match_all)?));
        Ok(Self { db, avatars, personas })
    }

    /// Record store the service writes through.
    pub fn db(&self) -> &PersonaDb<S, E> {
        &self.db
    }

    /// Live list of stored personas, sorted by identifier.
    pub fn personas(&self) -> ValueRef<Vec<Persona>> {
        self.personas.clone()
    }

    /// Re-read the persona list and publish it if it changed.
    ///
    /// Takes the write gate like any write, so it never publishes a list
    /// older than one already published.
    pub async fn refresh_personas(&self) -> Result<(), IdentityError> {
        self.write(|_| Ok(())).await
    }

    /// Profile view; synthesized if the profile is not stored.
    pub async fn query_profile(&self, id: &ProfileIdentifier) -> Result<Profile, IdentityError> {
        match self.db.query_profile(id)? {
            Some(record) => self.profile_view(&record).await,
            None => Ok(Profile::synthesize(id.clone(), self.db.env().wall_clock_ms())),
        }
    }

    /// Persona view; synthesized if the persona is not stored.
    pub fn query_persona(&self, id: &PersonaIdentifier) -> Result<Persona, IdentityError> {
        Ok(match self.db.query_persona(id)? {
            Some(record) => Persona::from(&record),
            None => Persona::synthesize(id.clone(), self.db.env().wall_clock_ms()),
        })
    }

    /// Views of every stored profile matching `predicate`, with avatars.
    pub async fn query_profiles_with_query(
        &self,
        predicate: impl Fn(&ProfileRecord) -> bool,
    ) -> Result<Vec<Profile>, IdentityError> {
        let records = self.db.query_profiles(predicate)?;
        let mut profiles = Vec::with_capacity(records.len());
        for record in &records {
            profiles.push(self.profile_view(record).await?);
        }
        Ok(profiles)
    }

    /// Views of every stored persona matching `predicate`.
    pub fn query_personas_with_query(
        &self,
        predicate: impl Fn(&PersonaRecord) -> bool,
    ) -> Result<Vec<Persona>, IdentityError> {
        Ok(persona_views(self.db.query_personas(predicate)?))
    }

    /// Persona a profile is linked to.
    pub fn query_persona_by_profile(
        &self,
        id: &ProfileIdentifier,
    ) -> Result<Option<Persona>, IdentityError> {
        Ok(self.db.query_persona_by_profile(id)?.as_ref().map(Persona::from))
    }

    /// Stored persona record for a persona, or for the persona a profile is
    /// linked to.
    pub fn query_persona_record(
        &self,
        id: &Identifier,
    ) -> Result<Option<PersonaRecord>, IdentityError> {
        match id {
            Identifier::Profile(profile) => self.db.query_persona_by_profile(profile),
            Identifier::Persona(persona) => self.db.query_persona(persona),
        }
    }

    /// Public key of the persona `id` resolves to.
    pub fn query_public_key(&self, id: &Identifier) -> Result<Option<PublicKey>, IdentityError> {
        let Some(record) = self.query_persona_record(id)? else {
            return Ok(None);
        };
        let key = CryptoKey::from_jwk(&record.public_key, KeyAlgorithm::Ecdh)?;
        Ok(key.into_public_key())
    }

    /// Private key of the persona `id` resolves to.
    ///
    /// A stored private key without a `d` member counts as absent.
    pub fn query_private_key(&self, id: &Identifier) -> Result<Option<PrivateKey>, IdentityError> {
        let Some(jwk) = self.query_persona_record(id)?.and_then(|record| record.private_key)
        else {
            return Ok(None);
        };
        let key = CryptoKey::from_jwk(&jwk, KeyAlgorithm::Ecdh)?;
        Ok(key.into_private_key())
    }

    /// Local key for `id`.
    ///
    /// A profile's own local key wins; otherwise it inherits its linked
    /// persona's. A persona yields its own key.
    pub fn query_local_key(&self, id: &Identifier) -> Result<Option<LocalKey>, IdentityError> {
        let jwk = match id {
            Identifier::Persona(persona) => {
                self.db.query_persona(persona)?.and_then(|record| record.local_key)
            },
            Identifier::Profile(profile) => {
                let Some(record) = self.db.query_profile(profile)? else {
                    return Ok(None);
                };
                match (record.local_key, record.linked_persona) {
                    (Some(own), _) => Some(own),
                    (None, Some(persona)) => {
                        return self.query_local_key(&Identifier::Persona(persona));
                    },
                    (None, None) => None,
                }
            },
        };

        match jwk {
            Some(jwk) => Ok(CryptoKey::from_jwk(&jwk, KeyAlgorithm::Aes)?.into_local_key()),
            None => Ok(None),
        }
    }

    /// Delete a persona after detaching every linked profile.
    ///
    /// Detaching and deleting form one scope: a refused safe delete leaves
    /// the links in place. Deleting a persona that is not stored does
    /// nothing.
    ///
    /// # Errors
    ///
    /// - `UnsafeDeleteRefused`: `SafeDelete` on a persona with a private key
    pub async fn delete_persona(
        &self,
        id: &PersonaIdentifier,
        mode: DeleteMode,
    ) -> Result<(), IdentityError> {
        let deleted = self
            .write(|txn| {
                let Some(record) = txn.query_persona(id)? else {
                    return Ok(false);
                };
                for profile in record.linked_profiles.keys() {
                    txn.detach_profile(profile)?;
                }
                match mode {
                    DeleteMode::ForceDelete => txn.delete_persona(id),
                    DeleteMode::SafeDelete => txn.safe_delete_persona(id),
                }
            })
            .await?;

        if deleted {
            info!(persona = %id, ?mode, "deleted persona");
        }
        Ok(())
    }

    /// Set a persona's nickname.
    ///
    /// # Errors
    ///
    /// - `PersonaNotFound`: the persona is not stored
    pub async fn rename_persona(
        &self,
        id: &PersonaIdentifier,
        nickname: impl Into<String>,
    ) -> Result<Persona, IdentityError> {
        let patch = PersonaPatch { nickname: Some(nickname.into()), ..PersonaPatch::default() };
        let record = self.write(|txn| txn.update_persona(id, patch, UpdateMode::Merge)).await?;

        info!(persona = %id, "renamed persona");
        Ok(Persona::from(&record))
    }

    /// Generate a new persona from fresh mnemonic words.
    ///
    /// Returns the identifier together with the words, which the caller must
    /// show to the user for backup.
    pub async fn create_persona_by_mnemonic(
        &self,
        nickname: Option<String>,
        password: &str,
    ) -> Result<(PersonaIdentifier, MnemonicRecord), IdentityError> {
        let mut entropy = Zeroizing::new([0u8; MNEMONIC_ENTROPY_SIZE]);
        self.db.env().random_bytes(entropy.as_mut_slice());

        let generated = generate_key_pair_from_mnemonic(password, *entropy)?;
        let keys = PersonaKeys::from_mnemonic_key_pair(&generated, nickname)?;
        let id = self.create_persona_by_json_web_key(keys).await?;
        Ok((id, generated.mnemonic_record))
    }

    /// Create a persona from supplied key material.
    ///
    /// # Errors
    ///
    /// - `KeyDerivation`: the key material is malformed or inconsistent
    /// - `PersonaAlreadyExists`: a persona with this public key is stored
    pub async fn create_persona_by_json_web_key(
        &self,
        keys: PersonaKeys,
    ) -> Result<PersonaIdentifier, IdentityError> {
        let persona = keys.into_new_persona()?;
        let record = self.write(|txn| txn.create_persona(persona)).await?;

        info!(persona = %record.identifier, "created persona");
        Ok(record.identifier)
    }

    /// Rebuild a persona from its recovery words.
    ///
    /// Creates the persona if it is not stored. If it is stored without a
    /// private key (known only by its public key), the private key, words
    /// and local key are filled in and the nickname is kept.
    ///
    /// # Errors
    ///
    /// - `KeyDerivation`: the words are not a valid mnemonic
    /// - `PersonaAlreadyExists`: the persona is stored with a private key
    pub async fn restore_persona_from_mnemonic(
        &self,
        words: &str,
        password: &str,
        nickname: Option<String>,
    ) -> Result<PersonaIdentifier, IdentityError> {
        let recovered = recover_key_pair_from_mnemonic(words, password)?;
        let persona = PersonaKeys::from_mnemonic_key_pair(&recovered, nickname)?.into_new_persona()?;
        let id = persona.identifier().clone();

        self.write(|txn| match txn.query_persona(&id)? {
            None => txn.create_persona(persona).map(drop),
            Some(existing) if existing.has_private_key() => {
                Err(IdentityError::PersonaAlreadyExists(id.clone()))
            },
            Some(_) => {
                let patch = PersonaPatch {
                    nickname: None,
                    private_key: persona.private_key,
                    local_key: persona.local_key,
                    mnemonic: persona.mnemonic,
                };
                txn.update_persona(&id, patch, UpdateMode::Merge).map(drop)
            },
        })
        .await?;

        info!(persona = %id, "restored persona from mnemonic");
        Ok(id)
    }

    /// Create a persona and link `profile` to it, atomically.
    ///
    /// # Errors
    ///
    /// - `KeyDerivation`: the key material is malformed or inconsistent
    /// - `PersonaAlreadyExists`: a persona with this public key is stored;
    ///   the profile is left untouched
    pub async fn create_profile_with_persona(
        &self,
        profile: &ProfileIdentifier,
        details: LinkedProfileDetails,
        keys: PersonaKeys,
    ) -> Result<PersonaIdentifier, IdentityError> {
        let persona = keys.into_new_persona()?;
        let id = self
            .write(|txn| {
                let record = txn.create_persona(persona)?;
                txn.attach_profile(profile, &record.identifier, details)?;
                Ok(record.identifier)
            })
            .await?;

        info!(%profile, persona = %id, "created persona for profile");
        Ok(id)
    }

    /// Link `profile` to `persona`, moving it off any other persona.
    ///
    /// # Errors
    ///
    /// - `PersonaNotFound`: the persona is not stored
    pub async fn attach_profile(
        &self,
        profile: &ProfileIdentifier,
        persona: &PersonaIdentifier,
        details: LinkedProfileDetails,
    ) -> Result<(), IdentityError> {
        self.write(|txn| txn.attach_profile(profile, persona, details)).await?;

        info!(%profile, %persona, "linked profile");
        Ok(())
    }

    /// Unlink `profile` from its persona. Returns false if it was not linked.
    pub async fn detach_profile(&self, profile: &ProfileIdentifier) -> Result<bool, IdentityError> {
        let detached = self.write(|txn| txn.detach_profile(profile)).await?;

        if detached {
            info!(%profile, "unlinked profile");
        }
        Ok(detached)
    }

    /// Give `profile` its own local key, creating the profile if needed.
    pub async fn set_profile_local_key(
        &self,
        profile: &ProfileIdentifier,
        local_key: &LocalKey,
    ) -> Result<(), IdentityError> {
        let patch = ProfilePatch {
            local_key: Some(CryptoKey::Aes(local_key.clone()).to_jwk()),
            ..ProfilePatch::default()
        };

        self.write(|txn| {
            if txn.query_profile(profile)?.is_some() {
                txn.update_profile(profile, patch, UpdateMode::Merge).map(drop)
            } else {
                txn.create_profile(profile.clone(), patch).map(drop)
            }
        })
        .await?;

        debug!(%profile, "set profile local key");
        Ok(())
    }

    /// Run `f` as one write scope and republish the persona list before the
    /// gate is released, so publishes happen in commit order.
    async fn write<R, F>(&self, f: F) -> Result<R, IdentityError>
    where
        F: FnOnce(&mut Transaction<'_, S>) -> Result<R, IdentityError>,
    {
        let personas = &self.personas;
        self.db.consistent_write_access_then(f, |db, _| publish_personas(db, personas)).await
    }

    async fn profile_view(&self, record: &ProfileRecord) -> Result<Profile, IdentityError> {
        let linked_persona = match &record.linked_persona {
            Some(persona) => Some(self.query_persona(persona)?),
            None => None,
        };

        let mut profile = Profile::from_record(record, linked_persona);
        match self.avatars.fetch_avatar(&record.identifier).await {
            Ok(avatar) => profile.avatar = Some(avatar),
            Err(err) => debug!(profile = %record.identifier, %err, "no avatar"),
        }
        Ok(profile)
    }
}

/// A failed read is logged and leaves the published list as it was.
fn publish_personas<S: Storage, E: Environment>(
    db: &PersonaDb<S, E>,
    personas: &ValueRef<Vec<Persona>>,
) {
    match db.query_personas(match_all) {
        Ok(records) => {
            personas.set(persona_views(records));
        },
        Err(err) => warn!(%err, "failed to refresh persona list"),
    }
}

fn persona_views(records: Vec<PersonaRecord>) -> Vec<Persona> {
    let mut views: Vec<Persona> = records.iter().map(Persona::from).collect();
    views.sort_by(|a, b| a.identifier.cmp(&b.identifier));
    views
}
