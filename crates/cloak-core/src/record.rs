//! Stored record shapes.
//!
//! Records are what the storage backends persist. They carry key material
//! as JWKs and persona links as identifiers, never as resolved objects.
//!
//! # Invariants
//!
//! - A profile's `linked_persona == Some(P)` iff `P.linked_profiles`
//!   contains that profile
//! - Links change only through attach/detach; patches cannot touch them

use std::collections::BTreeMap;

use cloak_crypto::{JsonWebKey, KeyDerivationError, MnemonicRecord};
use serde::{Deserialize, Serialize};

use crate::identifier::{PersonaIdentifier, ProfileIdentifier};

/// Whether the owner confirmed a profile ↔ persona link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConnectionConfirmState {
    /// Link confirmed by the owner
    #[default]
    Confirmed,
    /// Link proposed, awaiting confirmation
    Pending,
    /// Owner rejected the link
    Denied,
}

/// Metadata stored with each link on the persona side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct LinkedProfileDetails {
    /// Confirmation state of the link
    pub connection_confirm_state: ConnectionConfirmState,
}

/// Profiles linked to a persona. Keys are unique; order is not meaningful.
pub type LinkedProfiles = BTreeMap<ProfileIdentifier, LinkedProfileDetails>;

/// Stored profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRecord {
    /// Identifier (primary key)
    pub identifier: ProfileIdentifier,
    /// Display name on the network
    pub nickname: Option<String>,
    /// Persona this profile is linked to
    pub linked_persona: Option<PersonaIdentifier>,
    /// Profile-specific local key overriding the persona's
    pub local_key: Option<JsonWebKey>,
    /// Creation time (Unix millis)
    pub created_at_ms: u64,
    /// Last modification time (Unix millis)
    pub updated_at_ms: u64,
}

impl ProfileRecord {
    /// Fresh, unlinked profile.
    pub fn new(identifier: ProfileIdentifier, now_ms: u64) -> Self {
        Self {
            identifier,
            nickname: None,
            linked_persona: None,
            local_key: None,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        }
    }

    pub(crate) fn apply_patch(&mut self, patch: ProfilePatch, mode: UpdateMode, now_ms: u64) {
        match mode {
            UpdateMode::Merge => {
                if patch.nickname.is_some() {
                    self.nickname = patch.nickname;
                }
                if patch.local_key.is_some() {
                    self.local_key = patch.local_key;
                }
            },
            UpdateMode::Replace => {
                self.nickname = patch.nickname;
                self.local_key = patch.local_key;
            },
        }
        self.updated_at_ms = now_ms;
    }
}

/// Stored persona.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaRecord {
    /// Identifier (primary key), derived from `public_key`
    pub identifier: PersonaIdentifier,
    /// User-chosen name
    pub nickname: Option<String>,
    /// Public half of the key pair
    pub public_key: JsonWebKey,
    /// Private half, absent for personas known only by their public key
    pub private_key: Option<JsonWebKey>,
    /// Symmetric key for persona-scoped data
    pub local_key: Option<JsonWebKey>,
    /// Words for rebuilding the key pair
    pub mnemonic: Option<MnemonicRecord>,
    /// Profiles linked to this persona
    pub linked_profiles: LinkedProfiles,
    /// Creation time (Unix millis)
    pub created_at_ms: u64,
    /// Last modification time (Unix millis)
    pub updated_at_ms: u64,
}

impl PersonaRecord {
    /// Returns true if the record holds private key material.
    ///
    /// A stored private key without a `d` member does not count.
    pub fn has_private_key(&self) -> bool {
        self.private_key.as_ref().is_some_and(|jwk| jwk.d.is_some())
    }

    pub(crate) fn apply_patch(&mut self, patch: PersonaPatch, mode: UpdateMode, now_ms: u64) {
        match mode {
            UpdateMode::Merge => {
                if patch.nickname.is_some() {
                    self.nickname = patch.nickname;
                }
                if patch.private_key.is_some() {
                    self.private_key = patch.private_key;
                }
                if patch.local_key.is_some() {
                    self.local_key = patch.local_key;
                }
                if patch.mnemonic.is_some() {
                    self.mnemonic = patch.mnemonic;
                }
            },
            UpdateMode::Replace => {
                self.nickname = patch.nickname;
                self.private_key = patch.private_key;
                self.local_key = patch.local_key;
                self.mnemonic = patch.mnemonic;
            },
        }
        self.updated_at_ms = now_ms;
    }
}

/// Input for creating a persona. Links start empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPersona {
    identifier: PersonaIdentifier,
    /// Public half of the key pair
    pub public_key: JsonWebKey,
    /// User-chosen name
    pub nickname: Option<String>,
    /// Private half
    pub private_key: Option<JsonWebKey>,
    /// Symmetric key for persona-scoped data
    pub local_key: Option<JsonWebKey>,
    /// Words for rebuilding the key pair
    pub mnemonic: Option<MnemonicRecord>,
}

impl NewPersona {
    /// Start a persona from its public key; the identifier is derived here.
    ///
    /// # Errors
    ///
    /// Any `KeyDerivationError` from importing `public_key`.
    pub fn from_public_key(public_key: JsonWebKey) -> Result<Self, KeyDerivationError> {
        let identifier = PersonaIdentifier::from_json_web_key(&public_key)?;
        Ok(Self {
            identifier,
            public_key: public_key.to_public(),
            nickname: None,
            private_key: None,
            local_key: None,
            mnemonic: None,
        })
    }

    /// Identifier the persona will be stored under.
    pub fn identifier(&self) -> &PersonaIdentifier {
        &self.identifier
    }

    pub(crate) fn into_record(self, now_ms: u64) -> PersonaRecord {
        PersonaRecord {
            identifier: self.identifier,
            nickname: self.nickname,
            public_key: self.public_key,
            private_key: self.private_key,
            local_key: self.local_key,
            mnemonic: self.mnemonic,
            linked_profiles: LinkedProfiles::new(),
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        }
    }
}

/// How an update combines with the stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Fields set in the patch overwrite; unset fields are kept
    Merge,
    /// Mutable fields become exactly the patch; unset fields are cleared
    Replace,
}

/// Mutable profile fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfilePatch {
    /// Display name
    pub nickname: Option<String>,
    /// Profile-specific local key
    pub local_key: Option<JsonWebKey>,
}

/// Mutable persona fields. The public key and identifier never change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersonaPatch {
    /// User-chosen name
    pub nickname: Option<String>,
    /// Private half of the key pair
    pub private_key: Option<JsonWebKey>,
    /// Symmetric key for persona-scoped data
    pub local_key: Option<JsonWebKey>,
    /// Words for rebuilding the key pair
    pub mnemonic: Option<MnemonicRecord>,
}
