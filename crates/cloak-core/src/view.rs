//! External views handed to callers.
//!
//! Views never carry key material. A view for an identifier that is not
//! stored is synthesized rather than reported as an error.

use bytes::Bytes;

use crate::{
    identifier::{PersonaIdentifier, ProfileIdentifier},
    record::{LinkedProfiles, PersonaRecord, ProfileRecord},
};

/// A persona as callers see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona {
    /// Identifier
    pub identifier: PersonaIdentifier,
    /// User-chosen name
    pub nickname: Option<String>,
    /// Linked profiles with their link metadata
    pub linked_profiles: LinkedProfiles,
    /// Whether private key material is stored
    pub has_private_key: bool,
    /// Whether recovery words are stored
    pub has_mnemonic: bool,
    /// Compressed public key text
    pub fingerprint: String,
    /// Creation time (Unix millis)
    pub created_at_ms: u64,
    /// Last modification time (Unix millis)
    pub updated_at_ms: u64,
}

impl Persona {
    /// Empty view for a persona that is not stored.
    pub fn synthesize(identifier: PersonaIdentifier, now_ms: u64) -> Self {
        Self {
            fingerprint: identifier.fingerprint().to_string(),
            identifier,
            nickname: None,
            linked_profiles: LinkedProfiles::new(),
            has_private_key: false,
            has_mnemonic: false,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        }
    }
}

impl From<&PersonaRecord> for Persona {
    fn from(record: &PersonaRecord) -> Self {
        Self {
            identifier: record.identifier.clone(),
            nickname: record.nickname.clone(),
            linked_profiles: record.linked_profiles.clone(),
            has_private_key: record.has_private_key(),
            has_mnemonic: record.mnemonic.is_some(),
            fingerprint: record.identifier.fingerprint().to_string(),
            created_at_ms: record.created_at_ms,
            updated_at_ms: record.updated_at_ms,
        }
    }
}

/// A social-network profile as callers see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    /// Identifier
    pub identifier: ProfileIdentifier,
    /// Display name on the network
    pub nickname: Option<String>,
    /// Persona the profile is linked to, resolved
    pub linked_persona: Option<Persona>,
    /// Avatar image, when the avatar source had one
    pub avatar: Option<Bytes>,
    /// Creation time (Unix millis)
    pub created_at_ms: u64,
    /// Last modification time (Unix millis)
    pub updated_at_ms: u64,
}

impl Profile {
    /// Empty view for a profile that is not stored.
    pub fn synthesize(identifier: ProfileIdentifier, now_ms: u64) -> Self {
        Self {
            identifier,
            nickname: None,
            linked_persona: None,
            avatar: None,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        }
    }

    pub(crate) fn from_record(record: &ProfileRecord, linked_persona: Option<Persona>) -> Self {
        Self {
            identifier: record.identifier.clone(),
            nickname: record.nickname.clone(),
            linked_persona,
            avatar: None,
            created_at_ms: record.created_at_ms,
            updated_at_ms: record.updated_at_ms,
        }
    }
}
