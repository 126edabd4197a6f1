//! Convert legacy "people" records into personas linked to their profiles.

use cloak_crypto::JsonWebKey;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::Migration;
use crate::{
    error::IdentityError,
    identifier::ProfileIdentifier,
    record::{LinkedProfileDetails, PersonaPatch, UpdateMode},
    service::PersonaKeys,
    storage::{Storage, Transaction},
};

/// A person record from the pre-persona data model: one profile owning its
/// keys directly.
///
/// Serializes with the field names below; absent optional keys read as
/// `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyPerson {
    /// Profile that owned the keys
    pub identifier: ProfileIdentifier,
    /// Display name
    pub nickname: Option<String>,
    /// Public key
    pub public_key: JsonWebKey,
    /// Private key, for the user's own identities
    pub private_key: Option<JsonWebKey>,
    /// AES local key
    pub local_key: Option<JsonWebKey>,
}

/// Turns each legacy person into a persona and links the profile to it.
///
/// - A persona that already exists gains any private or local key it lacks
/// - Only unlinked profiles are attached; a profile linked to a different
///   persona is left alone
/// - A private key without `d` is ignored, as is a person whose keys do not
///   import
#[derive(Debug, Clone, Default)]
pub struct PeopleToPersona {
    people: Vec<LegacyPerson>,
}

impl PeopleToPersona {
    /// Step migrating `people`.
    pub fn new(people: Vec<LegacyPerson>) -> Self {
        Self { people }
    }
}

impl<S: Storage> Migration<S> for PeopleToPersona {
    fn name(&self) -> &'static str {
        "people-to-persona"
    }

    fn apply(&self, txn: &mut Transaction<'_, S>) -> Result<usize, IdentityError> {
        let mut changed = 0;

        for person in &self.people {
            let keys = PersonaKeys {
                public_key: person.public_key.clone(),
                private_key: person.private_key.clone().filter(|jwk| jwk.d.is_some()),
                local_key: person.local_key.clone(),
                mnemonic: None,
                nickname: person.nickname.clone(),
            };
            let persona = match keys.into_new_persona() {
                Ok(persona) => persona,
                Err(err) => {
                    warn!(profile = %person.identifier, %err, "skipping legacy person");
                    continue;
                },
            };
            let id = persona.identifier().clone();
            let mut touched = false;

            match txn.query_persona(&id)? {
                None => {
                    txn.create_persona(persona)?;
                    touched = true;
                },
                Some(existing) => {
                    let patch = PersonaPatch {
                        private_key: persona.private_key.filter(|_| !existing.has_private_key()),
                        local_key: persona.local_key.filter(|_| existing.local_key.is_none()),
                        ..PersonaPatch::default()
                    };
                    if patch != PersonaPatch::default() {
                        txn.update_persona(&id, patch, UpdateMode::Merge)?;
                        touched = true;
                    }
                },
            }

            match txn.query_profile(&person.identifier)?.and_then(|p| p.linked_persona) {
                None => {
                    txn.attach_profile(&person.identifier, &id, LinkedProfileDetails::default())?;
                    touched = true;
                },
                Some(linked) if linked != id => {
                    debug!(profile = %person.identifier, %linked, "profile already linked elsewhere");
                },
                Some(_) => {},
            }

            if touched {
                changed += 1;
            }
        }

        Ok(changed)
    }
}
