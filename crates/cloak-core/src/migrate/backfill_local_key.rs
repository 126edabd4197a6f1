//! Derive local keys for personas that have words but no local key.

use cloak_crypto::{CryptoKey, KeyAlgorithm, derive_local_key};
use tracing::warn;

use super::Migration;
use crate::{
    error::IdentityError,
    record::{PersonaPatch, UpdateMode},
    storage::{Storage, Transaction},
};

/// Gives every persona with a mnemonic and no local key the key derived
/// from its public key and words.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackfillLocalKey;

impl<S: Storage> Migration<S> for BackfillLocalKey {
    fn name(&self) -> &'static str {
        "backfill-local-key"
    }

    fn apply(&self, txn: &mut Transaction<'_, S>) -> Result<usize, IdentityError> {
        let candidates =
            txn.query_personas(|persona| persona.mnemonic.is_some() && persona.local_key.is_none())?;
        let mut changed = 0;

        for persona in candidates {
            let Some(mnemonic) = &persona.mnemonic else {
                unreachable!("filtered on mnemonic presence");
            };

            let derived = CryptoKey::from_jwk(&persona.public_key, KeyAlgorithm::Ecdh)
                .and_then(|key| match key.into_public_key() {
                    Some(public_key) => derive_local_key(&public_key, &mnemonic.words),
                    None => unreachable!("EC import always yields a key with a public half"),
                });
            let local_key = match derived {
                Ok(local_key) => local_key,
                Err(err) => {
                    warn!(persona = %persona.identifier, %err, "cannot derive local key");
                    continue;
                },
            };

            let patch = PersonaPatch {
                local_key: Some(CryptoKey::Aes(local_key).to_jwk()),
                ..PersonaPatch::default()
            };
            txn.update_persona(&persona.identifier, patch, UpdateMode::Merge)?;
            changed += 1;
        }

        Ok(changed)
    }
}
