//! Clear private keys that are really public keys.
//!
//! An old QR-code import stored the scanned public key in the private key
//! slot. Such a "private key" has no `d` member and would make the persona
//! look recoverable when it is not.

use super::Migration;
use crate::{
    db::match_all,
    error::IdentityError,
    record::{PersonaPatch, UpdateMode},
    storage::{Storage, Transaction},
};

/// Clears every stored private key that lacks `d`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixQrPrivateKey;

impl<S: Storage> Migration<S> for FixQrPrivateKey {
    fn name(&self) -> &'static str {
        "fix-qr-private-key"
    }

    fn apply(&self, txn: &mut Transaction<'_, S>) -> Result<usize, IdentityError> {
        let broken = txn.query_personas(|persona| {
            persona.private_key.as_ref().is_some_and(|jwk| jwk.d.is_none())
        })?;

        for persona in &broken {
            // Replace keeps every other field as written here
            let patch = PersonaPatch {
                nickname: persona.nickname.clone(),
                private_key: None,
                local_key: persona.local_key.clone(),
                mnemonic: persona.mnemonic.clone(),
            };
            txn.update_persona(&persona.identifier, patch, UpdateMode::Replace)?;
        }

        debug_assert!(txn.query_personas(match_all)?.iter().all(|p| {
            p.private_key.as_ref().is_none_or(|jwk| jwk.d.is_some())
        }));
        Ok(broken.len())
    }
}

#[cfg(test)]
mod tests {
    use cloak_crypto::{CryptoKey, PrivateKey};

    use super::*;
    use crate::{
        db::PersonaDb, env::SystemEnv, migrate::run_migrations, record::NewPersona,
        storage::MemoryStorage,
    };

    fn new_persona(byte: u8) -> (NewPersona, PrivateKey) {
        let mut scalar = [0u8; 32];
        scalar[31] = byte;
        let key = PrivateKey::from_bytes(&scalar).unwrap();
        let persona =
            NewPersona::from_public_key(CryptoKey::EcdhPublic(key.public_key()).to_jwk()).unwrap();
        (persona, key)
    }

    #[tokio::test]
    async fn clears_public_key_in_private_slot() {
        let db = PersonaDb::new(MemoryStorage::new(), SystemEnv::new());
        let (mut broken, _) = new_persona(1);
        broken.private_key = Some(broken.public_key.clone());
        broken.nickname = Some("scanned".to_string());
        let (mut healthy, key) = new_persona(2);
        healthy.private_key = Some(CryptoKey::EcdhPrivate(key).to_jwk());
        let (broken_id, healthy_id) = (broken.identifier().clone(), healthy.identifier().clone());

        db.consistent_write_access(|txn| {
            txn.create_persona(broken)?;
            txn.create_persona(healthy)
        })
        .await
        .unwrap();

        let report = run_migrations(&db, &[&FixQrPrivateKey]).await.unwrap();
        assert_eq!(report.total_changed(), 1);

        let fixed = db.query_persona(&broken_id).unwrap().unwrap();
        assert!(!fixed.has_private_key());
        assert_eq!(fixed.nickname.as_deref(), Some("scanned"));
        assert!(db.query_persona(&healthy_id).unwrap().unwrap().has_private_key());

        let again = run_migrations(&db, &[&FixQrPrivateKey]).await.unwrap();
        assert_eq!(again.total_changed(), 0);
    }
}
