//! Staged writes over committed storage.

use std::collections::BTreeMap;

use super::{Storage, StorageError, WriteBatch};
use crate::{
    identifier::{PersonaIdentifier, ProfileIdentifier},
    record::{PersonaRecord, ProfileRecord},
};

/// Explicit handle for one consistent write scope.
///
/// Reads see committed storage overlaid with this transaction's own staged
/// writes. Nothing reaches storage until the owning scope commits the batch;
/// dropping the handle discards every staged write.
pub struct Transaction<'s, S: Storage> {
    storage: &'s S,
    now_ms: u64,
    profiles: BTreeMap<ProfileIdentifier, ProfileRecord>,
    /// `None` stages a delete
    personas: BTreeMap<PersonaIdentifier, Option<PersonaRecord>>,
}

impl<'s, S: Storage> Transaction<'s, S> {
    pub(crate) fn new(storage: &'s S, now_ms: u64) -> Self {
        Self { storage, now_ms, profiles: BTreeMap::new(), personas: BTreeMap::new() }
    }

    /// Wall-clock time the scope started at; stamps every write in it.
    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Returns true if nothing has been staged.
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty() && self.personas.is_empty()
    }

    pub(crate) fn load_profile(
        &self,
        id: &ProfileIdentifier,
    ) -> Result<Option<ProfileRecord>, StorageError> {
        match self.profiles.get(id) {
            Some(staged) => Ok(Some(staged.clone())),
            None => self.storage.load_profile(id),
        }
    }

    pub(crate) fn load_persona(
        &self,
        id: &PersonaIdentifier,
    ) -> Result<Option<PersonaRecord>, StorageError> {
        match self.personas.get(id) {
            Some(staged) => Ok(staged.clone()),
            None => self.storage.load_persona(id),
        }
    }

    pub(crate) fn list_profiles(&self) -> Result<Vec<ProfileRecord>, StorageError> {
        let mut merged: BTreeMap<_, _> = self
            .storage
            .list_profiles()?
            .into_iter()
            .map(|record| (record.identifier.clone(), record))
            .collect();
        for (id, staged) in &self.profiles {
            merged.insert(id.clone(), staged.clone());
        }
        Ok(merged.into_values().collect())
    }

    pub(crate) fn list_personas(&self) -> Result<Vec<PersonaRecord>, StorageError> {
        let mut merged: BTreeMap<_, _> = self
            .storage
            .list_personas()?
            .into_iter()
            .map(|record| (record.identifier.clone(), record))
            .collect();
        for (id, staged) in &self.personas {
            match staged {
                Some(record) => merged.insert(id.clone(), record.clone()),
                None => merged.remove(id),
            };
        }
        Ok(merged.into_values().collect())
    }

    pub(crate) fn stage_profile(&mut self, record: ProfileRecord) {
        self.profiles.insert(record.identifier.clone(), record);
    }

    pub(crate) fn stage_persona(&mut self, record: PersonaRecord) {
        self.personas.insert(record.identifier.clone(), Some(record));
    }

    pub(crate) fn stage_persona_delete(&mut self, id: PersonaIdentifier) {
        self.personas.insert(id, None);
    }

    pub(crate) fn into_batch(self) -> WriteBatch {
        let mut batch = WriteBatch {
            profiles: self.profiles.into_values().collect(),
            ..WriteBatch::default()
        };
        for (id, staged) in self.personas {
            match staged {
                Some(record) => batch.personas.push(record),
                None => batch.deleted_personas.push(id),
            }
        }
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{
        MemoryStorage,
        test_records::{persona_record, profile_record},
    };

    #[test]
    fn reads_see_staged_writes() {
        let storage = MemoryStorage::new();
        let mut txn = Transaction::new(&storage, 5);
        let profile = profile_record("bob");

        txn.stage_profile(profile.clone());

        assert_eq!(txn.load_profile(&profile.identifier).unwrap(), Some(profile.clone()));
        assert_eq!(storage.load_profile(&profile.identifier).unwrap(), None);
        assert_eq!(txn.list_profiles().unwrap(), vec![profile]);
    }

    #[test]
    fn staged_delete_hides_committed_persona() {
        let storage = MemoryStorage::new();
        let persona = persona_record(1);
        storage.commit(WriteBatch { personas: vec![persona.clone()], ..WriteBatch::default() }).unwrap();

        let mut txn = Transaction::new(&storage, 5);
        txn.stage_persona_delete(persona.identifier.clone());

        assert_eq!(txn.load_persona(&persona.identifier).unwrap(), None);
        assert!(txn.list_personas().unwrap().is_empty());
        assert!(storage.load_persona(&persona.identifier).unwrap().is_some());
    }

    #[test]
    fn delete_then_recreate_stays_a_write() {
        let storage = MemoryStorage::new();
        let persona = persona_record(1);
        let mut txn = Transaction::new(&storage, 5);

        txn.stage_persona_delete(persona.identifier.clone());
        txn.stage_persona(persona.clone());

        let batch = txn.into_batch();
        assert_eq!(batch.personas, vec![persona]);
        assert!(batch.deleted_personas.is_empty());
    }

    #[test]
    fn dropped_transaction_writes_nothing() {
        let storage = MemoryStorage::new();
        {
            let mut txn = Transaction::new(&storage, 5);
            txn.stage_profile(profile_record("bob"));
            assert!(!txn.is_empty());
        }
        assert_eq!(storage.profile_count().unwrap(), 0);
        assert_eq!(storage.commit_count().unwrap(), 0);
    }
}
