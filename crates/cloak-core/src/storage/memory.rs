#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use super::{Storage, StorageError, WriteBatch};
use crate::{
    identifier::{PersonaIdentifier, ProfileIdentifier},
    record::{PersonaRecord, ProfileRecord},
};

/// In-memory storage implementation for testing and simulation
///
/// Uses `HashMap` for both collections. All state is wrapped in
/// Arc<Mutex<>> to allow Clone and concurrent access. A commit holds the lock
/// for the whole batch, so readers never observe half of it. A poisoned
/// mutex is reported as `StorageError::Io`.
#[derive(Clone)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryStorageInner>>,
}

#[derive(Default)]
struct MemoryStorageInner {
    profiles: HashMap<ProfileIdentifier, ProfileRecord>,
    personas: HashMap<PersonaIdentifier, PersonaRecord>,
    /// Successful commits, for tests asserting that a scope wrote nothing
    commits: usize,
}

impl MemoryStorage {
    /// Create a new empty `MemoryStorage`
    pub fn new() -> Self {
        Self { inner: Arc::new(Mutex::new(MemoryStorageInner::default())) }
    }

    /// Number of stored profiles.
    pub fn profile_count(&self) -> Result<usize, StorageError> {
        Ok(self.lock()?.profiles.len())
    }

    /// Number of stored personas.
    pub fn persona_count(&self) -> Result<usize, StorageError> {
        Ok(self.lock()?.personas.len())
    }

    /// Number of batches committed so far.
    pub fn commit_count(&self) -> Result<usize, StorageError> {
        Ok(self.lock()?.commits)
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryStorageInner>, StorageError> {
        self.inner.lock().map_err(|_| StorageError::Io("memory storage mutex poisoned".to_string()))
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    fn load_profile(&self, id: &ProfileIdentifier) -> Result<Option<ProfileRecord>, StorageError> {
        Ok(self.lock()?.profiles.get(id).cloned())
    }

    fn load_persona(&self, id: &PersonaIdentifier) -> Result<Option<PersonaRecord>, StorageError> {
        Ok(self.lock()?.personas.get(id).cloned())
    }

    fn list_profiles(&self) -> Result<Vec<ProfileRecord>, StorageError> {
        Ok(self.lock()?.profiles.values().cloned().collect())
    }

    fn list_personas(&self) -> Result<Vec<PersonaRecord>, StorageError> {
        Ok(self.lock()?.personas.values().cloned().collect())
    }

    fn commit(&self, batch: WriteBatch) -> Result<(), StorageError> {
        let mut inner = self.lock()?;

        for profile in batch.profiles {
            inner.profiles.insert(profile.identifier.clone(), profile);
        }
        for persona in batch.personas {
            inner.personas.insert(persona.identifier.clone(), persona);
        }
        for id in &batch.deleted_personas {
            inner.personas.remove(id);
        }
        inner.commits += 1;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_records::{persona_record, profile_record};

    #[test]
    fn empty_storage_loads_nothing() {
        let storage = MemoryStorage::new();
        let profile = profile_record("bob");
        assert_eq!(storage.load_profile(&profile.identifier).unwrap(), None);
        assert!(storage.list_personas().unwrap().is_empty());
        assert_eq!(storage.commit_count().unwrap(), 0);
    }

    #[test]
    fn commit_stores_all_records() {
        let storage = MemoryStorage::new();
        let profile = profile_record("bob");
        let persona = persona_record(1);

        storage
            .commit(WriteBatch {
                profiles: vec![profile.clone()],
                personas: vec![persona.clone()],
                deleted_personas: Vec::new(),
            })
            .unwrap();

        assert_eq!(storage.load_profile(&profile.identifier).unwrap(), Some(profile));
        assert_eq!(storage.load_persona(&persona.identifier).unwrap(), Some(persona));
        assert_eq!(storage.commit_count().unwrap(), 1);
    }

    #[test]
    fn commit_applies_deletes() {
        let storage = MemoryStorage::new();
        let persona = persona_record(1);
        storage
            .commit(WriteBatch { personas: vec![persona.clone()], ..WriteBatch::default() })
            .unwrap();

        storage
            .commit(WriteBatch {
                deleted_personas: vec![persona.identifier.clone()],
                ..WriteBatch::default()
            })
            .unwrap();

        assert_eq!(storage.load_persona(&persona.identifier).unwrap(), None);
        assert_eq!(storage.persona_count().unwrap(), 0);
    }

    #[test]
    fn clones_share_state() {
        let storage = MemoryStorage::new();
        let clone = storage.clone();
        clone
            .commit(WriteBatch { profiles: vec![profile_record("bob")], ..WriteBatch::default() })
            .unwrap();
        assert_eq!(storage.profile_count().unwrap(), 1);
    }
}
