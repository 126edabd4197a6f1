//! Redb-backed durable storage implementation.
//!
//! Uses Redb's ACID transactions with Copy-on-Write for crash safety. One
//! [`WriteBatch`] is one redb write transaction, so a batch is either fully
//! on disk or not at all.

use std::{path::Path, sync::Arc};

use redb::{Database, ReadableTable, TableDefinition};
use serde::{Serialize, de::DeserializeOwned};

use super::{Storage, StorageError, WriteBatch};
use crate::{
    identifier::{PersonaIdentifier, ProfileIdentifier},
    record::{PersonaRecord, ProfileRecord},
};

/// Table: profiles
/// Key: `ProfileIdentifier` canonical text
/// Value: CBOR-encoded `ProfileRecord`
const PROFILES: TableDefinition<&str, &[u8]> = TableDefinition::new("profiles");

/// Table: personas
/// Key: `PersonaIdentifier` canonical text
/// Value: CBOR-encoded `PersonaRecord`
const PERSONAS: TableDefinition<&str, &[u8]> = TableDefinition::new("personas");

/// Durable storage backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStorage {
    db: Arc<Database>,
}

impl RedbStorage {
    /// Open or create a Redb database at the given path.
    ///
    /// Creates tables if they don't exist (PROFILES, PERSONAS).
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(|e| StorageError::Io(e.to_string()))?;

        let txn = db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let _ = txn.open_table(PROFILES).map_err(|e| StorageError::Io(e.to_string()))?;
            let _ = txn.open_table(PERSONAS).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }

    fn load<T: DeserializeOwned>(
        &self,
        table: TableDefinition<'static, &'static str, &'static [u8]>,
        key: &str,
    ) -> Result<Option<T>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(table).map_err(|e| StorageError::Io(e.to_string()))?;

        match table.get(key).map_err(|e| StorageError::Io(e.to_string()))? {
            Some(value) => decode(value.value()).map(Some),
            None => Ok(None),
        }
    }

    /// Scan a table, checking every stored key against the record it holds.
    fn list<T: DeserializeOwned>(
        &self,
        table: TableDefinition<'static, &'static str, &'static [u8]>,
        key_of: impl Fn(&T) -> String,
    ) -> Result<Vec<T>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(table).map_err(|e| StorageError::Io(e.to_string()))?;

        let mut records = Vec::new();
        for result in table.iter().map_err(|e| StorageError::Io(e.to_string()))? {
            let (key, value) = result.map_err(|e| StorageError::Io(e.to_string()))?;
            let record: T = decode(value.value())?;

            if key_of(&record) != key.value() {
                return Err(StorageError::CorruptKey {
                    key: key.value().to_string(),
                    reason: "key does not match the stored record's identifier".to_string(),
                });
            }
            records.push(record);
        }

        Ok(records)
    }
}

impl Storage for RedbStorage {
    fn load_profile(&self, id: &ProfileIdentifier) -> Result<Option<ProfileRecord>, StorageError> {
        self.load(PROFILES, &id.to_string())
    }

    fn load_persona(&self, id: &PersonaIdentifier) -> Result<Option<PersonaRecord>, StorageError> {
        self.load(PERSONAS, &id.to_string())
    }

    fn list_profiles(&self) -> Result<Vec<ProfileRecord>, StorageError> {
        self.list(PROFILES, |record: &ProfileRecord| record.identifier.to_string())
    }

    fn list_personas(&self) -> Result<Vec<PersonaRecord>, StorageError> {
        self.list(PERSONAS, |record: &PersonaRecord| record.identifier.to_string())
    }

    fn commit(&self, batch: WriteBatch) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;

        {
            let mut profiles =
                txn.open_table(PROFILES).map_err(|e| StorageError::Io(e.to_string()))?;
            for profile in &batch.profiles {
                let bytes = encode(profile)?;
                profiles
                    .insert(profile.identifier.to_string().as_str(), bytes.as_slice())
                    .map_err(|e| StorageError::Io(e.to_string()))?;
            }

            let mut personas =
                txn.open_table(PERSONAS).map_err(|e| StorageError::Io(e.to_string()))?;
            for persona in &batch.personas {
                let bytes = encode(persona)?;
                personas
                    .insert(persona.identifier.to_string().as_str(), bytes.as_slice())
                    .map_err(|e| StorageError::Io(e.to_string()))?;
            }
            for id in &batch.deleted_personas {
                personas
                    .remove(id.to_string().as_str())
                    .map_err(|e| StorageError::Io(e.to_string()))?;
            }
        }

        // Dropping `txn` on an early return above aborts it
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(())
    }
}

fn encode<T: Serialize>(record: &T) -> Result<Vec<u8>, StorageError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(record, &mut bytes)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    Ok(bytes)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    ciborium::from_reader(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}
