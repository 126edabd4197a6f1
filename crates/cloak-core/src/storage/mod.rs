//! Storage abstraction for persona and profile records
//!
//! Trait-based abstraction for persisting the two record collections. The
//! trait is synchronous (no async); the async write gate lives one layer up
//! in [`crate::db::PersonaDb`]. Multi-record writes are staged in a
//! [`Transaction`] and reach the backend as one [`WriteBatch`].

mod chaotic;
mod error;
mod memory;
mod redb;
mod transaction;

pub use chaotic::ChaoticStorage;
pub use error::StorageError;
pub use memory::MemoryStorage;
pub use transaction::Transaction;

pub use self::redb::RedbStorage;
use crate::{
    identifier::{PersonaIdentifier, ProfileIdentifier},
    record::{PersonaRecord, ProfileRecord},
};

/// Writes staged by one transaction, applied all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    /// Profiles to insert or overwrite
    pub profiles: Vec<ProfileRecord>,
    /// Personas to insert or overwrite
    pub personas: Vec<PersonaRecord>,
    /// Personas to remove
    pub deleted_personas: Vec<PersonaIdentifier>,
}

impl WriteBatch {
    /// Returns true if committing the batch would change nothing.
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty() && self.personas.is_empty() && self.deleted_personas.is_empty()
    }
}

/// Storage for profile and persona records
///
/// Must be Clone (shared by the record store and the service), Send + Sync
/// (thread-safe), and synchronous. Implementations share internal state via
/// Arc, so clones access the same underlying storage.
pub trait Storage: Clone + Send + Sync + 'static {
    /// Load one profile. `None` if it is not stored.
    fn load_profile(&self, id: &ProfileIdentifier) -> Result<Option<ProfileRecord>, StorageError>;

    /// Load one persona. `None` if it is not stored.
    fn load_persona(&self, id: &PersonaIdentifier) -> Result<Option<PersonaRecord>, StorageError>;

    /// All stored profiles. Order is not guaranteed.
    fn list_profiles(&self) -> Result<Vec<ProfileRecord>, StorageError>;

    /// All stored personas. Order is not guaranteed.
    fn list_personas(&self) -> Result<Vec<PersonaRecord>, StorageError>;

    /// Apply every write in `batch` atomically.
    ///
    /// # Invariants
    ///
    /// - Post (Ok): every record in the batch is stored, every deleted
    ///   persona is gone
    /// - Post (Err): storage is exactly as it was before the call
    fn commit(&self, batch: WriteBatch) -> Result<(), StorageError>;
}
