//! Cloak persona identity layer.
//!
//! Binds cryptographic personas to social-network profiles and keeps the
//! two sides of every link consistent.
//!
//! # Architecture
//!
//! ```text
//! IdentityService ──► PersonaDb::consistent_write_access ──► Transaction
//!        │                        (write gate)                   │
//!        │                                                       ▼
//!        ├──► cloak_crypto (keys, mnemonic, local key)     Storage::commit
//!        ├──► AvatarSource (best-effort)                 (Memory | Redb | Chaotic)
//!        └──► ValueRef<Vec<Persona>> (live persona list)
//! ```
//!
//! # Components
//!
//! - [`IdentityService`]: public API; one write scope per logical operation
//! - [`PersonaDb`]: record store with the single write gate
//! - [`Transaction`]: staged writes; reads see them, drop discards them
//! - [`Storage`]: synchronous backend trait ([`MemoryStorage`],
//!   [`RedbStorage`], [`ChaoticStorage`])
//! - [`migrate`]: idempotent legacy record migrations
//! - [`ValueRef`]: publish/subscribe cell
//! - [`Environment`]: wall clock and randomness, injected for tests

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod avatar;
mod db;
mod env;
mod error;
mod identifier;
pub mod migrate;
mod record;
mod service;
pub mod storage;
mod value_ref;
mod view;

pub use avatar::{AvatarError, AvatarSource, NoAvatars};
pub use db::{PersonaDb, match_all};
pub use env::{Environment, SystemEnv};
pub use error::{IdentifierError, IdentityError};
pub use identifier::{Identifier, PersonaIdentifier, ProfileIdentifier, SECP256K1_CURVE};
pub use record::{
    ConnectionConfirmState, LinkedProfileDetails, LinkedProfiles, NewPersona, PersonaPatch,
    PersonaRecord, ProfilePatch, ProfileRecord, UpdateMode,
};
pub use service::{DeleteMode, IdentityService, PersonaKeys};
pub use storage::{ChaoticStorage, MemoryStorage, RedbStorage, Storage, StorageError, Transaction};
pub use value_ref::{Subscription, ValueRef};
pub use view::{Persona, Profile};
