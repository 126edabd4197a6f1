//! Record store: consistent write access and the operations run inside it.
//!
//! Every multi-step mutation runs inside one [`PersonaDb::consistent_write_access`]
//! scope. The scope holds the single write gate for its whole body, stages
//! writes in a [`Transaction`], and commits them as one batch. A failing step
//! discards the whole scope.
//!
//! # Invariants
//!
//! - A profile's `linked_persona == Some(P)` iff `P.linked_profiles`
//!   contains the profile; attach/detach stage both sides together
//! - Reads outside a scope see only committed state

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::{
    env::Environment,
    error::IdentityError,
    identifier::{PersonaIdentifier, ProfileIdentifier},
    record::{
        LinkedProfileDetails, NewPersona, PersonaPatch, PersonaRecord, ProfilePatch,
        ProfileRecord, UpdateMode,
    },
    storage::{Storage, Transaction},
};

/// Predicate accepting every record; the default for bulk queries.
pub fn match_all<T>(_: &T) -> bool {
    true
}

/// Record store over a [`Storage`] backend.
///
/// Clones share the backend and the write gate.
#[derive(Clone)]
pub struct PersonaDb<S: Storage, E: Environment> {
    storage: S,
    env: E,
    write_gate: Arc<Mutex<()>>,
}

impl<S: Storage, E: Environment> PersonaDb<S, E> {
    /// Record store over `storage`, stamping writes with `env`'s clock.
    pub fn new(storage: S, env: E) -> Self {
        Self { storage, env, write_gate: Arc::new(Mutex::new(())) }
    }

    /// Backend this store writes to.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Environment the store stamps writes with.
    pub fn env(&self) -> &E {
        &self.env
    }

    /// Run `f` as one atomic write scope.
    ///
    /// Waits for the write gate, runs `f` against a fresh [`Transaction`],
    /// and commits everything it staged if it returns `Ok`. On `Err` nothing
    /// is written.
    ///
    /// # Errors
    ///
    /// - Domain errors from `f`, verbatim
    /// - `TransactionAborted`: a storage read inside `f`, or the commit,
    ///   failed
    pub async fn consistent_write_access<R, F>(&self, f: F) -> Result<R, IdentityError>
    where
        F: FnOnce(&mut Transaction<'_, S>) -> Result<R, IdentityError>,
    {
        self.consistent_write_access_then(f, |_, _| {}).await
    }

    /// [`Self::consistent_write_access`] followed by `after_commit`, which
    /// runs only if the scope succeeded and before the write gate is
    /// released.
    ///
    /// Anything `after_commit` reads reflects this scope and every scope
    /// before it, and no later one.
    pub async fn consistent_write_access_then<R, F, G>(
        &self,
        f: F,
        after_commit: G,
    ) -> Result<R, IdentityError>
    where
        F: FnOnce(&mut Transaction<'_, S>) -> Result<R, IdentityError>,
        G: FnOnce(&Self, &R),
    {
        let _gate = self.write_gate.lock().await;

        let mut txn = Transaction::new(&self.storage, self.env.wall_clock_ms());
        let value = f(&mut txn).map_err(IdentityError::into_aborted)?;

        if !txn.is_empty() {
            self.storage.commit(txn.into_batch()).map_err(IdentityError::TransactionAborted)?;
        }

        after_commit(self, &value);
        Ok(value)
    }

    fn read_scope(&self) -> Transaction<'_, S> {
        Transaction::new(&self.storage, self.env.wall_clock_ms())
    }

    /// Committed profile record.
    pub fn query_profile(
        &self,
        id: &ProfileIdentifier,
    ) -> Result<Option<ProfileRecord>, IdentityError> {
        self.read_scope().query_profile(id)
    }

    /// Committed persona record.
    pub fn query_persona(
        &self,
        id: &PersonaIdentifier,
    ) -> Result<Option<PersonaRecord>, IdentityError> {
        self.read_scope().query_persona(id)
    }

    /// Persona the profile is linked to.
    pub fn query_persona_by_profile(
        &self,
        id: &ProfileIdentifier,
    ) -> Result<Option<PersonaRecord>, IdentityError> {
        self.read_scope().query_persona_by_profile(id)
    }

    /// Committed profiles matching `predicate`.
    pub fn query_profiles(
        &self,
        predicate: impl Fn(&ProfileRecord) -> bool,
    ) -> Result<Vec<ProfileRecord>, IdentityError> {
        self.read_scope().query_profiles(predicate)
    }

    /// Committed personas matching `predicate`.
    pub fn query_personas(
        &self,
        predicate: impl Fn(&PersonaRecord) -> bool,
    ) -> Result<Vec<PersonaRecord>, IdentityError> {
        self.read_scope().query_personas(predicate)
    }
}

impl<S: Storage> Transaction<'_, S> {
    /// Profile record as seen by this scope.
    pub fn query_profile(
        &self,
        id: &ProfileIdentifier,
    ) -> Result<Option<ProfileRecord>, IdentityError> {
        Ok(self.load_profile(id)?)
    }

    /// Persona record as seen by this scope.
    pub fn query_persona(
        &self,
        id: &PersonaIdentifier,
    ) -> Result<Option<PersonaRecord>, IdentityError> {
        Ok(self.load_persona(id)?)
    }

    /// Persona `id` is linked to, if the profile exists and is linked.
    pub fn query_persona_by_profile(
        &self,
        id: &ProfileIdentifier,
    ) -> Result<Option<PersonaRecord>, IdentityError> {
        match self.load_profile(id)?.and_then(|profile| profile.linked_persona) {
            Some(persona) => self.query_persona(&persona),
            None => Ok(None),
        }
    }

    /// Profiles matching `predicate`.
    pub fn query_profiles(
        &self,
        predicate: impl Fn(&ProfileRecord) -> bool,
    ) -> Result<Vec<ProfileRecord>, IdentityError> {
        Ok(self.list_profiles()?.into_iter().filter(|record| predicate(record)).collect())
    }

    /// Personas matching `predicate`.
    pub fn query_personas(
        &self,
        predicate: impl Fn(&PersonaRecord) -> bool,
    ) -> Result<Vec<PersonaRecord>, IdentityError> {
        Ok(self.list_personas()?.into_iter().filter(|record| predicate(record)).collect())
    }

    /// Store a new, unlinked profile.
    ///
    /// # Errors
    ///
    /// - `ProfileAlreadyExists`: a profile with `id` is stored
    pub fn create_profile(
        &mut self,
        id: ProfileIdentifier,
        patch: ProfilePatch,
    ) -> Result<ProfileRecord, IdentityError> {
        if self.load_profile(&id)?.is_some() {
            return Err(IdentityError::ProfileAlreadyExists(id));
        }

        let mut record = ProfileRecord::new(id, self.now_ms());
        record.apply_patch(patch, UpdateMode::Replace, self.now_ms());
        self.stage_profile(record.clone());
        Ok(record)
    }

    /// Change a stored profile's mutable fields.
    ///
    /// # Errors
    ///
    /// - `ProfileNotFound`: no profile with `id` is stored
    pub fn update_profile(
        &mut self,
        id: &ProfileIdentifier,
        patch: ProfilePatch,
        mode: UpdateMode,
    ) -> Result<ProfileRecord, IdentityError> {
        let mut record =
            self.load_profile(id)?.ok_or_else(|| IdentityError::ProfileNotFound(id.clone()))?;

        record.apply_patch(patch, mode, self.now_ms());
        self.stage_profile(record.clone());
        Ok(record)
    }

    /// Store a new persona with no linked profiles.
    ///
    /// # Errors
    ///
    /// - `PersonaAlreadyExists`: a persona with the same public key is stored
    pub fn create_persona(&mut self, persona: NewPersona) -> Result<PersonaRecord, IdentityError> {
        if self.load_persona(persona.identifier())?.is_some() {
            return Err(IdentityError::PersonaAlreadyExists(persona.identifier().clone()));
        }

        let record = persona.into_record(self.now_ms());
        self.stage_persona(record.clone());
        Ok(record)
    }

    /// Change a stored persona's mutable fields. Links are untouched.
    ///
    /// # Errors
    ///
    /// - `PersonaNotFound`: no persona with `id` is stored
    pub fn update_persona(
        &mut self,
        id: &PersonaIdentifier,
        patch: PersonaPatch,
        mode: UpdateMode,
    ) -> Result<PersonaRecord, IdentityError> {
        let mut record =
            self.load_persona(id)?.ok_or_else(|| IdentityError::PersonaNotFound(id.clone()))?;

        record.apply_patch(patch, mode, self.now_ms());
        self.stage_persona(record.clone());
        Ok(record)
    }

    /// Link `profile` to `persona`, updating both sides.
    ///
    /// Creates the profile if it is not stored and moves it off any other
    /// persona first. Attaching to the persona it is already linked to only
    /// replaces the link details.
    ///
    /// # Errors
    ///
    /// - `PersonaNotFound`: `persona` is not stored
    pub fn attach_profile(
        &mut self,
        profile: &ProfileIdentifier,
        persona: &PersonaIdentifier,
        details: LinkedProfileDetails,
    ) -> Result<(), IdentityError> {
        let mut target = self
            .load_persona(persona)?
            .ok_or_else(|| IdentityError::PersonaNotFound(persona.clone()))?;

        let now_ms = self.now_ms();
        let mut record = match self.load_profile(profile)? {
            Some(record) => record,
            None => ProfileRecord::new(profile.clone(), now_ms),
        };

        if let Some(previous) = record.linked_persona.as_ref().filter(|p| *p != persona) {
            debug!(%profile, %previous, "moving profile to another persona");
            self.unlink_from_persona(profile, previous)?;
        }

        record.linked_persona = Some(persona.clone());
        record.updated_at_ms = now_ms;
        target.linked_profiles.insert(profile.clone(), details);
        target.updated_at_ms = now_ms;

        self.stage_profile(record);
        self.stage_persona(target);
        Ok(())
    }

    /// Unlink `profile` from its persona, updating both sides.
    ///
    /// Returns false (and stages nothing) if the profile is not stored or
    /// not linked.
    pub fn detach_profile(&mut self, profile: &ProfileIdentifier) -> Result<bool, IdentityError> {
        let Some(mut record) = self.load_profile(profile)? else {
            return Ok(false);
        };
        let Some(persona) = record.linked_persona.take() else {
            return Ok(false);
        };

        self.unlink_from_persona(profile, &persona)?;
        record.updated_at_ms = self.now_ms();
        self.stage_profile(record);
        Ok(true)
    }

    fn unlink_from_persona(
        &mut self,
        profile: &ProfileIdentifier,
        persona: &PersonaIdentifier,
    ) -> Result<(), IdentityError> {
        if let Some(mut record) = self.load_persona(persona)?
            && record.linked_profiles.remove(profile).is_some()
        {
            record.updated_at_ms = self.now_ms();
            self.stage_persona(record);
        }
        Ok(())
    }

    /// Delete a persona unconditionally (hard delete).
    ///
    /// Returns false if it was not stored.
    ///
    /// # Errors
    ///
    /// - `PersonaStillLinked`: profiles are still linked; detach them first
    pub fn delete_persona(&mut self, id: &PersonaIdentifier) -> Result<bool, IdentityError> {
        let Some(record) = self.load_persona(id)? else {
            return Ok(false);
        };
        if !record.linked_profiles.is_empty() {
            return Err(IdentityError::PersonaStillLinked {
                persona: id.clone(),
                linked: record.linked_profiles.len(),
            });
        }

        self.stage_persona_delete(id.clone());
        Ok(true)
    }

    /// Delete a persona only if it holds no private key.
    ///
    /// Returns false if it was not stored.
    ///
    /// # Errors
    ///
    /// - `UnsafeDeleteRefused`: the persona holds a private key
    /// - `PersonaStillLinked`: profiles are still linked
    pub fn safe_delete_persona(&mut self, id: &PersonaIdentifier) -> Result<bool, IdentityError> {
        match self.load_persona(id)? {
            None => Ok(false),
            Some(record) if record.has_private_key() => {
                Err(IdentityError::UnsafeDeleteRefused { persona: id.clone() })
            },
            Some(_) => self.delete_persona(id),
        }
    }
}
