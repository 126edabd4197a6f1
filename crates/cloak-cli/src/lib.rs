//! Cloak command-line front end.
//!
//! Runs one [`Command`] against an [`IdentityService`] over a redb file and
//! writes plain-text results to the given writer. The binary in `main.rs`
//! only parses arguments and installs logging.
//!
//! `migrate` optionally reads legacy people from a JSON file holding an
//! array of [`LegacyPerson`] objects and feeds them to the
//! people-to-persona step.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use cloak_core::{
    DeleteMode, IdentityError, IdentityService, LinkedProfileDetails, NoAvatars,
    PersonaIdentifier, ProfileIdentifier, RedbStorage, StorageError, SystemEnv, match_all,
    migrate::{LegacyPerson, PeopleToPersona, default_steps, run_migrations},
};
use thiserror::Error;

/// Default store location, relative to the working directory
pub const DEFAULT_DB_PATH: &str = "cloak.redb";

/// CLI configuration.
#[derive(Debug, Clone)]
pub struct CliConfig {
    /// Path of the redb store
    pub db_path: PathBuf,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self { db_path: PathBuf::from(DEFAULT_DB_PATH) }
    }
}

/// One CLI operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Generate a persona from fresh mnemonic words
    CreatePersona {
        /// Optional name
        nickname: Option<String>,
        /// Password mixed into the seed
        password: String,
    },
    /// Rebuild a persona from its words
    RestorePersona {
        /// Space separated mnemonic words
        words: String,
        /// Password used at creation
        password: String,
        /// Optional name for a newly created persona
        nickname: Option<String>,
    },
    /// Print every stored persona
    ListPersonas,
    /// Print every stored profile
    ListProfiles,
    /// Set a persona's nickname
    RenamePersona {
        /// Persona to rename
        persona: PersonaIdentifier,
        /// New name
        nickname: String,
    },
    /// Delete a persona, detaching its profiles
    DeletePersona {
        /// Persona to delete
        persona: PersonaIdentifier,
        /// Delete even if it holds a private key
        force: bool,
    },
    /// Link a profile to a persona
    Link {
        /// Profile to link
        profile: ProfileIdentifier,
        /// Persona to link it to
        persona: PersonaIdentifier,
    },
    /// Unlink a profile from its persona
    Unlink {
        /// Profile to unlink
        profile: ProfileIdentifier,
    },
    /// Run the startup migrations
    Migrate {
        /// JSON file of legacy people to convert into personas
        legacy: Option<PathBuf>,
    },
}

/// CLI failures.
#[derive(Error, Debug)]
pub enum CliError {
    /// The store could not be opened
    #[error("cannot open store: {0}")]
    Open(#[from] StorageError),

    /// An identity operation failed
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// The legacy people file could not be read or parsed
    #[error("cannot load legacy people from {}: {reason}", path.display())]
    Legacy {
        /// File that failed
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// Writing output failed
    #[error("output error: {0}")]
    Output(#[from] std::io::Error),
}

/// Open the store named by `config` and run `command`, writing results to
/// `out`.
pub async fn run(
    config: &CliConfig,
    command: Command,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let storage = RedbStorage::open(&config.db_path)?;
    let service = IdentityService::open(storage, SystemEnv::new(), NoAvatars)?;
    tracing::debug!(path = %config.db_path.display(), "opened store");

    match command {
        Command::CreatePersona { nickname, password } => {
            let (persona, mnemonic) =
                service.create_persona_by_mnemonic(nickname, &password).await?;
            writeln!(out, "{persona}")?;
            writeln!(out, "recovery words: {}", mnemonic.words)?;
        },
        Command::RestorePersona { words, password, nickname } => {
            let persona =
                service.restore_persona_from_mnemonic(&words, &password, nickname).await?;
            writeln!(out, "{persona}")?;
        },
        Command::ListPersonas => {
            for persona in service.personas().get() {
                writeln!(
                    out,
                    "{}\t{}\t{}\t{} profile(s)",
                    persona.identifier,
                    persona.nickname.as_deref().unwrap_or("-"),
                    if persona.has_private_key { "private" } else { "public" },
                    persona.linked_profiles.len()
                )?;
            }
        },
        Command::ListProfiles => {
            let mut profiles = service.db().query_profiles(match_all)?;
            profiles.sort_by(|a, b| a.identifier.cmp(&b.identifier));
            for profile in profiles {
                let linked =
                    profile.linked_persona.map_or_else(|| "-".to_string(), |p| p.to_string());
                writeln!(out, "{}\t{linked}", profile.identifier)?;
            }
        },
        Command::RenamePersona { persona, nickname } => {
            let renamed = service.rename_persona(&persona, nickname).await?;
            writeln!(out, "{}\t{}", renamed.identifier, renamed.nickname.unwrap_or_default())?;
        },
        Command::DeletePersona { persona, force } => {
            let mode = if force { DeleteMode::ForceDelete } else { DeleteMode::SafeDelete };
            service.delete_persona(&persona, mode).await?;
            writeln!(out, "deleted {persona}")?;
        },
        Command::Link { profile, persona } => {
            service.attach_profile(&profile, &persona, LinkedProfileDetails::default()).await?;
            writeln!(out, "linked {profile} to {persona}")?;
        },
        Command::Unlink { profile } => {
            if service.detach_profile(&profile).await? {
                writeln!(out, "unlinked {profile}")?;
            } else {
                writeln!(out, "{profile} was not linked")?;
            }
        },
        Command::Migrate { legacy } => {
            let legacy = match legacy {
                Some(path) => PeopleToPersona::new(load_legacy_people(&path).await?),
                None => PeopleToPersona::default(),
            };
            let report = run_migrations(service.db(), &default_steps::<RedbStorage>(&legacy)).await?;
            for step in &report.steps {
                writeln!(out, "{}\t{} changed", step.name, step.changed)?;
            }
        },
    }

    Ok(())
}

async fn load_legacy_people(path: &Path) -> Result<Vec<LegacyPerson>, CliError> {
    let failed = |reason: String| CliError::Legacy { path: path.to_path_buf(), reason };

    let text = tokio::fs::read_to_string(path).await.map_err(|err| failed(err.to_string()))?;
    let people: Vec<LegacyPerson> =
        serde_json::from_str(&text).map_err(|err| failed(err.to_string()))?;

    tracing::debug!(path = %path.display(), count = people.len(), "loaded legacy people");
    Ok(people)
}
