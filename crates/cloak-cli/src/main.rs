//! Cloak persona manager.
//!
//! # Usage
//!
//! ```bash
//! # Create a persona and note the recovery words
//! cloak create-persona --nickname work --password hunter2
//!
//! # Link a profile to it
//! cloak link person:twitter.com/alice 'ec_key:secp256k1/A3l...'
//!
//! # Convert legacy people exported as JSON
//! cloak migrate --legacy people.json
//!
//! # Use a different store, with verbose logs
//! RUST_LOG=debug cloak --db ~/.cloak.redb list-personas
//! ```

use std::{io::Write, path::PathBuf};

use clap::{Parser, Subcommand};
use cloak_cli::{CliConfig, Command, DEFAULT_DB_PATH, run};
use cloak_core::{PersonaIdentifier, ProfileIdentifier};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Cloak persona manager
#[derive(Parser, Debug)]
#[command(name = "cloak")]
#[command(about = "Manage Cloak personas, profiles and their keys")]
#[command(version)]
struct Args {
    /// Path of the redb store
    #[arg(long, default_value = DEFAULT_DB_PATH)]
    db: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Generate a persona from fresh mnemonic words
    CreatePersona {
        /// Persona name
        #[arg(long)]
        nickname: Option<String>,
        /// Password mixed into the seed
        #[arg(long, default_value = "")]
        password: String,
    },
    /// Rebuild a persona from its recovery words
    RestorePersona {
        /// Recovery words, quoted
        #[arg(long)]
        words: String,
        /// Password used at creation
        #[arg(long, default_value = "")]
        password: String,
        /// Name for a newly created persona
        #[arg(long)]
        nickname: Option<String>,
    },
    /// List stored personas
    ListPersonas,
    /// List stored profiles
    ListProfiles,
    /// Rename a persona
    RenamePersona {
        /// Persona identifier
        persona: PersonaIdentifier,
        /// New name
        nickname: String,
    },
    /// Delete a persona
    DeletePersona {
        /// Persona identifier
        persona: PersonaIdentifier,
        /// Delete even if it holds a private key
        #[arg(long)]
        force: bool,
    },
    /// Link a profile to a persona
    Link {
        /// Profile identifier
        profile: ProfileIdentifier,
        /// Persona identifier
        persona: PersonaIdentifier,
    },
    /// Unlink a profile from its persona
    Unlink {
        /// Profile identifier
        profile: ProfileIdentifier,
    },
    /// Run legacy migrations
    Migrate {
        /// JSON array of legacy people to convert into personas
        #[arg(long)]
        legacy: Option<PathBuf>,
    },
}

impl From<Cmd> for Command {
    fn from(cmd: Cmd) -> Self {
        match cmd {
            Cmd::CreatePersona { nickname, password } => Self::CreatePersona { nickname, password },
            Cmd::RestorePersona { words, password, nickname } => {
                Self::RestorePersona { words, password, nickname }
            },
            Cmd::ListPersonas => Self::ListPersonas,
            Cmd::ListProfiles => Self::ListProfiles,
            Cmd::RenamePersona { persona, nickname } => Self::RenamePersona { persona, nickname },
            Cmd::DeletePersona { persona, force } => Self::DeletePersona { persona, force },
            Cmd::Link { profile, persona } => Self::Link { profile, persona },
            Cmd::Unlink { profile } => Self::Unlink { profile },
            Cmd::Migrate { legacy } => Self::Migrate { legacy },
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = CliConfig { db_path: args.db };

    let mut output = Vec::new();
    run(&config, args.command.into(), &mut output).await?;
    std::io::stdout().write_all(&output)?;

    Ok(())
}
