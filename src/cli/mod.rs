pub mod commands;
pub mod prompter;
pub mod ui;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;

use crate::cli::commands::config::ConfigCommand;
use crate::cli::commands::overrides::OverridesCommand;
use crate::cli::commands::profile::{ImportCommand, OmitCommand, ProfileCommand};
use crate::cli::commands::saves::SavesCommand;

#[derive(Parser)]
#[command(
    name = "savetitan",
    version,
    about = "Keep game saves in sync across machines through a shared cloud folder",
    long_about = "SaveTitan pulls the newest copy of a game's save folder from cloud storage, \
                  launches the game, and pushes the save back once the game exits. \
                  A checkout marker in the cloud keeps two machines from playing the same \
                  save unsynced."
)]
pub struct Cli {
    /// Sync and launch the profile with this name, then exit
    #[arg(long = "run-profile", value_name = "NAME", conflicts_with = "run_id")]
    pub run_profile: Option<String>,

    /// Sync and launch the profile with this id, then exit
    #[arg(long = "run-id", value_name = "ID")]
    pub run_id: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sync, launch, and push back on exit (by profile id or name)
    Run {
        profile: String,
    },

    /// List profiles
    List,

    /// Push the local save folder of a profile to the cloud now
    Upload {
        profile: String,
    },

    /// Manage profiles
    #[command(subcommand)]
    Profile(ProfileCommand),

    /// Manage paths excluded from sync
    #[command(subcommand)]
    Omit(OmitCommand),

    /// Set up profiles that already exist in cloud storage
    #[command(subcommand)]
    Import(ImportCommand),

    /// Manage save slots
    #[command(subcommand)]
    Saves(SavesCommand),

    /// Global settings
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Extra process names and tracking per game
    #[command(subcommand)]
    Overrides(OverridesCommand),

    /// Generate shell completions
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: Shell,
    },
}

pub fn generate_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
}
