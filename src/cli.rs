// Command-line interface definitions for keyflow

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "keyflow")]
#[command(version, about = "System-wide text expansion daemon")]
#[command(long_about = "
Keyflow watches your typing system-wide and replaces configured triggers
with their expansions in place, in whatever application has focus.

COMMANDS:
  keyflow                   Start the daemon
  keyflow daemon            Same as above
  keyflow config            Show the effective configuration
  keyflow triggers list     List triggers in the active profile
  keyflow triggers add      Add or replace a trigger
  keyflow profile list      List profiles
  keyflow profile switch    Change the active profile

Encrypted profiles need --passphrase or the KEYFLOW_PASSPHRASE variable.
See 'keyflow <command> --help' for more info on a command.
")]
pub struct Cli {
    /// Override the data directory (profiles)
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Override the config directory
    #[arg(long, value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    /// Passphrase for encrypted profiles (or set KEYFLOW_PASSPHRASE)
    #[arg(long, value_name = "PASSPHRASE")]
    pub passphrase: Option<String>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the expansion daemon (default)
    Daemon,

    /// Show the effective configuration and file locations
    Config,

    /// Manage triggers in the active profile
    Triggers {
        #[command(subcommand)]
        action: TriggerAction,
    },

    /// Manage profiles
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },
}

#[derive(Subcommand)]
pub enum TriggerAction {
    /// List triggers and their expansions
    List,

    /// Add a trigger (replaces an existing one with the same name)
    Add {
        /// Trigger text; no whitespace allowed
        trigger: String,
        /// Expansion inserted when the trigger fires
        output: String,
    },

    /// Remove a trigger
    Remove { trigger: String },
}

#[derive(Subcommand)]
pub enum ProfileAction {
    /// List profiles, marking the active one
    List,

    /// Make an existing profile the active one
    Switch { name: String },

    /// Create a new empty profile
    Create { name: String },
}
