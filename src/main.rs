//! Keyflow - system-wide text expansion daemon
//!
//! Run with `keyflow` or `keyflow daemon` to start the daemon.
//! Use `keyflow triggers` and `keyflow profile` to edit the stored data,
//! and `keyflow config` to inspect the effective configuration.

use anyhow::bail;
use clap::Parser;
use keyflow::cli::{Cli, Commands, ProfileAction, TriggerAction};
use keyflow::daemon::Daemon;
use keyflow::storage::Store;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("keyflow={},warn", log_level))),
        )
        .with_target(false)
        .init();

    let store = Store::resolve(cli.data_dir.clone(), cli.config_dir.clone())?;
    let passphrase = cli
        .passphrase
        .clone()
        .or_else(|| std::env::var("KEYFLOW_PASSPHRASE").ok());

    match cli.command.unwrap_or(Commands::Daemon) {
        Commands::Daemon => {
            let config = store.load_config()?;
            let mut daemon = Daemon::new(config, store, passphrase);
            daemon.run().await?;
        }

        Commands::Config => {
            show_config(&store)?;
        }

        Commands::Triggers { action } => {
            run_triggers(&store, passphrase.as_deref(), action)?;
        }

        Commands::Profile { action } => {
            run_profile(&store, passphrase.as_deref(), action)?;
        }
    }

    Ok(())
}

/// Show the effective configuration and where it lives
fn show_config(store: &Store) -> anyhow::Result<()> {
    let config = store.load_config()?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    println!();
    println!("Config file:   {:?}", store.config_path());
    println!("Profiles file: {:?}", store.profiles_path());
    if store.profiles_are_encrypted() {
        println!("Profiles are encrypted.");
    }
    Ok(())
}

/// The passphrase to save with, keeping the file's encryption status
fn save_passphrase<'a>(store: &Store, passphrase: Option<&'a str>) -> Option<&'a str> {
    if store.profiles_are_encrypted() {
        passphrase
    } else {
        None
    }
}

fn run_triggers(
    store: &Store,
    passphrase: Option<&str>,
    action: TriggerAction,
) -> anyhow::Result<()> {
    let (current, mut profiles) = store.load_profiles(passphrase)?;

    match action {
        TriggerAction::List => {
            let triggers = profiles.get(&current).cloned().unwrap_or_default();
            println!("Profile {:?} ({} triggers)", current, triggers.len());
            let mut entries: Vec<_> = triggers.into_iter().collect();
            entries.sort();
            for (trigger, output) in entries {
                println!("  {trigger} -> {output}");
            }
        }

        TriggerAction::Add { trigger, output } => {
            let trigger = trigger.trim().to_string();
            if trigger.is_empty() {
                bail!("trigger must not be empty");
            }
            if trigger.chars().any(char::is_whitespace) {
                bail!("trigger must not contain whitespace");
            }
            profiles
                .entry(current.clone())
                .or_default()
                .insert(trigger.clone(), output);
            store.save_profiles(&current, &profiles, save_passphrase(store, passphrase))?;
            println!("Added {:?} to profile {:?}", trigger, current);
        }

        TriggerAction::Remove { trigger } => {
            let removed = profiles
                .entry(current.clone())
                .or_default()
                .remove(&trigger);
            if removed.is_none() {
                bail!("no trigger {:?} in profile {:?}", trigger, current);
            }
            store.save_profiles(&current, &profiles, save_passphrase(store, passphrase))?;
            println!("Removed {:?} from profile {:?}", trigger, current);
        }
    }
    Ok(())
}

fn run_profile(
    store: &Store,
    passphrase: Option<&str>,
    action: ProfileAction,
) -> anyhow::Result<()> {
    let (current, mut profiles) = store.load_profiles(passphrase)?;

    match action {
        ProfileAction::List => {
            let mut names: Vec<_> = profiles.keys().cloned().collect();
            names.sort();
            for name in names {
                let marker = if name == current { "*" } else { " " };
                println!("{marker} {name} ({} triggers)", profiles[&name].len());
            }
        }

        ProfileAction::Switch { name } => {
            if !profiles.contains_key(&name) {
                bail!("no profile named {:?}", name);
            }
            store.save_profiles(&name, &profiles, save_passphrase(store, passphrase))?;
            println!("Active profile is now {:?}", name);
        }

        ProfileAction::Create { name } => {
            let name = name.trim().to_string();
            if name.is_empty() {
                bail!("profile name must not be empty");
            }
            if profiles.contains_key(&name) {
                bail!("profile {:?} already exists", name);
            }
            profiles.insert(name.clone(), Default::default());
            store.save_profiles(&current, &profiles, save_passphrase(store, passphrase))?;
            println!("Created profile {:?}", name);
        }
    }
    Ok(())
}
