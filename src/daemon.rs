//! Daemon shell
//!
//! Wires the store, the trigger engine, and the reserved hot-key chords
//! together and runs until interrupted. Hot-key callbacks arrive on
//! backend threads; they are posted through a channel and handled here on
//! the daemon's own task.

use crate::config::Config;
use crate::engine::Engine;
use crate::error::Result;
use crate::hotkeys::{HostEvent, HostPoster, HotkeyDispatcher, ReservedChords};
use crate::storage::{ProfileMap, Store};
use std::sync::Arc;

pub struct Daemon {
    config: Config,
    store: Store,
    passphrase: Option<String>,
}

struct ActiveProfiles {
    current: String,
    profiles: ProfileMap,
}

impl Daemon {
    pub fn new(config: Config, store: Store, passphrase: Option<String>) -> Self {
        Self {
            config,
            store,
            passphrase,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        let (current, profiles) = self.store.load_profiles(self.passphrase.as_deref())?;
        let triggers = profiles.get(&current).cloned().unwrap_or_default();
        tracing::info!("profile {:?} active ({} triggers)", current, triggers.len());

        let engine = Engine::new(triggers, self.config.cooldown, self.config.paste_delay);
        if !engine.hooks_available() {
            tracing::warn!(
                "expansion inactive: {}",
                engine
                    .hooks_error()
                    .unwrap_or_else(|| "unknown hook failure".to_string())
            );
        }

        let (events_tx, mut events_rx) = tokio::sync::mpsc::channel(16);
        let poster: HostPoster = Arc::new(move |event| {
            if events_tx.blocking_send(event).is_err() {
                tracing::debug!("host event dropped during shutdown");
            }
        });

        let chords = match ReservedChords::from_config(&self.config) {
            Ok(chords) => chords,
            Err(err) => {
                tracing::warn!("invalid hotkey configuration ({err}); using defaults");
                ReservedChords::from_config(&Config::default())?
            }
        };
        let dispatcher = HotkeyDispatcher::new();
        if let Err(err) = dispatcher.apply(&engine, &chords, poster) {
            tracing::warn!("failed to register reserved hotkeys: {err}");
        }

        engine.start()?;
        tracing::info!(
            "keyflow running (toggle: {}, switch profile: {}, quick add: {})",
            chords.toggle,
            chords.profile_switch,
            chords.quick_add
        );

        let mut active = ActiveProfiles { current, profiles };
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("interrupt received, shutting down");
                    break;
                }
                event = events_rx.recv() => match event {
                    Some(HostEvent::CycleProfile) => {
                        if let Err(err) = self.cycle_profile(&engine, &mut active) {
                            tracing::error!("profile switch failed: {err}");
                        }
                    }
                    Some(HostEvent::Toggled(enabled)) => {
                        tracing::info!(
                            "expansion {}",
                            if enabled { "enabled" } else { "disabled" }
                        );
                    }
                    Some(HostEvent::QuickAdd) => {
                        tracing::info!("quick-add requested; no UI front-end is attached");
                    }
                    None => break,
                }
            }
        }

        dispatcher.clear(&engine);
        Ok(())
    }

    /// Swap to the next profile in name order and persist the new pointer.
    /// The engine picks up the new triggers for subsequent events; an
    /// in-flight fire completes with the set it captured.
    fn cycle_profile(&self, engine: &Engine, active: &mut ActiveProfiles) -> Result<()> {
        let Some(next) = next_profile(&active.current, &active.profiles) else {
            tracing::debug!("only one profile; nothing to switch to");
            return Ok(());
        };
        let triggers = active.profiles.get(&next).cloned().unwrap_or_default();
        engine.update_triggers(&triggers);

        let passphrase = if self.store.profiles_are_encrypted() {
            self.passphrase.as_deref()
        } else {
            None
        };
        self.store
            .save_profiles(&next, &active.profiles, passphrase)?;
        tracing::info!("switched to profile {:?} ({} triggers)", next, triggers.len());
        active.current = next;
        Ok(())
    }
}

/// Next profile in sorted name order, wrapping; `None` when there is
/// nowhere to go
fn next_profile(current: &str, profiles: &ProfileMap) -> Option<String> {
    if profiles.len() < 2 {
        return None;
    }
    let mut names: Vec<&String> = profiles.keys().collect();
    names.sort();
    let position = names.iter().position(|name| name.as_str() == current)?;
    Some(names[(position + 1) % names.len()].clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::TriggerMap;

    fn profiles(names: &[&str]) -> ProfileMap {
        names
            .iter()
            .map(|name| (name.to_string(), TriggerMap::new()))
            .collect()
    }

    #[test]
    fn test_next_profile_cycles_in_name_order() {
        let profiles = profiles(&["main", "work", "gaming"]);
        assert_eq!(next_profile("gaming", &profiles).as_deref(), Some("main"));
        assert_eq!(next_profile("main", &profiles).as_deref(), Some("work"));
        assert_eq!(next_profile("work", &profiles).as_deref(), Some("gaming"));
    }

    #[test]
    fn test_single_profile_has_no_next() {
        assert_eq!(next_profile("main", &profiles(&["main"])), None);
    }

    #[test]
    fn test_unknown_current_has_no_next() {
        assert_eq!(next_profile("ghost", &profiles(&["main", "work"])), None);
    }
}
