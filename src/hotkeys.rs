//! Reserved global hot-key chords
//!
//! Three chords share one configured modifier: toggle expansion, cycle the
//! active profile, and quick-add capture. The engine handles toggle itself;
//! the other two are posted to the host through an opaque callback handle,
//! so backend threads never touch host state directly.

use crate::config::Config;
use crate::engine::Engine;
use crate::error::{HotkeyError, KeyflowError};
use crate::hooks::Chord;
use std::sync::{Arc, Mutex};

/// Modifiers accepted for the reserved chords
pub const RESERVED_MODIFIERS: [&str; 3] = ["ctrl", "shift", "alt"];

/// Events the engine posts back to its host. Handlers run on whatever
/// thread the host drains them on, never on the backend's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    /// The toggle chord fired; payload is the new enabled state
    Toggled(bool),
    /// The profile-switch chord fired
    CycleProfile,
    /// The quick-add chord fired
    QuickAdd,
}

/// Handle the host supplies for receiving [`HostEvent`]s
pub type HostPoster = Arc<dyn Fn(HostEvent) + Send + Sync>;

/// The three reserved chords, composed from the config
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservedChords {
    pub toggle: Chord,
    pub profile_switch: Chord,
    pub quick_add: Chord,
}

impl ReservedChords {
    pub fn from_config(config: &Config) -> Result<Self, HotkeyError> {
        let modifier = config.hotkey_modifier.trim().to_ascii_lowercase();
        if !RESERVED_MODIFIERS.contains(&modifier.as_str()) {
            return Err(HotkeyError::UnsupportedModifier(
                config.hotkey_modifier.clone(),
            ));
        }
        Ok(Self {
            toggle: Chord::with_modifier(&modifier, &config.toggle_hotkey_key)?,
            profile_switch: Chord::with_modifier(&modifier, &config.profile_switch_key)?,
            quick_add: Chord::with_modifier(&modifier, &config.quick_add_key)?,
        })
    }

    fn all(&self) -> [&Chord; 3] {
        [&self.toggle, &self.profile_switch, &self.quick_add]
    }
}

/// Registers the reserved chords and swaps them out when the config changes
#[derive(Default)]
pub struct HotkeyDispatcher {
    registered: Mutex<Vec<Chord>>,
}

impl HotkeyDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unregister the previous chord set and register `chords`
    pub fn apply(
        &self,
        engine: &Engine,
        chords: &ReservedChords,
        post: HostPoster,
    ) -> Result<(), KeyflowError> {
        let mut registered = self.registered.lock().unwrap();
        for chord in registered.drain(..) {
            if let Err(err) = engine.remove_hotkey(&chord) {
                tracing::warn!("failed to unregister {chord}: {err}");
            }
        }

        let toggle_engine = engine.clone();
        let toggle_post = post.clone();
        engine.add_hotkey(
            &chords.toggle,
            Arc::new(move || {
                let enabled = toggle_engine.toggle_enabled();
                toggle_post(HostEvent::Toggled(enabled));
            }),
        )?;

        let cycle_post = post.clone();
        engine.add_hotkey(
            &chords.profile_switch,
            Arc::new(move || cycle_post(HostEvent::CycleProfile)),
        )?;

        engine.add_hotkey(
            &chords.quick_add,
            Arc::new(move || post(HostEvent::QuickAdd)),
        )?;

        registered.extend(chords.all().into_iter().cloned());
        Ok(())
    }

    /// Best-effort unregistration, for shutdown
    pub fn clear(&self, engine: &Engine) {
        let mut registered = self.registered.lock().unwrap();
        for chord in registered.drain(..) {
            if let Err(err) = engine.remove_hotkey(&chord) {
                tracing::warn!("failed to unregister {chord}: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::testing::MockClipboard;
    use crate::hooks::testing::MockBackend;
    use std::collections::HashMap;

    fn engine_with(backend: &Arc<MockBackend>) -> Engine {
        Engine::with_backend(
            backend.clone(),
            Arc::new(MockClipboard::default()),
            HashMap::new(),
            0.0,
            0.0,
        )
    }

    #[test]
    fn test_chords_from_default_config() {
        let chords = ReservedChords::from_config(&Config::default()).unwrap();
        assert_eq!(chords.toggle.to_string(), "ctrl+f12");
        assert_eq!(chords.profile_switch.to_string(), "ctrl+f11");
        assert_eq!(chords.quick_add.to_string(), "ctrl+f10");
    }

    #[test]
    fn test_modifier_restricted() {
        let mut config = Config::default();
        config.hotkey_modifier = "cmd".to_string();
        assert!(matches!(
            ReservedChords::from_config(&config),
            Err(HotkeyError::UnsupportedModifier(_))
        ));
    }

    #[test]
    fn test_empty_key_rejected() {
        let mut config = Config::default();
        config.toggle_hotkey_key = "  ".to_string();
        assert!(matches!(
            ReservedChords::from_config(&config),
            Err(HotkeyError::InvalidChord(_))
        ));
    }

    #[test]
    fn test_toggle_chord_flips_engine() {
        let backend = MockBackend::new();
        let engine = engine_with(&backend);
        let chords = ReservedChords::from_config(&Config::default()).unwrap();

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let dispatcher = HotkeyDispatcher::new();
        dispatcher
            .apply(&engine, &chords, Arc::new(move |event| {
                sink.lock().unwrap().push(event);
            }))
            .unwrap();

        assert!(engine.is_enabled());
        backend.fire_hotkey("ctrl+f12");
        assert!(!engine.is_enabled());
        backend.fire_hotkey("ctrl+f12");
        assert!(engine.is_enabled());

        backend.fire_hotkey("ctrl+f11");
        backend.fire_hotkey("ctrl+f10");
        assert_eq!(
            *events.lock().unwrap(),
            vec![
                HostEvent::Toggled(false),
                HostEvent::Toggled(true),
                HostEvent::CycleProfile,
                HostEvent::QuickAdd,
            ]
        );
    }

    #[test]
    fn test_reapply_swaps_registrations() {
        let backend = MockBackend::new();
        let engine = engine_with(&backend);
        let dispatcher = HotkeyDispatcher::new();
        let post: HostPoster = Arc::new(|_| {});

        let chords = ReservedChords::from_config(&Config::default()).unwrap();
        dispatcher.apply(&engine, &chords, post.clone()).unwrap();
        assert_eq!(backend.hotkeys.lock().unwrap().len(), 3);

        let mut config = Config::default();
        config.hotkey_modifier = "alt".to_string();
        let chords = ReservedChords::from_config(&config).unwrap();
        dispatcher.apply(&engine, &chords, post).unwrap();

        let registered = backend.hotkeys.lock().unwrap();
        assert_eq!(registered.len(), 3);
        assert!(registered.contains_key("alt+f12"));
        assert!(!registered.contains_key("ctrl+f12"));
    }

    #[test]
    fn test_clear_unregisters_everything() {
        let backend = MockBackend::new();
        let engine = engine_with(&backend);
        let dispatcher = HotkeyDispatcher::new();

        let chords = ReservedChords::from_config(&Config::default()).unwrap();
        dispatcher
            .apply(&engine, &chords, Arc::new(|_| {}))
            .unwrap();
        dispatcher.clear(&engine);
        assert!(backend.hotkeys.lock().unwrap().is_empty());
    }
}
