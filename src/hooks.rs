//! Hook backend contract
//!
//! A hook backend delivers every global key down/up event to a handler and
//! synthesizes key chords and literal text into whatever application has
//! focus. The engine holds exactly one backend for its lifetime.
//!
//! Event names are normalized before they reach the engine: ASCII letters
//! lowercase, digits and punctuation as their unshifted glyph, and the named
//! specials `space`, `enter`, `tab`, `backspace`, `shift` (plus
//! `left shift` / `right shift`), `caps lock`, and `f1`..`f24`. A backend
//! may deliver an empty name for keys it cannot normalize; the engine
//! ignores those events.
//!
//! Select an implementation with `KEYFLOW_HOOK_BACKEND`:
//! - `rdev` (default): global capture/synthesis via the rdev crate
//! - `null`: no capture, no synthesis (headless and diagnostic runs)

use crate::error::{BackendError, HotkeyError};
use std::fmt;
use std::sync::Arc;

/// Direction of a key transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Down,
    Up,
}

/// A normalized global key event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    pub kind: EventKind,
    pub name: String,
}

impl KeyEvent {
    pub fn down(name: &str) -> Self {
        Self {
            kind: EventKind::Down,
            name: name.to_string(),
        }
    }

    pub fn up(name: &str) -> Self {
        Self {
            kind: EventKind::Up,
            name: name.to_string(),
        }
    }
}

/// Handler invoked for every delivered key event, on the backend's thread
pub type EventHandler = Arc<dyn Fn(KeyEvent) + Send + Sync>;

/// Callback invoked when a registered global chord fires.
///
/// Backends may invoke these on any thread, concurrently with event
/// delivery; callers must be safe under that.
pub type HotkeyCallback = Arc<dyn Fn() + Send + Sync>;

/// A key chord such as `ctrl+v` or a bare key such as `backspace`.
///
/// Modifiers and key are stored lowercased and trimmed. Formatting joins
/// the parts with `+`, which is also the accepted parse syntax.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Chord {
    modifiers: Vec<String>,
    key: String,
}

impl Chord {
    /// A chord with no modifiers
    pub fn key(name: impl Into<String>) -> Self {
        Self {
            modifiers: Vec::new(),
            key: normalize(&name.into()),
        }
    }

    /// A single-modifier chord, the shape used by the reserved hot-keys
    pub fn with_modifier(modifier: &str, key: &str) -> Result<Self, HotkeyError> {
        let modifier = normalize(modifier);
        let key = normalize(key);
        if modifier.is_empty() || key.is_empty() {
            return Err(HotkeyError::InvalidChord(format!("{modifier}+{key}")));
        }
        Ok(Self {
            modifiers: vec![modifier],
            key,
        })
    }

    /// Parse a `mod+mod+key` spec. A bare key with no `+` is accepted.
    pub fn parse(spec: &str) -> Result<Self, HotkeyError> {
        let parts: Vec<String> = spec.split('+').map(normalize).collect();
        if parts.is_empty() || parts.iter().any(String::is_empty) {
            return Err(HotkeyError::InvalidChord(spec.to_string()));
        }
        let (key, modifiers) = parts.split_last().map(|(k, m)| (k.clone(), m.to_vec()))
            .ok_or_else(|| HotkeyError::InvalidChord(spec.to_string()))?;
        Ok(Self { modifiers, key })
    }

    pub fn modifiers(&self) -> &[String] {
        &self.modifiers
    }

    pub fn key_name(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for modifier in &self.modifiers {
            write!(f, "{modifier}+")?;
        }
        write!(f, "{}", self.key)
    }
}

fn normalize(part: &str) -> String {
    part.trim().to_ascii_lowercase()
}

/// Platform-agnostic global keyboard capture and synthesis.
///
/// All operations may be called from any thread.
pub trait HookBackend: Send + Sync {
    /// Begin delivering every global key event to `handler`. Events arrive
    /// in order on a single backend-owned thread.
    fn start(&self, handler: EventHandler) -> Result<(), BackendError>;

    /// Synthesize a chord as press-press-release-release
    fn send(&self, chord: &Chord) -> Result<(), BackendError>;

    /// Synthesize literal text, character by character
    fn write(&self, text: &str) -> Result<(), BackendError>;

    /// Query global toggle-key state (e.g. `caps lock`); false when the
    /// platform cannot answer
    fn is_toggled(&self, key: &str) -> bool;

    /// Register a global chord
    fn add_hotkey(&self, chord: &Chord, callback: HotkeyCallback) -> Result<(), BackendError>;

    /// Unregister a previously registered chord
    fn remove_hotkey(&self, chord: &Chord) -> Result<(), BackendError>;
}

/// Construct the configured hook backend.
///
/// Fails with [`BackendError::Unavailable`] when the platform layer cannot
/// initialize; the engine stores the reason and runs without hooks.
pub fn create() -> Result<Arc<dyn HookBackend>, BackendError> {
    match std::env::var("KEYFLOW_HOOK_BACKEND").ok().as_deref() {
        None | Some("rdev") => Ok(Arc::new(crate::hooks_rdev::RdevBackend::new()?)),
        Some("null") => Ok(Arc::new(NullBackend)),
        Some(other) => Err(BackendError::Unavailable(format!(
            "unknown hook backend: {other}"
        ))),
    }
}

/// Backend that captures nothing and synthesizes nothing.
///
/// Useful for headless runs where only the store-facing commands matter.
pub struct NullBackend;

impl HookBackend for NullBackend {
    fn start(&self, _handler: EventHandler) -> Result<(), BackendError> {
        Ok(())
    }

    fn send(&self, _chord: &Chord) -> Result<(), BackendError> {
        Ok(())
    }

    fn write(&self, _text: &str) -> Result<(), BackendError> {
        Ok(())
    }

    fn is_toggled(&self, _key: &str) -> bool {
        false
    }

    fn add_hotkey(&self, _chord: &Chord, _callback: HotkeyCallback) -> Result<(), BackendError> {
        Ok(())
    }

    fn remove_hotkey(&self, _chord: &Chord) -> Result<(), BackendError> {
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted backend shared by the engine and hot-key dispatch tests.

    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// One synthesized operation recorded by the mock
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum SynthOp {
        Chord(String),
        Text(String),
    }

    pub(crate) struct MockBackend {
        handler: Mutex<Option<EventHandler>>,
        pub ops: Mutex<Vec<SynthOp>>,
        pub hotkeys: Mutex<HashMap<String, HotkeyCallback>>,
        pub fail_synthesis: AtomicBool,
        /// Re-deliver synthesized keys to the handler, the way a real OS
        /// hook sees the engine's own output
        pub echo: bool,
    }

    impl MockBackend {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                handler: Mutex::new(None),
                ops: Mutex::new(Vec::new()),
                hotkeys: Mutex::new(HashMap::new()),
                fail_synthesis: AtomicBool::new(false),
                echo: false,
            })
        }

        pub fn with_echo() -> Arc<Self> {
            Arc::new(Self {
                handler: Mutex::new(None),
                ops: Mutex::new(Vec::new()),
                hotkeys: Mutex::new(HashMap::new()),
                fail_synthesis: AtomicBool::new(false),
                echo: true,
            })
        }

        fn deliver(&self, event: KeyEvent) {
            let handler = self.handler.lock().unwrap().clone();
            if let Some(handler) = handler {
                handler(event);
            }
        }

        /// Deliver a key-down followed by a key-up
        pub fn press(&self, name: &str) {
            self.deliver(KeyEvent::down(name));
            self.deliver(KeyEvent::up(name));
        }

        pub fn feed(&self, events: Vec<KeyEvent>) {
            for event in events {
                self.deliver(event);
            }
        }

        pub fn sent_chords(&self) -> Vec<String> {
            self.ops
                .lock()
                .unwrap()
                .iter()
                .filter_map(|op| match op {
                    SynthOp::Chord(chord) => Some(chord.clone()),
                    SynthOp::Text(_) => None,
                })
                .collect()
        }

        pub fn written_text(&self) -> Vec<String> {
            self.ops
                .lock()
                .unwrap()
                .iter()
                .filter_map(|op| match op {
                    SynthOp::Text(text) => Some(text.clone()),
                    SynthOp::Chord(_) => None,
                })
                .collect()
        }

        pub fn fire_hotkey(&self, chord: &str) {
            let callback = self.hotkeys.lock().unwrap().get(chord).cloned();
            if let Some(callback) = callback {
                callback();
            }
        }
    }

    impl HookBackend for MockBackend {
        fn start(&self, handler: EventHandler) -> Result<(), BackendError> {
            *self.handler.lock().unwrap() = Some(handler);
            Ok(())
        }

        fn send(&self, chord: &Chord) -> Result<(), BackendError> {
            if self.fail_synthesis.load(Ordering::SeqCst) {
                return Err(BackendError::Synthesis("mock failure".into()));
            }
            self.ops
                .lock()
                .unwrap()
                .push(SynthOp::Chord(chord.to_string()));
            if self.echo {
                self.deliver(KeyEvent::down(chord.key_name()));
                self.deliver(KeyEvent::up(chord.key_name()));
            }
            Ok(())
        }

        fn write(&self, text: &str) -> Result<(), BackendError> {
            if self.fail_synthesis.load(Ordering::SeqCst) {
                return Err(BackendError::Synthesis("mock failure".into()));
            }
            self.ops
                .lock()
                .unwrap()
                .push(SynthOp::Text(text.to_string()));
            if self.echo {
                for ch in text.chars() {
                    let name = ch.to_ascii_lowercase().to_string();
                    self.deliver(KeyEvent::down(&name));
                    self.deliver(KeyEvent::up(&name));
                }
            }
            Ok(())
        }

        fn is_toggled(&self, _key: &str) -> bool {
            false
        }

        fn add_hotkey(&self, chord: &Chord, callback: HotkeyCallback) -> Result<(), BackendError> {
            self.hotkeys
                .lock()
                .unwrap()
                .insert(chord.to_string(), callback);
            Ok(())
        }

        fn remove_hotkey(&self, chord: &Chord) -> Result<(), BackendError> {
            self.hotkeys.lock().unwrap().remove(&chord.to_string());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chord_parse_and_display() {
        let chord = Chord::parse("ctrl+f12").unwrap();
        assert_eq!(chord.modifiers(), ["ctrl"]);
        assert_eq!(chord.key_name(), "f12");
        assert_eq!(chord.to_string(), "ctrl+f12");

        let chord = Chord::parse(" Ctrl + Shift + A ").unwrap();
        assert_eq!(chord.modifiers(), ["ctrl", "shift"]);
        assert_eq!(chord.key_name(), "a");
        assert_eq!(chord.to_string(), "ctrl+shift+a");
    }

    #[test]
    fn test_chord_bare_key() {
        let chord = Chord::parse("backspace").unwrap();
        assert!(chord.modifiers().is_empty());
        assert_eq!(chord.key_name(), "backspace");
        assert_eq!(chord, Chord::key("backspace"));
    }

    #[test]
    fn test_chord_rejects_empty_parts() {
        assert!(Chord::parse("").is_err());
        assert!(Chord::parse("ctrl+").is_err());
        assert!(Chord::parse("+v").is_err());
        assert!(Chord::with_modifier("", "f12").is_err());
        assert!(Chord::with_modifier("ctrl", " ").is_err());
    }

    #[test]
    fn test_unknown_backend_override() {
        // Construction goes through the factory; an unknown override is a
        // distinguished unavailability, not a panic.
        std::env::set_var("KEYFLOW_HOOK_BACKEND", "telepathy");
        let result = create();
        std::env::remove_var("KEYFLOW_HOOK_BACKEND");
        assert!(matches!(
            result,
            Err(crate::error::BackendError::Unavailable(_))
        ));
    }
}
