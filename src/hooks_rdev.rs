//! rdev-backed hook implementation
//!
//! Captures global key events with `rdev::listen` on a dedicated thread and
//! synthesizes keys with `rdev::simulate`. Registered hot-key chords are
//! matched inside the listener against the currently-held modifier set, so
//! chord callbacks fire on the listener thread.
//!
//! On Linux this requires a running display server; on macOS it requires
//! Accessibility permission for the hosting terminal or app bundle.

use crate::error::BackendError;
use crate::hooks::{Chord, EventHandler, EventKind, HookBackend, HotkeyCallback, KeyEvent};
use rdev::{listen, simulate, Event, EventType, Key};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Settling delay between synthesized transitions; some toolkits drop
/// events injected back-to-back
const SIMULATE_DELAY: Duration = Duration::from_millis(2);

pub struct RdevBackend {
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    started: AtomicBool,
    hotkeys: Mutex<HashMap<String, Registration>>,
}

struct Registration {
    chord: Chord,
    callback: HotkeyCallback,
}

impl RdevBackend {
    pub fn new() -> Result<Self, BackendError> {
        if cfg!(target_os = "linux")
            && std::env::var_os("DISPLAY").is_none()
            && std::env::var_os("WAYLAND_DISPLAY").is_none()
        {
            return Err(BackendError::Unavailable(
                "no display server detected (DISPLAY and WAYLAND_DISPLAY are unset)".into(),
            ));
        }
        Ok(Self {
            shared: Arc::new(Shared::default()),
        })
    }
}

impl HookBackend for RdevBackend {
    fn start(&self, handler: EventHandler) -> Result<(), BackendError> {
        if self.shared.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let shared = self.shared.clone();
        let spawned = thread::Builder::new()
            .name("keyflow-hooks".into())
            .spawn(move || {
                let mut ctrl_held = false;
                let mut shift_held = false;
                let mut alt_held = false;
                let mut meta_held = false;

                let callback = move |event: Event| {
                    let (kind, key) = match event.event_type {
                        EventType::KeyPress(key) => (EventKind::Down, key),
                        EventType::KeyRelease(key) => (EventKind::Up, key),
                        _ => return,
                    };

                    match key {
                        Key::ControlLeft | Key::ControlRight => {
                            ctrl_held = kind == EventKind::Down
                        }
                        Key::ShiftLeft | Key::ShiftRight => shift_held = kind == EventKind::Down,
                        Key::Alt | Key::AltGr => alt_held = kind == EventKind::Down,
                        Key::MetaLeft | Key::MetaRight => meta_held = kind == EventKind::Down,
                        _ => {}
                    }

                    let name = key_name(key);
                    if kind == EventKind::Down && !name.is_empty() {
                        let matched: Vec<HotkeyCallback> = shared
                            .hotkeys
                            .lock()
                            .unwrap()
                            .values()
                            .filter(|registration| {
                                registration.chord.key_name() == name
                                    && modifiers_held(
                                        registration.chord.modifiers(),
                                        ctrl_held,
                                        shift_held,
                                        alt_held,
                                        meta_held,
                                    )
                            })
                            .map(|registration| registration.callback.clone())
                            .collect();
                        for callback in matched {
                            callback();
                        }
                    }

                    handler(KeyEvent {
                        kind,
                        name: name.to_string(),
                    });
                };

                // Blocks for the life of the process; rdev has no stop API.
                if let Err(err) = listen(callback) {
                    tracing::error!("global keyboard hook terminated: {:?}", err);
                }
            });

        if let Err(err) = spawned {
            self.shared.started.store(false, Ordering::SeqCst);
            return Err(BackendError::Unavailable(format!(
                "failed to spawn hook thread: {err}"
            )));
        }
        Ok(())
    }

    fn send(&self, chord: &Chord) -> Result<(), BackendError> {
        let mut pressed = Vec::new();
        let result = press_chord(chord, &mut pressed);
        // Held modifiers are released even when the tap in the middle fails.
        for key in pressed.into_iter().rev() {
            if let Err(err) = tap(EventType::KeyRelease(key)) {
                tracing::debug!("failed to release modifier: {err}");
            }
        }
        result
    }

    fn write(&self, text: &str) -> Result<(), BackendError> {
        for ch in text.chars() {
            let Some((key, shifted)) = key_for_char(ch) else {
                tracing::warn!("cannot synthesize character {:?}, skipping", ch);
                continue;
            };
            if shifted {
                tap(EventType::KeyPress(Key::ShiftLeft))?;
            }
            tap(EventType::KeyPress(key))?;
            tap(EventType::KeyRelease(key))?;
            if shifted {
                tap(EventType::KeyRelease(Key::ShiftLeft))?;
            }
        }
        Ok(())
    }

    fn is_toggled(&self, _key: &str) -> bool {
        // rdev exposes no LED/toggle state query.
        false
    }

    fn add_hotkey(&self, chord: &Chord, callback: HotkeyCallback) -> Result<(), BackendError> {
        if key_from_name(chord.key_name()).is_none() {
            return Err(BackendError::UnknownKey(chord.key_name().to_string()));
        }
        self.shared.hotkeys.lock().unwrap().insert(
            chord.to_string(),
            Registration {
                chord: chord.clone(),
                callback,
            },
        );
        Ok(())
    }

    fn remove_hotkey(&self, chord: &Chord) -> Result<(), BackendError> {
        self.shared.hotkeys.lock().unwrap().remove(&chord.to_string());
        Ok(())
    }
}

fn press_chord(chord: &Chord, pressed: &mut Vec<Key>) -> Result<(), BackendError> {
    for modifier in chord.modifiers() {
        let key = key_from_name(modifier)
            .ok_or_else(|| BackendError::UnknownKey(modifier.clone()))?;
        tap(EventType::KeyPress(key))?;
        pressed.push(key);
    }
    let key = key_from_name(chord.key_name())
        .ok_or_else(|| BackendError::UnknownKey(chord.key_name().to_string()))?;
    tap(EventType::KeyPress(key))?;
    tap(EventType::KeyRelease(key))
}

fn tap(event: EventType) -> Result<(), BackendError> {
    simulate(&event).map_err(|err| BackendError::Synthesis(format!("{err:?} for {event:?}")))?;
    thread::sleep(SIMULATE_DELAY);
    Ok(())
}

fn modifiers_held(
    modifiers: &[String],
    ctrl: bool,
    shift: bool,
    alt: bool,
    meta: bool,
) -> bool {
    modifiers.iter().all(|modifier| match modifier.as_str() {
        "ctrl" => ctrl,
        "shift" => shift,
        "alt" => alt,
        "cmd" | "meta" | "super" => meta,
        _ => false,
    })
}

/// Normalized name for a captured key; empty for keys the engine has no
/// use for (navigation, keypad, media)
fn key_name(key: Key) -> &'static str {
    match key {
        Key::KeyA => "a",
        Key::KeyB => "b",
        Key::KeyC => "c",
        Key::KeyD => "d",
        Key::KeyE => "e",
        Key::KeyF => "f",
        Key::KeyG => "g",
        Key::KeyH => "h",
        Key::KeyI => "i",
        Key::KeyJ => "j",
        Key::KeyK => "k",
        Key::KeyL => "l",
        Key::KeyM => "m",
        Key::KeyN => "n",
        Key::KeyO => "o",
        Key::KeyP => "p",
        Key::KeyQ => "q",
        Key::KeyR => "r",
        Key::KeyS => "s",
        Key::KeyT => "t",
        Key::KeyU => "u",
        Key::KeyV => "v",
        Key::KeyW => "w",
        Key::KeyX => "x",
        Key::KeyY => "y",
        Key::KeyZ => "z",
        Key::Num0 => "0",
        Key::Num1 => "1",
        Key::Num2 => "2",
        Key::Num3 => "3",
        Key::Num4 => "4",
        Key::Num5 => "5",
        Key::Num6 => "6",
        Key::Num7 => "7",
        Key::Num8 => "8",
        Key::Num9 => "9",
        Key::Minus => "-",
        Key::Equal => "=",
        Key::LeftBracket => "[",
        Key::RightBracket => "]",
        Key::SemiColon => ";",
        Key::Quote => "'",
        Key::Comma => ",",
        Key::Dot => ".",
        Key::Slash => "/",
        Key::BackSlash => "\\",
        Key::BackQuote => "`",
        Key::Space => "space",
        Key::Return => "enter",
        Key::Tab => "tab",
        Key::Backspace => "backspace",
        Key::ShiftLeft => "left shift",
        Key::ShiftRight => "right shift",
        Key::CapsLock => "caps lock",
        Key::ControlLeft | Key::ControlRight => "ctrl",
        Key::Alt | Key::AltGr => "alt",
        Key::MetaLeft | Key::MetaRight => "meta",
        Key::F1 => "f1",
        Key::F2 => "f2",
        Key::F3 => "f3",
        Key::F4 => "f4",
        Key::F5 => "f5",
        Key::F6 => "f6",
        Key::F7 => "f7",
        Key::F8 => "f8",
        Key::F9 => "f9",
        Key::F10 => "f10",
        Key::F11 => "f11",
        Key::F12 => "f12",
        _ => "",
    }
}

/// Reverse of [`key_name`] for synthesis and chord registration
fn key_from_name(name: &str) -> Option<Key> {
    let key = match name {
        "a" => Key::KeyA,
        "b" => Key::KeyB,
        "c" => Key::KeyC,
        "d" => Key::KeyD,
        "e" => Key::KeyE,
        "f" => Key::KeyF,
        "g" => Key::KeyG,
        "h" => Key::KeyH,
        "i" => Key::KeyI,
        "j" => Key::KeyJ,
        "k" => Key::KeyK,
        "l" => Key::KeyL,
        "m" => Key::KeyM,
        "n" => Key::KeyN,
        "o" => Key::KeyO,
        "p" => Key::KeyP,
        "q" => Key::KeyQ,
        "r" => Key::KeyR,
        "s" => Key::KeyS,
        "t" => Key::KeyT,
        "u" => Key::KeyU,
        "v" => Key::KeyV,
        "w" => Key::KeyW,
        "x" => Key::KeyX,
        "y" => Key::KeyY,
        "z" => Key::KeyZ,
        "0" => Key::Num0,
        "1" => Key::Num1,
        "2" => Key::Num2,
        "3" => Key::Num3,
        "4" => Key::Num4,
        "5" => Key::Num5,
        "6" => Key::Num6,
        "7" => Key::Num7,
        "8" => Key::Num8,
        "9" => Key::Num9,
        "-" => Key::Minus,
        "=" => Key::Equal,
        "[" => Key::LeftBracket,
        "]" => Key::RightBracket,
        ";" => Key::SemiColon,
        "'" => Key::Quote,
        "," => Key::Comma,
        "." => Key::Dot,
        "/" => Key::Slash,
        "\\" => Key::BackSlash,
        "`" => Key::BackQuote,
        "space" => Key::Space,
        "enter" => Key::Return,
        "tab" => Key::Tab,
        "backspace" => Key::Backspace,
        "shift" | "left shift" => Key::ShiftLeft,
        "right shift" => Key::ShiftRight,
        "caps lock" => Key::CapsLock,
        "ctrl" => Key::ControlLeft,
        "alt" => Key::Alt,
        "cmd" | "meta" | "super" => Key::MetaLeft,
        "f1" => Key::F1,
        "f2" => Key::F2,
        "f3" => Key::F3,
        "f4" => Key::F4,
        "f5" => Key::F5,
        "f6" => Key::F6,
        "f7" => Key::F7,
        "f8" => Key::F8,
        "f9" => Key::F9,
        "f10" => Key::F10,
        "f11" => Key::F11,
        "f12" => Key::F12,
        _ => return None,
    };
    Some(key)
}

/// Key plus shift flag that produces `ch` on the ANSI US layout
fn key_for_char(ch: char) -> Option<(Key, bool)> {
    if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
        return key_from_name(&ch.to_string()).map(|key| (key, false));
    }
    if ch.is_ascii_uppercase() {
        return key_from_name(&ch.to_ascii_lowercase().to_string()).map(|key| (key, true));
    }
    match ch {
        ' ' => return Some((Key::Space, false)),
        '\n' => return Some((Key::Return, false)),
        '\t' => return Some((Key::Tab, false)),
        _ => {}
    }
    let (base, shifted) = match ch {
        '-' | '=' | '[' | ']' | ';' | '\'' | ',' | '.' | '/' | '\\' | '`' => (ch, false),
        '!' => ('1', true),
        '@' => ('2', true),
        '#' => ('3', true),
        '$' => ('4', true),
        '%' => ('5', true),
        '^' => ('6', true),
        '&' => ('7', true),
        '*' => ('8', true),
        '(' => ('9', true),
        ')' => ('0', true),
        '_' => ('-', true),
        '+' => ('=', true),
        '{' => ('[', true),
        '}' => (']', true),
        ':' => (';', true),
        '"' => ('\'', true),
        '<' => (',', true),
        '>' => ('.', true),
        '?' => ('/', true),
        '|' => ('\\', true),
        '~' => ('`', true),
        _ => return None,
    };
    key_from_name(&base.to_string()).map(|key| (key, shifted))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_name_round_trip() {
        for name in ["a", "z", "0", "9", "-", "space", "enter", "backspace", "f12"] {
            let key = key_from_name(name).unwrap();
            assert_eq!(key_name(key), name);
        }
    }

    #[test]
    fn test_shift_variants_normalize() {
        assert_eq!(key_name(Key::ShiftLeft), "left shift");
        assert_eq!(key_name(Key::ShiftRight), "right shift");
        assert_eq!(key_from_name("shift"), Some(Key::ShiftLeft));
    }

    #[test]
    fn test_unknown_keys_yield_empty_name() {
        assert_eq!(key_name(Key::Home), "");
        assert_eq!(key_name(Key::Kp5), "");
        assert_eq!(key_from_name("hyper"), None);
    }

    #[test]
    fn test_key_for_char_shift_pairs() {
        assert_eq!(key_for_char('a'), Some((Key::KeyA, false)));
        assert_eq!(key_for_char('A'), Some((Key::KeyA, true)));
        assert_eq!(key_for_char('!'), Some((Key::Num1, true)));
        assert_eq!(key_for_char('_'), Some((Key::Minus, true)));
        assert_eq!(key_for_char('\n'), Some((Key::Return, false)));
        assert_eq!(key_for_char('é'), None);
    }

    #[test]
    fn test_modifiers_held() {
        let chord = Chord::parse("ctrl+shift+p").unwrap();
        assert!(modifiers_held(chord.modifiers(), true, true, false, false));
        assert!(!modifiers_held(chord.modifiers(), true, false, false, false));
        assert!(modifiers_held(&[], false, false, false, false));
    }
}
