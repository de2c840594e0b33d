//! Trigger engine
//!
//! Consumes normalized key events from the hook backend, maintains a
//! bounded buffer of recently-typed characters, and fires when a buffer
//! suffix matches a configured trigger: the trigger is deleted with
//! synthesized backspaces and the expansion is inserted by clipboard paste,
//! falling back to direct typing.
//!
//! The event handler mutates engine state under a single short lock;
//! emission (synthesized key I/O and its delays) always runs with the lock
//! released, because synthesized keys re-enter the handler through the OS
//! hook. The `suppress` flag makes the engine ignore its own output while a
//! fire is in flight.

use crate::clipboard::{Clipboard, SystemClipboard};
use crate::error::{BackendError, EmissionError};
use crate::hooks::{self, Chord, EventHandler, EventKind, HookBackend, HotkeyCallback, KeyEvent};
use crate::keymap::{self, Typed};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const SHIFT_KEYS: [&str; 3] = ["shift", "left shift", "right shift"];

/// Observer invoked with `(trigger, output)` around emission.
/// Must be cheap and non-blocking.
pub type FireObserver = Arc<dyn Fn(&str, &str) + Send + Sync>;

#[derive(Default)]
pub struct FireHooks {
    pub on_fire_start: Option<FireObserver>,
    pub on_fire_end: Option<FireObserver>,
}

/// Observable engine counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    pub fired: u64,
}

/// Cloneable handle to the trigger engine
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    backend: Option<Arc<dyn HookBackend>>,
    backend_error: Option<String>,
    clipboard: Arc<dyn Clipboard>,
    state: Mutex<EngineState>,
    fire_hooks: Mutex<FireHooks>,
    started: AtomicBool,
}

struct EngineState {
    /// Sorted longest-first, ties lexicographic; replaced wholesale on
    /// update so in-flight readers keep their snapshot
    triggers: Arc<Vec<(String, String)>>,
    max_len: usize,
    buffer: String,
    enabled: bool,
    suppress: bool,
    shift_active: bool,
    caps_lock: bool,
    cooldown: Duration,
    paste_delay: Duration,
    last_fire: Option<Instant>,
    fired_count: u64,
}

/// Everything emission needs, captured under the lock at fire time
struct FirePlan {
    trigger: String,
    output: String,
    paste_delay: Duration,
}

impl Engine {
    /// Engine wired to the platform hook backend and system clipboard.
    ///
    /// When the backend cannot initialize the engine still constructs, in a
    /// degraded mode with no capture and no emission; the reason is
    /// available from [`Engine::hooks_error`].
    pub fn new(triggers: HashMap<String, String>, cooldown: f64, paste_delay: f64) -> Self {
        match hooks::create() {
            Ok(backend) => Self::build(
                Some(backend),
                None,
                Arc::new(SystemClipboard),
                triggers,
                cooldown,
                paste_delay,
            ),
            Err(err) => {
                tracing::warn!("{err}; running without keyboard hooks");
                Self::build(
                    None,
                    Some(err.to_string()),
                    Arc::new(SystemClipboard),
                    triggers,
                    cooldown,
                    paste_delay,
                )
            }
        }
    }

    /// Engine with an injected backend and clipboard
    pub fn with_backend(
        backend: Arc<dyn HookBackend>,
        clipboard: Arc<dyn Clipboard>,
        triggers: HashMap<String, String>,
        cooldown: f64,
        paste_delay: f64,
    ) -> Self {
        Self::build(Some(backend), None, clipboard, triggers, cooldown, paste_delay)
    }

    fn build(
        backend: Option<Arc<dyn HookBackend>>,
        backend_error: Option<String>,
        clipboard: Arc<dyn Clipboard>,
        triggers: HashMap<String, String>,
        cooldown: f64,
        paste_delay: f64,
    ) -> Self {
        let caps_lock = backend
            .as_ref()
            .map(|backend| backend.is_toggled("caps lock"))
            .unwrap_or(false);
        let (triggers, max_len) = sort_triggers(&triggers);
        Self {
            inner: Arc::new(EngineInner {
                backend,
                backend_error,
                clipboard,
                state: Mutex::new(EngineState {
                    triggers,
                    max_len,
                    buffer: String::new(),
                    enabled: true,
                    suppress: false,
                    shift_active: false,
                    caps_lock,
                    cooldown: seconds(cooldown),
                    paste_delay: seconds(paste_delay),
                    last_fire: None,
                    fired_count: 0,
                }),
                fire_hooks: Mutex::new(FireHooks::default()),
                started: AtomicBool::new(false),
            }),
        }
    }

    /// Begin event delivery. Idempotent; returns immediately. A degraded
    /// engine (no hooks) starts successfully and stays inert.
    pub fn start(&self) -> Result<(), BackendError> {
        let Some(backend) = self.inner.backend.clone() else {
            tracing::debug!("start requested without a hook backend; engine stays inert");
            return Ok(());
        };
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let inner = self.inner.clone();
        let handler: EventHandler = Arc::new(move |event| inner.handle_event(event));
        if let Err(err) = backend.start(handler) {
            self.inner.started.store(false, Ordering::SeqCst);
            return Err(err);
        }
        Ok(())
    }

    /// Replace the active trigger set atomically
    pub fn update_triggers(&self, triggers: &HashMap<String, String>) {
        let (sorted, max_len) = sort_triggers(triggers);
        let mut state = self.inner.state.lock().unwrap();
        state.triggers = sorted;
        state.max_len = max_len;
        truncate_to_last_chars(&mut state.buffer, max_len);
    }

    pub fn set_cooldown(&self, cooldown: f64) {
        self.inner.state.lock().unwrap().cooldown = seconds(cooldown);
    }

    pub fn set_paste_delay(&self, paste_delay: f64) {
        self.inner.state.lock().unwrap().paste_delay = seconds(paste_delay);
    }

    pub fn set_enabled(&self, enabled: bool) {
        let mut state = self.inner.state.lock().unwrap();
        state.enabled = enabled;
        if !enabled {
            state.buffer.clear();
        }
    }

    pub fn toggle_enabled(&self) -> bool {
        let mut state = self.inner.state.lock().unwrap();
        state.enabled = !state.enabled;
        if !state.enabled {
            state.buffer.clear();
        }
        state.enabled
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.state.lock().unwrap().enabled
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            fired: self.inner.state.lock().unwrap().fired_count,
        }
    }

    pub fn hooks_available(&self) -> bool {
        self.inner.backend.is_some()
    }

    pub fn hooks_error(&self) -> Option<String> {
        self.inner.backend_error.clone()
    }

    /// Install the fire observers, replacing any previous ones
    pub fn set_fire_hooks(&self, hooks: FireHooks) {
        *self.inner.fire_hooks.lock().unwrap() = hooks;
    }

    /// Register a global chord with the backend. A no-op without hooks.
    pub fn add_hotkey(&self, chord: &Chord, callback: HotkeyCallback) -> Result<(), BackendError> {
        match &self.inner.backend {
            Some(backend) => backend.add_hotkey(chord, callback),
            None => Ok(()),
        }
    }

    pub fn remove_hotkey(&self, chord: &Chord) -> Result<(), BackendError> {
        match &self.inner.backend {
            Some(backend) => backend.remove_hotkey(chord),
            None => Ok(()),
        }
    }

    #[cfg(test)]
    fn buffer_snapshot(&self) -> String {
        self.inner.state.lock().unwrap().buffer.clone()
    }
}

impl EngineInner {
    fn handle_event(&self, event: KeyEvent) {
        let name = event.name.to_ascii_lowercase();

        let plan = {
            let mut state = self.state.lock().unwrap();

            if SHIFT_KEYS.contains(&name.as_str()) {
                state.shift_active = event.kind == EventKind::Down;
                return;
            }
            if name == "caps lock" && event.kind == EventKind::Down {
                state.caps_lock = !state.caps_lock;
                return;
            }
            if event.kind != EventKind::Down {
                return;
            }

            if state.suppress || !state.enabled || state.triggers.is_empty() {
                if name == "backspace" {
                    state.buffer.pop();
                }
                return;
            }
            if name == "backspace" {
                state.buffer.pop();
                return;
            }

            match keymap::translate(&name, state.shift_active, state.caps_lock) {
                None => return,
                Some(Typed::Whitespace) => {
                    state.buffer.clear();
                    return;
                }
                Some(Typed::Char(ch)) => {
                    state.buffer.push(ch);
                    let max_len = state.max_len;
                    truncate_to_last_chars(&mut state.buffer, max_len);
                }
            }

            let Some((trigger, output)) = state.find_match() else {
                return;
            };
            // Too soon after the last fire: leave the buffer as-is so the
            // same match can fire once the cooldown elapses.
            if let Some(last_fire) = state.last_fire {
                if last_fire.elapsed() < state.cooldown {
                    return;
                }
            }
            state.last_fire = Some(Instant::now());
            state.suppress = true;
            FirePlan {
                trigger,
                output,
                paste_delay: state.paste_delay,
            }
        };

        self.run_emission(plan);
    }

    /// Emission and completion; runs with the state lock released
    fn run_emission(&self, plan: FirePlan) {
        if let Some(observer) = self.fire_hooks.lock().unwrap().on_fire_start.clone() {
            observer(&plan.trigger, &plan.output);
        }

        tracing::debug!(
            "expanding {:?} ({} chars)",
            plan.trigger,
            plan.output.chars().count()
        );
        let result = match &self.backend {
            Some(backend) => emit(
                backend.as_ref(),
                self.clipboard.as_ref(),
                &plan.trigger,
                &plan.output,
                plan.paste_delay,
            ),
            None => Ok(()),
        };
        let fired = match result {
            Ok(()) => true,
            Err(err) => {
                tracing::error!("emission aborted: {err}");
                false
            }
        };

        {
            let mut state = self.state.lock().unwrap();
            state.buffer.clear();
            if fired {
                state.fired_count += 1;
            }
            state.suppress = false;
        }

        if let Some(observer) = self.fire_hooks.lock().unwrap().on_fire_end.clone() {
            observer(&plan.trigger, &plan.output);
        }
    }
}

impl EngineState {
    /// First suffix match in the sorted list; longest-first ordering makes
    /// it the longest match, lexicographic tie-break makes it deterministic
    fn find_match(&self) -> Option<(String, String)> {
        self.triggers
            .iter()
            .find(|(trigger, _)| self.buffer.ends_with(trigger.as_str()))
            .cloned()
    }
}

/// Delete the trigger, then insert the output.
///
/// Clipboard trouble falls back to direct typing; only a backend failure
/// escapes, aborting the fire.
fn emit(
    backend: &dyn HookBackend,
    clipboard: &dyn Clipboard,
    trigger: &str,
    output: &str,
    paste_delay: Duration,
) -> Result<(), BackendError> {
    let backspace = Chord::key("backspace");
    for _ in 0..trigger.chars().count() {
        backend.send(&backspace)?;
        pause(paste_delay);
    }
    if let Err(err) = paste_via_clipboard(backend, clipboard, output, paste_delay) {
        tracing::warn!("clipboard paste failed ({err}); falling back to direct typing");
        backend.write(output)?;
    }
    Ok(())
}

/// Save the clipboard, paste the output through it, verify against racing
/// clipboard owners, and restore. Restore failures are logged, not raised.
fn paste_via_clipboard(
    backend: &dyn HookBackend,
    clipboard: &dyn Clipboard,
    output: &str,
    paste_delay: Duration,
) -> Result<(), EmissionError> {
    let previous = clipboard.get_text()?;
    clipboard.set_text(output)?;
    pause(paste_delay);

    let result = if clipboard.get_text()? != output {
        Err(EmissionError::Verification)
    } else {
        match backend.send(&paste_chord()) {
            Ok(()) => {
                pause(paste_delay);
                Ok(())
            }
            Err(err) => Err(EmissionError::Backend(err)),
        }
    };

    if let Err(err) = clipboard.set_text(&previous) {
        tracing::debug!("failed to restore clipboard: {err}");
    }
    result
}

fn paste_chord() -> Chord {
    if cfg!(target_os = "macos") {
        Chord::parse("cmd+v").expect("static chord")
    } else {
        Chord::parse("ctrl+v").expect("static chord")
    }
}

fn pause(delay: Duration) {
    if !delay.is_zero() {
        std::thread::sleep(delay);
    }
}

fn seconds(value: f64) -> Duration {
    Duration::from_secs_f64(value.max(0.0))
}

fn sort_triggers(triggers: &HashMap<String, String>) -> (Arc<Vec<(String, String)>>, usize) {
    let mut sorted: Vec<(String, String)> = triggers
        .iter()
        .filter(|(trigger, _)| !trigger.is_empty())
        .map(|(trigger, output)| (trigger.clone(), output.clone()))
        .collect();
    sorted.sort_by(|a, b| {
        b.0.chars()
            .count()
            .cmp(&a.0.chars().count())
            .then_with(|| a.0.cmp(&b.0))
    });
    let max_len = sorted
        .iter()
        .map(|(trigger, _)| trigger.chars().count())
        .max()
        .unwrap_or(0);
    (Arc::new(sorted), max_len)
}

/// Keep only the trailing `max` characters
fn truncate_to_last_chars(buffer: &mut String, max: usize) {
    let count = buffer.chars().count();
    if count > max {
        let cut = buffer
            .char_indices()
            .nth(count - max)
            .map(|(index, _)| index)
            .unwrap_or(buffer.len());
        buffer.drain(..cut);
    }
}
