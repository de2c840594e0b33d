//! Keyflow: system-wide text expansion daemon
//!
//! This library provides the core functionality for:
//! - Capturing global key events through a pluggable hook backend (rdev)
//! - Matching recently-typed suffixes against per-profile trigger sets
//! - Replacing a fired trigger in place: synthesized backspaces, then
//!   clipboard paste with a typed fallback
//! - Persisting profiles and configuration as JSON, optionally encrypting
//!   the profiles payload with a passphrase
//! - Dispatching the reserved global hot-keys (toggle, profile switch,
//!   quick add)
//!
//! # Architecture
//!
//! ```text
//!   ┌─────────────┐  key events   ┌──────────────┐  backspaces + paste
//!   │ HookBackend │ ────────────▶ │    Engine    │ ────────────────────▶
//!   │   (rdev)    │ ◀──────────── │  (buffer +   │        focused app
//!   └─────────────┘  synthesis    │   matching)  │
//!          │                      └──────────────┘
//!          │ reserved chords             ▲
//!          ▼                             │ trigger set
//!   ┌─────────────┐   HostEvents  ┌──────────────┐
//!   │  Hot-keys   │ ────────────▶ │    Daemon    │ ◀──▶ Store (JSON,
//!   │  dispatch   │               │  (host loop) │       AES-GCM option)
//!   └─────────────┘               └──────────────┘
//! ```

pub mod cli;
pub mod clipboard;
pub mod config;
pub mod daemon;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod hooks_rdev;
pub mod hotkeys;
pub mod keymap;
pub mod storage;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use daemon::Daemon;
pub use engine::{Engine, EngineStats};
pub use error::{KeyflowError, Result};
pub use storage::Store;
