//! Error types for keyflow
//!
//! Uses thiserror for ergonomic error definitions. Each subsystem gets its
//! own enum; `KeyflowError` rolls them up at the library boundary.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the keyflow library
#[derive(Error, Debug)]
pub enum KeyflowError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Hotkey error: {0}")]
    Hotkey(#[from] HotkeyError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the global keyboard hook layer
#[derive(Error, Debug)]
pub enum BackendError {
    /// The hook layer cannot initialize at all (missing permission, no
    /// display server, unknown backend override). The engine keeps running
    /// in a degraded "no hooks" mode when it sees this.
    #[error("keyboard hooks unavailable: {0}")]
    Unavailable(String),

    #[error("key synthesis failed: {0}")]
    Synthesis(String),

    #[error("unknown key name: '{0}'")]
    UnknownKey(String),
}

/// Errors from the profile and config store
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("profiles encryption error: {0}")]
    Encryption(#[from] EncryptionError),

    #[error("could not determine a home directory for keyflow data")]
    NoHomeDir,

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode persisted data: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failures decrypting or encrypting the profiles payload.
///
/// All of these surface to the caller so it can re-prompt for a passphrase;
/// the on-disk file is never touched on the failure path.
#[derive(Error, Debug)]
pub enum EncryptionError {
    #[error("profiles file is encrypted; passphrase required")]
    PassphraseRequired,

    #[error("wrong passphrase or corrupted profiles payload")]
    BadPassphrase,

    #[error("unsupported envelope version {0}")]
    UnsupportedVersion(u32),

    #[error("malformed encryption envelope")]
    MalformedEnvelope,

    #[error("encryption failure")]
    Cipher,
}

/// Errors composing or registering global hot-key chords
#[derive(Error, Debug)]
pub enum HotkeyError {
    #[error("invalid chord '{0}': expected <modifier>+<key>")]
    InvalidChord(String),

    #[error("unsupported hotkey modifier '{0}': use ctrl, shift, or alt")]
    UnsupportedModifier(String),
}

/// Clipboard read/write failure during emission
#[derive(Error, Debug)]
#[error("clipboard error: {0}")]
pub struct ClipboardError(pub String);

/// Errors inside the emission path.
///
/// Clipboard and verification failures are transient and recovered by
/// falling back to direct typing; a backend failure is terminal for the
/// fire in progress.
#[derive(Error, Debug)]
pub enum EmissionError {
    #[error(transparent)]
    Clipboard(#[from] ClipboardError),

    #[error("clipboard verification mismatch")]
    Verification,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Result type alias using KeyflowError
pub type Result<T> = std::result::Result<T, KeyflowError>;
