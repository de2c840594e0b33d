//! Clipboard access for the emission path
//!
//! The engine treats the clipboard as an opportunistic shared resource: it
//! saves the current content, pastes through it, verifies, and restores.
//! The trait seam keeps the engine testable without a real clipboard.

use crate::error::ClipboardError;

pub trait Clipboard: Send + Sync {
    fn get_text(&self) -> Result<String, ClipboardError>;
    fn set_text(&self, text: &str) -> Result<(), ClipboardError>;
}

/// System clipboard backed by arboard.
///
/// A fresh handle per call: holding an arboard handle open would make this
/// process the clipboard owner on X11 for longer than one operation needs.
#[derive(Debug, Default)]
pub struct SystemClipboard;

impl Clipboard for SystemClipboard {
    fn get_text(&self) -> Result<String, ClipboardError> {
        arboard::Clipboard::new()
            .and_then(|mut clipboard| clipboard.get_text())
            .map_err(|err| ClipboardError(err.to_string()))
    }

    fn set_text(&self, text: &str) -> Result<(), ClipboardError> {
        arboard::Clipboard::new()
            .and_then(|mut clipboard| clipboard.set_text(text.to_string()))
            .map_err(|err| ClipboardError(err.to_string()))
    }
}
