//! Configuration types for keyflow
//!
//! The config file is a flat JSON object. Missing keys are filled from the
//! defaults below; keys this version does not recognize are preserved
//! verbatim across a load/save round trip so downgrades and sibling tools
//! keep their settings.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Minimum wall-time in seconds between two trigger fires
    #[serde(default = "default_cooldown")]
    pub cooldown: f64,

    /// Sleep in seconds between clipboard write and paste, and between
    /// synthesized backspaces
    #[serde(default = "default_paste_delay")]
    pub paste_delay: f64,

    /// Shared modifier for the three reserved global chords: ctrl, shift,
    /// or alt
    #[serde(default = "default_hotkey_modifier")]
    pub hotkey_modifier: String,

    /// Reserved chord key: capture a quick-add event
    #[serde(default = "default_quick_add_key")]
    pub quick_add_key: String,

    /// Reserved chord key: cycle the active profile
    #[serde(default = "default_profile_switch_key")]
    pub profile_switch_key: String,

    /// Reserved chord key: toggle expansion on/off
    #[serde(default = "default_toggle_hotkey_key")]
    pub toggle_hotkey_key: String,

    /// Whether the on-disk profiles payload is encrypted
    #[serde(default)]
    pub profiles_encrypted: bool,

    /// Unrecognized keys, preserved round-trip
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_cooldown() -> f64 {
    0.3
}

fn default_paste_delay() -> f64 {
    0.05
}

fn default_hotkey_modifier() -> String {
    "ctrl".to_string()
}

fn default_quick_add_key() -> String {
    "f10".to_string()
}

fn default_profile_switch_key() -> String {
    "f11".to_string()
}

fn default_toggle_hotkey_key() -> String {
    "f12".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cooldown: default_cooldown(),
            paste_delay: default_paste_delay(),
            hotkey_modifier: default_hotkey_modifier(),
            quick_add_key: default_quick_add_key(),
            profile_switch_key: default_profile_switch_key(),
            toggle_hotkey_key: default_toggle_hotkey_key(),
            profiles_encrypted: false,
            extra: serde_json::Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.cooldown, 0.3);
        assert_eq!(config.paste_delay, 0.05);
        assert_eq!(config.hotkey_modifier, "ctrl");
        assert_eq!(config.quick_add_key, "f10");
        assert_eq!(config.profile_switch_key, "f11");
        assert_eq!(config.toggle_hotkey_key, "f12");
        assert!(!config.profiles_encrypted);
        assert!(config.extra.is_empty());
    }

    #[test]
    fn test_missing_keys_fill_from_defaults() {
        let config: Config = serde_json::from_str(r#"{"cooldown": 1.5}"#).unwrap();
        assert_eq!(config.cooldown, 1.5);
        assert_eq!(config.paste_delay, 0.05);
        assert_eq!(config.toggle_hotkey_key, "f12");
    }

    #[test]
    fn test_unknown_keys_round_trip() {
        let raw = r#"{"cooldown": 0.2, "theme": "dark", "window": {"w": 800}}"#;
        let config: Config = serde_json::from_str(raw).unwrap();
        assert_eq!(config.extra["theme"], "dark");
        assert_eq!(config.extra["window"]["w"], 800);

        let emitted = serde_json::to_string(&config).unwrap();
        let reparsed: Config = serde_json::from_str(&emitted).unwrap();
        assert_eq!(reparsed, config);
    }
}
