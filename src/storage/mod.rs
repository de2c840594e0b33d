//! Profile and configuration persistence
//!
//! Two JSON files back the daemon: a profiles file in the data directory
//! and a config file in the config directory. Loads are total: a missing or
//! malformed file materializes defaults and is rewritten; invariant repairs
//! (default profile present, current-profile pointer resident) happen on
//! every load. Writes go through a sibling temp file, fsync, and rename so
//! a crash never leaves a half-written file behind.
//!
//! The profiles payload can be encrypted with a passphrase; see
//! [`crypto`] for the envelope format.

pub mod crypto;

use crate::config::Config;
use crate::error::{EncryptionError, StorageError};
use crypto::Envelope;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// The profile that always exists; load re-creates it if missing
pub const DEFAULT_PROFILE: &str = "main";

pub type TriggerMap = HashMap<String, String>;
pub type ProfileMap = HashMap<String, TriggerMap>;

pub struct Store {
    data_dir: PathBuf,
    config_dir: PathBuf,
    /// Pre-XDG directory migrated on first run; `None` disables migration
    legacy_dir: Option<PathBuf>,
}

impl Store {
    /// Store rooted at the OS-appropriate user directories
    pub fn open_default() -> Result<Self, StorageError> {
        let dirs = directories::ProjectDirs::from("", "", "keyflow")
            .ok_or(StorageError::NoHomeDir)?;
        Ok(Self {
            data_dir: dirs.data_dir().to_path_buf(),
            config_dir: dirs.config_dir().to_path_buf(),
            legacy_dir: dirs::home_dir().map(|home| home.join(".keyflow")),
        })
    }

    /// Store rooted at explicit directories (tests, portable installs).
    /// Legacy migration is disabled.
    pub fn new(data_dir: PathBuf, config_dir: PathBuf) -> Self {
        Self {
            data_dir,
            config_dir,
            legacy_dir: None,
        }
    }

    /// Default directories with optional per-directory overrides
    pub fn resolve(
        data_dir: Option<PathBuf>,
        config_dir: Option<PathBuf>,
    ) -> Result<Self, StorageError> {
        if data_dir.is_none() && config_dir.is_none() {
            return Self::open_default();
        }
        let dirs = directories::ProjectDirs::from("", "", "keyflow");
        let data_dir = match data_dir {
            Some(dir) => dir,
            None => dirs
                .as_ref()
                .ok_or(StorageError::NoHomeDir)?
                .data_dir()
                .to_path_buf(),
        };
        let config_dir = match config_dir {
            Some(dir) => dir,
            None => dirs
                .as_ref()
                .ok_or(StorageError::NoHomeDir)?
                .config_dir()
                .to_path_buf(),
        };
        Ok(Self::new(data_dir, config_dir))
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn profiles_path(&self) -> PathBuf {
        self.data_dir.join("profiles.json")
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join("config.json")
    }

    fn ensure_dirs(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.data_dir).map_err(|err| io_err(&self.data_dir, err))?;
        fs::create_dir_all(&self.config_dir).map_err(|err| io_err(&self.config_dir, err))?;
        self.migrate_legacy();
        Ok(())
    }

    /// Copy files out of the legacy colocated directory, then best-effort
    /// remove the originals. Only files whose new location is still empty
    /// are migrated.
    fn migrate_legacy(&self) {
        let Some(legacy) = &self.legacy_dir else {
            return;
        };
        if !legacy.is_dir() {
            return;
        }
        let pairs = [
            (legacy.join("profiles.json"), self.profiles_path()),
            (legacy.join("config.json"), self.config_path()),
        ];
        let mut migrated = false;
        for (source, target) in &pairs {
            if source.is_file() && !target.exists() {
                match fs::copy(source, target) {
                    Ok(_) => {
                        tracing::info!("migrated {:?} -> {:?}", source, target);
                        migrated = true;
                    }
                    Err(err) => tracing::warn!("failed to migrate {:?}: {}", source, err),
                }
            }
        }
        if migrated {
            for (source, _) in &pairs {
                let _ = fs::remove_file(source);
            }
            let _ = fs::remove_dir(legacy);
        }
    }

    /// Load the profile set and current-profile pointer.
    ///
    /// A passphrase is required when the on-disk payload is encrypted.
    /// After repairs the file is rewritten in normalized form, preserving
    /// its encryption status. Decryption failures leave the file untouched.
    pub fn load_profiles(
        &self,
        passphrase: Option<&str>,
    ) -> Result<(String, ProfileMap), StorageError> {
        self.ensure_dirs()?;
        let path = self.profiles_path();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(err) => return Err(io_err(&path, err)),
        };
        let value: Value = serde_json::from_str(&raw).unwrap_or(Value::Null);

        let (value, encrypted) = if is_encrypted(&value) {
            let envelope: Envelope = serde_json::from_value(value)
                .map_err(|_| EncryptionError::MalformedEnvelope)?;
            let passphrase = passphrase.ok_or(EncryptionError::PassphraseRequired)?;
            let plaintext = crypto::open(&envelope, passphrase)?;
            let inner = serde_json::from_slice(&plaintext).unwrap_or(Value::Null);
            (inner, true)
        } else {
            (value, false)
        };

        let (current, profiles) = normalize_profiles(value);
        self.save_profiles(
            &current,
            &profiles,
            if encrypted { passphrase } else { None },
        )?;
        Ok((current, profiles))
    }

    /// Persist the profile set. Encrypts when a passphrase is supplied,
    /// writes plaintext otherwise.
    pub fn save_profiles(
        &self,
        current: &str,
        profiles: &ProfileMap,
        passphrase: Option<&str>,
    ) -> Result<(), StorageError> {
        self.ensure_dirs()?;
        let payload = serde_json::json!({
            "current_profile": current,
            "profiles": profiles,
        });
        let body = match passphrase {
            Some(passphrase) => {
                let plaintext = serde_json::to_vec(&payload)?;
                let envelope = crypto::seal(&plaintext, passphrase)?;
                serde_json::to_string_pretty(&envelope)?
            }
            None => serde_json::to_string_pretty(&payload)?,
        };
        write_atomic(&self.profiles_path(), body.as_bytes())
    }

    /// Whether the on-disk profiles payload is marked encrypted.
    /// Missing or unreadable files count as plaintext.
    pub fn profiles_are_encrypted(&self) -> bool {
        fs::read_to_string(self.profiles_path())
            .ok()
            .and_then(|raw| serde_json::from_str::<Value>(&raw).ok())
            .map(|value| is_encrypted(&value))
            .unwrap_or(false)
    }

    /// Load the configuration, filling missing keys from defaults and
    /// rewriting the file so repairs stick
    pub fn load_config(&self) -> Result<Config, StorageError> {
        self.ensure_dirs()?;
        let path = self.config_path();
        let config = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                tracing::warn!("malformed config file ({}); restoring defaults", err);
                Config::default()
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(err) => return Err(io_err(&path, err)),
        };
        self.save_config(&config)?;
        Ok(config)
    }

    pub fn save_config(&self, config: &Config) -> Result<(), StorageError> {
        self.ensure_dirs()?;
        let body = serde_json::to_string_pretty(config)?;
        write_atomic(&self.config_path(), body.as_bytes())
    }
}

fn is_encrypted(value: &Value) -> bool {
    value
        .get("encrypted")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Coerce an arbitrary JSON value into a valid profile record: string
/// triggers and outputs only, default profile present, pointer resident
fn normalize_profiles(value: Value) -> (String, ProfileMap) {
    let object = value.as_object();
    let mut profiles = ProfileMap::new();
    if let Some(raw) = object
        .and_then(|object| object.get("profiles"))
        .and_then(Value::as_object)
    {
        for (name, entry) in raw {
            if let Some(triggers) = entry.as_object() {
                let triggers = triggers
                    .iter()
                    .filter_map(|(trigger, output)| {
                        output
                            .as_str()
                            .map(|output| (trigger.clone(), output.to_string()))
                    })
                    .collect();
                profiles.insert(name.clone(), triggers);
            }
        }
    }
    profiles.entry(DEFAULT_PROFILE.to_string()).or_default();

    let current = object
        .and_then(|object| object.get("current_profile"))
        .and_then(Value::as_str)
        .filter(|name| profiles.contains_key(*name))
        .unwrap_or(DEFAULT_PROFILE)
        .to_string();
    (current, profiles)
}

/// Write to a sibling temp file, fsync, then rename over the target
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(|err| io_err(dir, err))?;
    temp.write_all(bytes).map_err(|err| io_err(path, err))?;
    temp.as_file()
        .sync_all()
        .map_err(|err| io_err(path, err))?;
    temp.persist(path).map_err(|err| io_err(path, err.error))?;
    Ok(())
}

fn io_err(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}
