//! Cloud credential storage
//!
//! The engine only ever asks a [`CredentialStore`] for the current key; where
//! it lives is up to the store. Blank or whitespace-only keys count as absent.

use crate::error::{RemovalError, Result};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Settings key holding the cloud API key
pub const API_KEY_SETTING: &str = "gemini_api_key";

/// Storage for the single cloud credential
pub trait CredentialStore: Send + Sync {
    /// Current key, `None` when unset or blank
    fn get(&self) -> Result<Option<String>>;

    /// Store a key, replacing any previous one
    fn set(&self, key: &str) -> Result<()>;

    /// Remove the stored key
    fn clear(&self) -> Result<()>;

    /// Whether a non-blank key is stored
    fn is_configured(&self) -> bool {
        matches!(self.get(), Ok(Some(_)))
    }
}

fn normalize(key: &str) -> Option<String> {
    let trimmed = key.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Process-local store, used by tests and embedders that manage secrets themselves
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    key: RwLock<Option<String>>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_key(key: &str) -> Self {
        Self {
            key: RwLock::new(normalize(key)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self) -> Result<Option<String>> {
        let guard = self
            .key
            .read()
            .map_err(|_| RemovalError::internal("credential store lock poisoned"))?;
        Ok(guard.clone())
    }

    fn set(&self, key: &str) -> Result<()> {
        let mut guard = self
            .key
            .write()
            .map_err(|_| RemovalError::internal("credential store lock poisoned"))?;
        *guard = normalize(key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.set("")
    }
}

/// Store backed by a JSON settings file
///
/// Other keys in the file are preserved on write.
#[derive(Debug, Clone)]
pub struct JsonFileCredentialStore {
    path: PathBuf,
}

impl JsonFileCredentialStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Store under the user config directory (`<config>/watermark-remover/settings.json`)
    ///
    /// # Errors
    /// Returns `RemovalError::Internal` when no config directory exists for this platform
    pub fn default_location() -> Result<Self> {
        let dir = dirs::config_dir()
            .ok_or_else(|| RemovalError::internal("Could not determine the user config directory"))?;
        Ok(Self::new(dir.join("watermark-remover").join("settings.json")))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_settings(&self) -> Result<Map<String, Value>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(RemovalError::file_io_error("read settings", &self.path, &e)),
        };
        if content.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(RemovalError::validation(format!(
                "Settings file '{}' is not a JSON object",
                self.path.display()
            ))),
            Err(e) => Err(RemovalError::validation(format!(
                "Invalid settings file '{}': {}",
                self.path.display(),
                e
            ))),
        }
    }

    fn write_settings(&self, settings: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| RemovalError::file_io_error("create settings directory", parent, &e))?;
        }
        let content = serde_json::to_string_pretty(settings)
            .map_err(|e| RemovalError::internal(format!("Failed to serialize settings: {}", e)))?;
        std::fs::write(&self.path, content)
            .map_err(|e| RemovalError::file_io_error("write settings", &self.path, &e))
    }
}

impl CredentialStore for JsonFileCredentialStore {
    fn get(&self) -> Result<Option<String>> {
        let settings = self.read_settings()?;
        Ok(settings
            .get(API_KEY_SETTING)
            .and_then(Value::as_str)
            .and_then(normalize))
    }

    fn set(&self, key: &str) -> Result<()> {
        let mut settings = self.read_settings()?;
        match normalize(key) {
            Some(key) => {
                settings.insert(API_KEY_SETTING.to_string(), Value::String(key));
            },
            None => {
                settings.remove(API_KEY_SETTING);
            },
        }
        self.write_settings(&settings)?;
        log::debug!("Updated cloud credential in {}", self.path.display());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut settings = self.read_settings()?;
        if settings.remove(API_KEY_SETTING).is_some() {
            self.write_settings(&settings)?;
        }
        Ok(())
    }
}
