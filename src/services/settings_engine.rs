// marksync Settings Engine
// Loads, saves and edits the sync settings stored as JSON under the platform config dir.

use std::fs;
use std::path::Path;

use tracing::{debug, info};
use uuid::Uuid;

use crate::platform;
use crate::types::errors::SettingsError;
use crate::types::settings::{StoreSettings, SyncSettings};

/// Trait defining the settings engine interface.
pub trait SettingsEngineTrait {
    fn load(&mut self) -> Result<SyncSettings, SettingsError>;
    fn save(&self) -> Result<(), SettingsError>;
    fn get_settings(&self) -> &SyncSettings;
    fn set_value(&mut self, key: &str, value: serde_json::Value) -> Result<(), SettingsError>;
    fn reset(&mut self) -> Result<(), SettingsError>;
    fn get_config_path(&self) -> &str;
}

/// Settings engine implementation that persists settings as JSON on disk.
pub struct SettingsEngine {
    config_path: String,
    settings: SyncSettings,
}

impl SettingsEngine {
    /// Creates a new SettingsEngine.
    ///
    /// Without `path_override` the file is `settings.json` in the platform config dir.
    pub fn new(path_override: Option<String>) -> Self {
        let config_path = match path_override {
            Some(p) => p,
            None => platform::get_config_dir()
                .join("settings.json")
                .to_string_lossy()
                .to_string(),
        };

        Self {
            config_path,
            settings: SyncSettings::default(),
        }
    }

    /// Returns this installation's client id, generating and saving one on first use.
    pub fn client_id(&mut self) -> Result<Uuid, SettingsError> {
        if let Some(id) = self.settings.remote.client_id {
            return Ok(id);
        }
        let id = Uuid::new_v4();
        info!(client_id = %id, "assigned new client id");
        self.settings.remote.client_id = Some(id);
        self.save()?;
        Ok(id)
    }

    /// Registers a local store, replacing any store with the same name.
    pub fn add_store(&mut self, name: &str, path: &Path) -> Result<(), SettingsError> {
        if name.trim().is_empty() {
            return Err(SettingsError::InvalidValue("Store name cannot be empty".to_string()));
        }
        self.settings.stores.retain(|s| s.name != name);
        self.settings.stores.push(StoreSettings {
            name: name.to_string(),
            path: path.to_path_buf(),
        });
        self.save()
    }

    /// Unregisters a local store. Returns false if no store had that name.
    pub fn remove_store(&mut self, name: &str) -> Result<bool, SettingsError> {
        let before = self.settings.stores.len();
        self.settings.stores.retain(|s| s.name != name);
        if self.settings.stores.len() == before {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }
}

impl SettingsEngineTrait for SettingsEngine {
    /// Loads settings from the JSON config file.
    ///
    /// A missing file yields defaults; a malformed one is a serialization error.
    fn load(&mut self) -> Result<SyncSettings, SettingsError> {
        let path = Path::new(&self.config_path);

        if !path.exists() {
            debug!(path = %self.config_path, "no settings file, using defaults");
            self.settings = SyncSettings::default();
            return Ok(self.settings.clone());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| SettingsError::IoError(format!("Failed to read config file: {}", e)))?;

        let settings: SyncSettings = serde_json::from_str(&content).map_err(|e| {
            SettingsError::SerializationError(format!("Failed to parse config file: {}", e))
        })?;

        self.settings = settings;
        Ok(self.settings.clone())
    }

    /// Saves the current settings, creating parent directories as needed.
    fn save(&self) -> Result<(), SettingsError> {
        let path = Path::new(&self.config_path);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                SettingsError::IoError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let json = serde_json::to_string_pretty(&self.settings).map_err(|e| {
            SettingsError::SerializationError(format!("Failed to serialize settings: {}", e))
        })?;

        fs::write(path, json)
            .map_err(|e| SettingsError::IoError(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    fn get_settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Updates an individual setting by dot-notation key path and saves.
    ///
    /// The new value is validated by deserializing the edited JSON back into
    /// [`SyncSettings`].
    ///
    /// # Examples
    /// - `"general.auto_sync"` → updates `settings.general.auto_sync`
    /// - `"remote.username"` → updates `settings.remote.username`
    fn set_value(&mut self, key: &str, value: serde_json::Value) -> Result<(), SettingsError> {
        if key.is_empty() {
            return Err(SettingsError::InvalidKey("Key cannot be empty".to_string()));
        }

        let mut json = serde_json::to_value(&self.settings).map_err(|e| {
            SettingsError::SerializationError(format!("Failed to serialize settings: {}", e))
        })?;
        let pointer = format!("/{}", key.replace('.', "/"));
        match json.pointer_mut(&pointer) {
            Some(slot) => *slot = value,
            None => {
                return Err(SettingsError::InvalidKey(format!(
                    "Key '{}' not found in settings",
                    key
                )))
            }
        }

        let new_settings: SyncSettings = serde_json::from_value(json).map_err(|e| {
            SettingsError::InvalidValue(format!("Invalid value for key '{}': {}", key, e))
        })?;

        self.settings = new_settings;
        self.save()?;

        Ok(())
    }

    /// Resets all settings to defaults and saves. The client id is kept.
    fn reset(&mut self) -> Result<(), SettingsError> {
        let client_id = self.settings.remote.client_id;
        self.settings = SyncSettings::default();
        self.settings.remote.client_id = client_id;
        self.save()?;
        Ok(())
    }

    fn get_config_path(&self) -> &str {
        &self.config_path
    }
}
