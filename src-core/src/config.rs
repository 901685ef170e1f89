use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use log::{debug, info, warn};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::clients::JobKind;
use crate::jobs::PollingSettings;
use crate::sync::lock;

const DEFAULT_BASE_URL: &str = "https://api.scribeline.app/v1";
const DEFAULT_POLLING_INTERVAL_SECONDS: u64 = 10;
/// Long media can take hours to transcribe
const DEFAULT_POLLING_TIMEOUT_SECONDS: u64 = 2 * 60 * 60;
const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 60;
const DEFAULT_NETWORK_RETRIES: u32 = 2;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write config file {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Config file {path:?} is not a JSON object")]
    Malformed { path: PathBuf },
    #[error("Failed to serialize config value '{key}': {source}")]
    Serialize {
        key: &'static str,
        source: serde_json::Error,
    },
}

/// Type-safe configuration key that associates a key name with its value type
#[derive(Debug, Clone, Copy)]
pub struct ConfigKey<T> {
    name: &'static str,
    _phantom: PhantomData<T>,
}

impl<T> ConfigKey<T> {
    const fn new(name: &'static str) -> Self {
        Self {
            name,
            _phantom: PhantomData,
        }
    }

    pub fn key_name(&self) -> &'static str {
        self.name
    }
}

// ===== Core Configuration =====

/// Settings the client core consumes (stored locally, no secrets)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CoreConfig {
    pub base_url: String,
    pub polling_interval_seconds: u64,
    pub polling_timeout_seconds: u64,
    pub request_timeout_seconds: u64,
    /// Extra attempts for idempotent calls that got no response
    pub network_retries: u32,
    /// Providers whose catalogs are fetched per job kind; empty means "ask for all"
    pub providers: BTreeMap<JobKind, Vec<String>>,
    /// Account used for the last successful login
    pub username: Option<String>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            polling_interval_seconds: DEFAULT_POLLING_INTERVAL_SECONDS,
            polling_timeout_seconds: DEFAULT_POLLING_TIMEOUT_SECONDS,
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECONDS,
            network_retries: DEFAULT_NETWORK_RETRIES,
            providers: BTreeMap::new(),
            username: None,
        }
    }
}

impl CoreConfig {
    pub fn polling_settings(&self) -> PollingSettings {
        PollingSettings::new(
            Duration::from_secs(self.polling_interval_seconds),
            Duration::from_secs(self.polling_timeout_seconds),
        )
    }

    pub fn providers_for(&self, kind: JobKind) -> &[String] {
        self.providers.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl ConfigKey<CoreConfig> {
    pub const CORE: Self = Self::new("coreConfig");
}

// ===== Type-Safe Config Store =====

pub trait ConfigStore: Send + Sync {
    fn get<T: DeserializeOwned>(&self, key: &ConfigKey<T>) -> Option<T>;
    fn set<T: Serialize>(&self, key: &ConfigKey<T>, value: T) -> Result<(), ConfigError>;
    fn delete<T>(&self, key: &ConfigKey<T>) -> Result<(), ConfigError>;
}

/// Load the core config, falling back to defaults
pub fn load_core_config(store: &impl ConfigStore) -> CoreConfig {
    store.get(&ConfigKey::CORE).unwrap_or_default()
}

pub fn save_core_config(store: &impl ConfigStore, config: &CoreConfig) -> Result<(), ConfigError> {
    store.set(&ConfigKey::CORE, config.clone())
}

/// Config store persisted as a single JSON object file
pub struct JsonFileStore {
    path: PathBuf,
    data: Mutex<Map<String, Value>>,
}

impl JsonFileStore {
    /// Open the store, starting empty if the file does not exist yet
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let data = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
            match serde_json::from_str::<Value>(&content) {
                Ok(Value::Object(map)) => map,
                Ok(_) | Err(_) => return Err(ConfigError::Malformed { path }),
            }
        } else {
            info!("No config file at {:?}, starting with defaults", path);
            Map::new()
        };

        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self, data: &Map<String, Value>) -> Result<(), ConfigError> {
        let write_error = |source| ConfigError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(write_error)?;
        }
        let content = serde_json::to_string_pretty(data).map_err(|source| ConfigError::Serialize {
            key: "<file>",
            source,
        })?;
        std::fs::write(&self.path, content).map_err(write_error)?;
        debug!("Config saved to {:?}", self.path);
        Ok(())
    }
}

impl ConfigStore for JsonFileStore {
    fn get<T: DeserializeOwned>(&self, key: &ConfigKey<T>) -> Option<T> {
        let data = lock(&self.data);
        let value = data.get(key.key_name())?.clone();
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("Ignoring unreadable config value '{}': {}", key.key_name(), e);
                None
            }
        }
    }

    fn set<T: Serialize>(&self, key: &ConfigKey<T>, value: T) -> Result<(), ConfigError> {
        let value = serde_json::to_value(value).map_err(|source| ConfigError::Serialize {
            key: key.key_name(),
            source,
        })?;
        let mut data = lock(&self.data);
        data.insert(key.key_name().to_string(), value);
        self.save(&data)
    }

    fn delete<T>(&self, key: &ConfigKey<T>) -> Result<(), ConfigError> {
        let mut data = lock(&self.data);
        data.remove(key.key_name());
        self.save(&data)
    }
}
