use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::RwLock;

use crate::config::{get_settings_path, read_json_file, write_json_file};
use crate::error::AppError;

pub const FIELD_CLOUD_STORAGE_PATH: &str = "cloud_storage_path";
pub const FIELD_DEBUG: &str = "debug";
pub const FIELD_RISK_ACKNOWLEDGED: &str = "risk_acknowledged";
pub const FIELD_SYNC_RETRY_LIMIT: &str = "sync_retry_limit";
pub const FIELD_GAME_OVERRIDES: &str = "game_overrides";

const DEFAULT_SYNC_RETRY_LIMIT: u32 = 3;

/// Global key/value settings. String-keyed only at this boundary.
pub trait GlobalSettingsStore: Send + Sync {
    fn read(&self, field: &str) -> Result<Option<Value>, AppError>;
    fn write(&self, field: &str, value: Value) -> Result<(), AppError>;

    /// Typed snapshot of every known field.
    fn load(&self) -> Result<GlobalSettings, AppError> {
        let mut map = Map::new();
        for field in [
            FIELD_CLOUD_STORAGE_PATH,
            FIELD_DEBUG,
            FIELD_RISK_ACKNOWLEDGED,
            FIELD_SYNC_RETRY_LIMIT,
            FIELD_GAME_OVERRIDES,
        ] {
            if let Some(value) = self.read(field)? {
                map.insert(field.to_string(), value);
            }
        }
        serde_json::from_value(Value::Object(map)).map_err(AppError::from)
    }
}

/// Per-executable process tracking overrides.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameOverride {
    /// Extra process names the game re-spawns itself under (launchers, anti-cheat wrappers).
    #[serde(default)]
    pub process_names: Vec<String>,
    #[serde(default = "default_true")]
    pub process_tracking: bool,
}

impl Default for GameOverride {
    fn default() -> Self {
        Self {
            process_names: Vec::new(),
            process_tracking: true,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GlobalSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_storage_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_acknowledged: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_retry_limit: Option<u32>,
    /// executable file name (lowercased) -> override
    #[serde(default)]
    pub game_overrides: BTreeMap<String, GameOverride>,
}

impl GlobalSettings {
    /// The configured remote root. Unset or blank is a configuration error.
    pub fn cloud_root(&self) -> Result<PathBuf, AppError> {
        match self.cloud_storage_path.as_deref().map(str::trim) {
            Some(path) if !path.is_empty() => Ok(PathBuf::from(path)),
            _ => Err(AppError::Config(
                "cloud storage path is not configured; run `savetitan config set-cloud-path <path>`"
                    .to_string(),
            )),
        }
    }

    pub fn debug_enabled(&self) -> bool {
        self.debug.as_deref() == Some("enable")
    }

    pub fn sync_retry_limit(&self) -> u32 {
        self.sync_retry_limit.unwrap_or(DEFAULT_SYNC_RETRY_LIMIT)
    }

    pub fn game_override(&self, executable_name: &str) -> GameOverride {
        self.game_overrides
            .get(&executable_name.to_lowercase())
            .cloned()
            .unwrap_or_default()
    }
}

// ============================================================================
// settings.json
// ============================================================================

pub struct FileSettingsStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: RwLock<()>,
}

impl FileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: RwLock::new(()),
        }
    }

    /// Store at the default location under the app config dir.
    pub fn open_default() -> Self {
        Self::new(get_settings_path())
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn read_all(&self) -> Result<Map<String, Value>, AppError> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        match read_json_file::<Value>(&self.path)? {
            Value::Object(map) => Ok(map),
            _ => Err(AppError::Message(format!(
                "settings file {} is not a JSON object",
                self.path.display()
            ))),
        }
    }
}

impl GlobalSettingsStore for FileSettingsStore {
    fn read(&self, field: &str) -> Result<Option<Value>, AppError> {
        let _guard = self
            .lock
            .read()
            .map_err(|_| AppError::Message("settings lock poisoned".to_string()))?;
        Ok(self.read_all()?.remove(field).filter(|v| !v.is_null()))
    }

    fn write(&self, field: &str, value: Value) -> Result<(), AppError> {
        let _guard = self
            .lock
            .write()
            .map_err(|_| AppError::Message("settings lock poisoned".to_string()))?;
        let mut map = self.read_all()?;
        map.insert(field.to_string(), value);
        write_json_file(&self.path, &map)
    }
}
