use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::AppError;

/// Overrides the config directory (portable installs, tests).
pub const CONFIG_DIR_ENV: &str = "SAVETITAN_CONFIG_DIR";

const APP_DIR_NAME: &str = ".savetitan";

/// `~/.savetitan`, or `$SAVETITAN_CONFIG_DIR` when set.
pub fn get_app_config_dir() -> PathBuf {
    if let Some(custom) = std::env::var_os(CONFIG_DIR_ENV) {
        if !custom.is_empty() {
            return PathBuf::from(custom);
        }
    }

    dirs::home_dir()
        .map(|home| home.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(APP_DIR_NAME))
}

pub fn get_settings_path() -> PathBuf {
    get_app_config_dir().join("settings.json")
}

pub fn get_profiles_dir() -> PathBuf {
    get_app_config_dir().join("profiles")
}

pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T, AppError> {
    let content = fs::read_to_string(path).map_err(|e| AppError::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| AppError::json(path, e))
}

pub fn write_json_file<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), AppError> {
    let content = serde_json::to_string_pretty(value)?;
    write_text_file_atomic(path, &content)
}

/// Write through a temp file in the target directory, then rename over the target.
pub fn write_text_file_atomic(path: &Path, content: &str) -> Result<(), AppError> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|e| AppError::io(parent, e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| AppError::io(parent, e))?;
    tmp.write_all(content.as_bytes())
        .map_err(|e| AppError::io(tmp.path(), e))?;
    tmp.flush().map_err(|e| AppError::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| AppError::IoContext {
        context: format!("failed to replace {}", path.display()),
        source: e.error,
    })?;
    Ok(())
}

/// Hostname written into the checkout field.
pub fn current_hostname() -> String {
    sysinfo::System::host_name()
        .filter(|h| !h.trim().is_empty())
        .unwrap_or_else(|| "unknown-host".to_string())
}
