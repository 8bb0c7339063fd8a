use std::collections::BTreeMap;

use crate::error::AppError;
use crate::settings::{GameOverride, GlobalSettingsStore, FIELD_GAME_OVERRIDES};

/// Per-game process tracking tweaks, keyed by lowercased executable file name.
pub struct OverrideService;

impl OverrideService {
    pub fn list(settings: &dyn GlobalSettingsStore) -> Result<BTreeMap<String, GameOverride>, AppError> {
        Ok(settings.load()?.game_overrides)
    }

    /// Also wait on `process_name` before pushing after `executable` exits.
    pub fn add_process(
        settings: &dyn GlobalSettingsStore,
        executable: &str,
        process_name: &str,
    ) -> Result<GameOverride, AppError> {
        let key = key(executable)?;
        let process_name = process_name.trim();
        if process_name.is_empty() {
            return Err(AppError::InvalidInput("process name cannot be empty".into()));
        }
        let mut overrides = Self::list(settings)?;
        let entry = overrides.entry(key).or_default();
        if !entry
            .process_names
            .iter()
            .any(|p| p.eq_ignore_ascii_case(process_name))
        {
            entry.process_names.push(process_name.to_string());
        }
        let updated = entry.clone();
        save(settings, &overrides)?;
        Ok(updated)
    }

    pub fn remove_process(
        settings: &dyn GlobalSettingsStore,
        executable: &str,
        process_name: &str,
    ) -> Result<bool, AppError> {
        let key = key(executable)?;
        let mut overrides = Self::list(settings)?;
        let Some(entry) = overrides.get_mut(&key) else {
            return Ok(false);
        };
        let before = entry.process_names.len();
        entry
            .process_names
            .retain(|p| !p.eq_ignore_ascii_case(process_name.trim()));
        let removed = entry.process_names.len() != before;
        if removed {
            save(settings, &overrides)?;
        }
        Ok(removed)
    }

    /// Drop every override for `executable`.
    pub fn remove(settings: &dyn GlobalSettingsStore, executable: &str) -> Result<bool, AppError> {
        let key = key(executable)?;
        let mut overrides = Self::list(settings)?;
        let removed = overrides.remove(&key).is_some();
        if removed {
            save(settings, &overrides)?;
        }
        Ok(removed)
    }

    /// With tracking off the user is asked when the game is done instead of polling.
    pub fn set_tracking(
        settings: &dyn GlobalSettingsStore,
        executable: &str,
        enabled: bool,
    ) -> Result<GameOverride, AppError> {
        let key = key(executable)?;
        let mut overrides = Self::list(settings)?;
        let entry = overrides.entry(key).or_default();
        entry.process_tracking = enabled;
        let updated = entry.clone();
        save(settings, &overrides)?;
        Ok(updated)
    }
}

fn key(executable: &str) -> Result<String, AppError> {
    let key = executable.trim().to_lowercase();
    if key.is_empty() {
        return Err(AppError::InvalidInput("executable name cannot be empty".into()));
    }
    Ok(key)
}

fn save(
    settings: &dyn GlobalSettingsStore,
    overrides: &BTreeMap<String, GameOverride>,
) -> Result<(), AppError> {
    settings.write(FIELD_GAME_OVERRIDES, serde_json::to_value(overrides)?)
}
