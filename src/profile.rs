use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use crate::error::AppError;

pub const FIELD_NAME: &str = "name";
pub const FIELD_GAME_EXECUTABLE: &str = "game_executable";
pub const FIELD_LOCAL_SAVE_FOLDER: &str = "local_save_folder";
pub const FIELD_SAVE_SLOT: &str = "save_slot";
pub const FIELD_SAVES: &str = "saves";
pub const FIELD_SYNC_MODE: &str = "sync_mode";
pub const FIELD_OMITTED: &str = "omitted";

const PROFILE_ID_LEN: usize = 6;
const PROFILE_ID_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Whether launching a profile goes through the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
pub enum SyncMode {
    #[default]
    Sync,
    /// Launch without any synchronization.
    None,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Sync => "Sync",
            SyncMode::None => "None",
        }
    }

    /// Anything other than `Sync` (including the empty string older stores wrote) means no sync.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("sync") {
            SyncMode::Sync
        } else {
            SyncMode::None
        }
    }
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Omission list
// ============================================================================

/// Relative paths excluded from comparison and sync. An entry also covers everything below it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OmittedPaths(BTreeSet<String>);

impl OmittedPaths {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, relative: impl AsRef<Path>) -> bool {
        match normalize_relative(relative.as_ref()) {
            Some(key) => self.0.insert(key),
            None => false,
        }
    }

    pub fn remove(&mut self, relative: impl AsRef<Path>) -> bool {
        match normalize_relative(relative.as_ref()) {
            Some(key) => self.0.remove(&key),
            None => false,
        }
    }

    pub fn contains(&self, relative: &Path) -> bool {
        let Some(key) = normalize_relative(relative) else {
            return false;
        };
        self.0.iter().any(|entry| {
            key == *entry
                || key
                    .strip_prefix(entry.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }
}

impl<S: AsRef<Path>> FromIterator<S> for OmittedPaths {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = OmittedPaths::new();
        for item in iter {
            set.insert(item);
        }
        set
    }
}

/// Forward-slash form of a relative path; `None` for empty, absolute, or `..`-escaping paths.
pub fn normalize_relative(path: &Path) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

// ============================================================================
// Profile
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub game_executable: PathBuf,
    pub local_save_folder: PathBuf,
    /// Active save slot, 1-based.
    pub save_slot: u32,
    pub sync_mode: SyncMode,
    pub omitted_paths: OmittedPaths,
}

impl Profile {
    /// `save<N>` key of the active slot.
    pub fn slot_key(&self) -> String {
        slot_key(self.save_slot)
    }

    /// `<cloud_root>/<id>`
    pub fn remote_dir(&self, cloud_root: &Path) -> PathBuf {
        cloud_root.join(&self.id)
    }

    /// `<cloud_root>/<id>/save<N>` for the active slot.
    pub fn remote_slot_dir(&self, cloud_root: &Path) -> PathBuf {
        self.remote_dir(cloud_root).join(self.slot_key())
    }

    /// `<cloud_root>/<id>/save<N>.bak`
    pub fn remote_backup_dir(&self, cloud_root: &Path) -> PathBuf {
        self.remote_dir(cloud_root)
            .join(format!("{}.bak", self.slot_key()))
    }

    /// File name of the game executable, as recorded in the remote descriptor.
    pub fn executable_name(&self) -> String {
        self.game_executable
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Build a validated profile from the raw stored fields.
    pub fn from_fields(id: &str, fields: &Map<String, Value>) -> Result<Self, AppError> {
        let text = |field: &str| -> Option<String> {
            match fields.get(field)? {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            }
        };
        let required = |field: &str| -> Result<String, AppError> {
            text(field)
                .filter(|s| !s.trim().is_empty())
                .ok_or_else(|| {
                    AppError::InvalidInput(format!("profile '{id}' is missing field '{field}'"))
                })
        };

        let save_slot = parse_slot_number(&text(FIELD_SAVE_SLOT).unwrap_or_else(|| "1".into()))
            .ok_or_else(|| {
                AppError::InvalidInput(format!("profile '{id}' has an invalid save_slot"))
            })?;

        let omitted_paths: OmittedPaths = match fields.get(FIELD_OMITTED) {
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
            // Older stores kept a comma separated string.
            Some(Value::String(s)) => s.split(',').filter(|p| !p.trim().is_empty()).collect(),
            _ => OmittedPaths::new(),
        };

        Ok(Self {
            id: id.to_string(),
            name: required(FIELD_NAME)?,
            game_executable: PathBuf::from(required(FIELD_GAME_EXECUTABLE)?),
            local_save_folder: PathBuf::from(required(FIELD_LOCAL_SAVE_FOLDER)?),
            save_slot,
            sync_mode: SyncMode::parse(&text(FIELD_SYNC_MODE).unwrap_or_default()),
            omitted_paths,
        })
    }

    pub fn to_fields(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert(FIELD_NAME.into(), Value::String(self.name.clone()));
        map.insert(
            FIELD_GAME_EXECUTABLE.into(),
            Value::String(self.game_executable.to_string_lossy().into_owned()),
        );
        map.insert(
            FIELD_LOCAL_SAVE_FOLDER.into(),
            Value::String(self.local_save_folder.to_string_lossy().into_owned()),
        );
        map.insert(FIELD_SAVE_SLOT.into(), Value::String(self.save_slot.to_string()));
        map.insert(
            FIELD_SYNC_MODE.into(),
            Value::String(self.sync_mode.as_str().to_string()),
        );
        map.insert(
            FIELD_OMITTED.into(),
            Value::Array(
                self.omitted_paths
                    .iter()
                    .map(|p| Value::String(p.clone()))
                    .collect(),
            ),
        );
        map
    }
}

pub fn slot_key(slot: u32) -> String {
    format!("save{slot}")
}

/// Accepts `3` or `save3`; slots are positive.
pub fn parse_slot_number(value: &str) -> Option<u32> {
    let trimmed = value.trim();
    let digits = trimmed.strip_prefix("save").unwrap_or(trimmed);
    digits.parse::<u32>().ok().filter(|n| *n > 0)
}

/// Random 6-character `[a-z0-9]` id. Callers check uniqueness against the store.
pub fn generate_profile_id() -> String {
    let mut rng = rand::rng();
    (0..PROFILE_ID_LEN)
        .map(|_| {
            let idx = rng.random_range(0..PROFILE_ID_CHARSET.len());
            char::from(PROFILE_ID_CHARSET[idx])
        })
        .collect()
}
