//! Remote profile descriptor: `<cloud_root>/<profile_id>/profile_info.savetitan`.
//!
//! Mirrors part of the local profile so other machines can import it, and carries the
//! `checkout` field used by the cross-host lock.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::write_text_file_atomic;
use crate::error::AppError;
use crate::profile::{slot_key, SyncMode};

pub const DESCRIPTOR_FILE_NAME: &str = "profile_info.savetitan";

pub const FIELD_NAME: &str = "name";
pub const FIELD_EXECUTABLE_NAME: &str = "executable_name";
pub const FIELD_SAVES: &str = "saves";
pub const FIELD_SAVE_SLOT: &str = "save_slot";
pub const FIELD_SYNC_MODE: &str = "sync_mode";
pub const FIELD_CHECKOUT: &str = "checkout";

/// Fields a descriptor must carry to be importable.
pub const REQUIRED_FIELDS: [&str; 4] = [FIELD_NAME, FIELD_SAVES, FIELD_EXECUTABLE_NAME, FIELD_CHECKOUT];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteDescriptor {
    #[serde(default)]
    pub profile: IndexMap<String, String>,
    /// `save<N>` -> display name
    #[serde(default)]
    pub saves: IndexMap<String, String>,
}

impl RemoteDescriptor {
    /// Descriptor for a freshly created profile: one slot, no checkout.
    pub fn new(name: &str, executable_name: &str, sync_mode: SyncMode) -> Self {
        let mut descriptor = Self::default();
        descriptor.set(FIELD_NAME, name);
        descriptor.set(FIELD_SAVE_SLOT, "1");
        descriptor.set(FIELD_SAVES, "1");
        descriptor.set(FIELD_SYNC_MODE, sync_mode.as_str());
        descriptor.set(FIELD_EXECUTABLE_NAME, executable_name);
        descriptor.set(FIELD_CHECKOUT, "");
        descriptor.saves.insert(slot_key(1), "Save 1".to_string());
        descriptor
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.profile.get(field).map(String::as_str)
    }

    pub fn set(&mut self, field: &str, value: &str) {
        self.profile.insert(field.to_string(), value.to_string());
    }

    pub fn remove(&mut self, field: &str) -> bool {
        self.profile.shift_remove(field).is_some()
    }

    pub fn name(&self) -> Option<&str> {
        self.get(FIELD_NAME)
    }

    pub fn executable_name(&self) -> Option<&str> {
        self.get(FIELD_EXECUTABLE_NAME)
    }

    /// Current lock holder; an empty field means unlocked.
    pub fn checkout(&self) -> Option<&str> {
        self.get(FIELD_CHECKOUT)
            .map(str::trim)
            .filter(|h| !h.is_empty())
    }

    pub fn saves_count(&self) -> u32 {
        self.get(FIELD_SAVES)
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(1)
    }

    pub fn save_slot(&self) -> u32 {
        self.get(FIELD_SAVE_SLOT)
            .and_then(|s| s.trim().parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(1)
    }

    pub fn sync_mode(&self) -> SyncMode {
        SyncMode::parse(self.get(FIELD_SYNC_MODE).unwrap_or_default())
    }

    pub fn missing_required(&self) -> Vec<&'static str> {
        REQUIRED_FIELDS
            .into_iter()
            .filter(|field| !self.profile.contains_key(*field))
            .collect()
    }
}

/// Persistence of the remote descriptor for each profile.
pub trait DescriptorStore: Send + Sync {
    fn load(&self, profile_id: &str) -> Result<Option<RemoteDescriptor>, AppError>;
    fn store(&self, profile_id: &str, descriptor: &RemoteDescriptor) -> Result<(), AppError>;

    fn read(&self, profile_id: &str, field: &str) -> Result<Option<String>, AppError> {
        Ok(self
            .load(profile_id)?
            .and_then(|d| d.get(field).map(str::to_string)))
    }

    fn write(&self, profile_id: &str, field: &str, value: &str) -> Result<(), AppError> {
        let mut descriptor = self.load(profile_id)?.unwrap_or_default();
        descriptor.set(field, value);
        self.store(profile_id, &descriptor)
    }

    /// Returns whether the field existed.
    fn delete(&self, profile_id: &str, field: &str) -> Result<bool, AppError> {
        let Some(mut descriptor) = self.load(profile_id)? else {
            return Ok(false);
        };
        let removed = descriptor.remove(field);
        if removed {
            self.store(profile_id, &descriptor)?;
        }
        Ok(removed)
    }
}

// ============================================================================
// TOML file under the cloud root
// ============================================================================

pub struct FileDescriptorStore {
    cloud_root: PathBuf,
}

impl FileDescriptorStore {
    pub fn new(cloud_root: impl Into<PathBuf>) -> Self {
        Self {
            cloud_root: cloud_root.into(),
        }
    }

    pub fn cloud_root(&self) -> &Path {
        &self.cloud_root
    }

    pub fn descriptor_path(&self, profile_id: &str) -> PathBuf {
        self.cloud_root.join(profile_id).join(DESCRIPTOR_FILE_NAME)
    }

    pub fn parse(path: &Path, content: &str) -> Result<RemoteDescriptor, AppError> {
        toml::from_str(content).map_err(|e| AppError::toml(path, e.to_string()))
    }
}

impl DescriptorStore for FileDescriptorStore {
    fn load(&self, profile_id: &str) -> Result<Option<RemoteDescriptor>, AppError> {
        let path = self.descriptor_path(profile_id);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).map_err(|e| AppError::io(&path, e))?;
        Self::parse(&path, &content).map(Some)
    }

    fn store(&self, profile_id: &str, descriptor: &RemoteDescriptor) -> Result<(), AppError> {
        let path = self.descriptor_path(profile_id);
        let content =
            toml::to_string_pretty(descriptor).map_err(|e| AppError::toml(&path, e.to_string()))?;
        write_text_file_atomic(&path, &content)
    }
}
