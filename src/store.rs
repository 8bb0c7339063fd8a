use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::config::{get_profiles_dir, read_json_file, write_json_file};
use crate::error::AppError;
use crate::profile::{Profile, FIELD_NAME};

/// Profile metadata persistence. String-keyed fields stop here; callers get a typed [`Profile`].
pub trait ProfileStore: Send + Sync {
    fn list(&self) -> Result<Vec<String>, AppError>;
    fn read_fields(&self, profile_id: &str) -> Result<Option<Map<String, Value>>, AppError>;
    fn write(&self, profile_id: &str, field: &str, value: Value) -> Result<(), AppError>;
    fn delete(&self, profile_id: &str) -> Result<(), AppError>;

    fn read(&self, profile_id: &str) -> Result<Option<Profile>, AppError> {
        match self.read_fields(profile_id)? {
            Some(fields) => Profile::from_fields(profile_id, &fields).map(Some),
            None => Ok(None),
        }
    }

    /// Like [`read`](Self::read) but a missing profile is an error.
    fn get(&self, profile_id: &str) -> Result<Profile, AppError> {
        self.read(profile_id)?
            .ok_or_else(|| AppError::ProfileNotFound(profile_id.to_string()))
    }

    fn read_field(&self, profile_id: &str, field: &str) -> Result<Option<Value>, AppError> {
        Ok(self
            .read_fields(profile_id)?
            .and_then(|mut fields| fields.remove(field)))
    }

    fn exists(&self, profile_id: &str) -> Result<bool, AppError> {
        Ok(self.read_fields(profile_id)?.is_some())
    }

    /// Every id whose name matches case-insensitively. More than one entry means a collision.
    fn find_by_name(&self, name: &str) -> Result<Vec<String>, AppError> {
        let wanted = name.trim().to_lowercase();
        let mut matches = Vec::new();
        for id in self.list()? {
            let fields = match self.read_fields(&id) {
                Ok(Some(fields)) => fields,
                Ok(None) => continue,
                Err(e) => {
                    log::warn!("skipping unreadable profile {id}: {e}");
                    continue;
                }
            };
            let matched = fields
                .get(FIELD_NAME)
                .and_then(Value::as_str)
                .is_some_and(|n| n.trim().to_lowercase() == wanted);
            if matched {
                matches.push(id);
            }
        }
        Ok(matches)
    }

    /// Resolve a display name to exactly one id.
    fn resolve_name(&self, name: &str) -> Result<String, AppError> {
        let mut ids = self.find_by_name(name)?;
        match ids.len() {
            0 => Err(AppError::ProfileNotFound(name.to_string())),
            1 => Ok(ids.remove(0)),
            _ => Err(AppError::DuplicateProfileName(name.to_string())),
        }
    }

    fn save(&self, profile: &Profile) -> Result<(), AppError> {
        for (field, value) in profile.to_fields() {
            self.write(&profile.id, &field, value)?;
        }
        Ok(())
    }
}

// ============================================================================
// profiles/<id>.json
// ============================================================================

pub struct FileProfileStore {
    dir: PathBuf,
    lock: RwLock<()>,
}

impl FileProfileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: RwLock::new(()),
        }
    }

    pub fn open_default() -> Self {
        Self::new(get_profiles_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn profile_path(&self, profile_id: &str) -> Result<PathBuf, AppError> {
        let valid = !profile_id.is_empty()
            && profile_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(AppError::InvalidInput(format!(
                "invalid profile id: '{profile_id}'"
            )));
        }
        Ok(self.dir.join(format!("{profile_id}.json")))
    }

    fn load_map(path: &Path) -> Result<Option<Map<String, Value>>, AppError> {
        if !path.exists() {
            return Ok(None);
        }
        match read_json_file::<Value>(path)? {
            Value::Object(map) => Ok(Some(map)),
            _ => Err(AppError::Message(format!(
                "profile file {} is not a JSON object",
                path.display()
            ))),
        }
    }
}

impl ProfileStore for FileProfileStore {
    fn list(&self) -> Result<Vec<String>, AppError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(|e| AppError::io(&self.dir, e))? {
            let entry = entry.map_err(|e| AppError::io(&self.dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn read_fields(&self, profile_id: &str) -> Result<Option<Map<String, Value>>, AppError> {
        let path = self.profile_path(profile_id)?;
        let _guard = self
            .lock
            .read()
            .map_err(|_| AppError::Message("profile store lock poisoned".to_string()))?;
        Self::load_map(&path)
    }

    fn write(&self, profile_id: &str, field: &str, value: Value) -> Result<(), AppError> {
        let path = self.profile_path(profile_id)?;
        let _guard = self
            .lock
            .write()
            .map_err(|_| AppError::Message("profile store lock poisoned".to_string()))?;
        let mut map = Self::load_map(&path)?.unwrap_or_default();
        map.insert(field.to_string(), value);
        write_json_file(&path, &map)
    }

    fn delete(&self, profile_id: &str) -> Result<(), AppError> {
        let path = self.profile_path(profile_id)?;
        let _guard = self
            .lock
            .write()
            .map_err(|_| AppError::Message("profile store lock poisoned".to_string()))?;
        if !path.exists() {
            return Err(AppError::ProfileNotFound(profile_id.to_string()));
        }
        fs::remove_file(&path).map_err(|e| AppError::io(&path, e))
    }
}
