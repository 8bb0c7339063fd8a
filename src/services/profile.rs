use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::context::Context;
use crate::descriptor::{
    RemoteDescriptor, FIELD_EXECUTABLE_NAME, FIELD_NAME as DESCRIPTOR_FIELD_NAME,
    FIELD_SYNC_MODE as DESCRIPTOR_FIELD_SYNC_MODE,
};
use crate::error::AppError;
use crate::profile::{
    generate_profile_id, normalize_relative, OmittedPaths, Profile, SyncMode,
    FIELD_GAME_EXECUTABLE, FIELD_LOCAL_SAVE_FOLDER, FIELD_NAME, FIELD_SYNC_MODE,
};
use crate::services::guard;

/// Input for [`ProfileService::add`].
#[derive(Debug, Clone)]
pub struct NewProfile {
    pub name: String,
    pub game_executable: PathBuf,
    pub local_save_folder: PathBuf,
    pub sync_mode: SyncMode,
}

/// Input for [`ProfileService::import`].
#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub profile_id: String,
    pub game_executable: PathBuf,
    pub local_save_folder: PathBuf,
    /// Accept an executable whose file name differs from the one recorded in the cloud.
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloudStatus {
    Importable {
        name: String,
        executable_name: String,
        saves: u32,
    },
    AlreadyKnown,
    Invalid {
        reason: String,
    },
}

/// One `<cloud>/<id>/` folder found by [`ProfileService::scan_cloud`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudProfile {
    pub id: String,
    pub status: CloudStatus,
}

pub struct ProfileService;

impl ProfileService {
    /// All readable profiles, sorted by name.
    pub fn list(ctx: &Context) -> Result<Vec<Profile>, AppError> {
        let mut profiles = Vec::new();
        for id in ctx.profiles.list()? {
            match ctx.profiles.read(&id) {
                Ok(Some(profile)) => profiles.push(profile),
                Ok(None) => {}
                Err(e) => log::warn!("skipping profile {id}: {e}"),
            }
        }
        profiles.sort_by_key(|p| p.name.to_lowercase());
        Ok(profiles)
    }

    /// Look a profile up by id first, then by (unique) name.
    pub fn find(ctx: &Context, id_or_name: &str) -> Result<Profile, AppError> {
        match ctx.profiles.read(id_or_name) {
            Ok(Some(profile)) => return Ok(profile),
            Ok(None) | Err(AppError::InvalidInput(_)) => {}
            Err(e) => return Err(e),
        }
        let id = ctx.profiles.resolve_name(id_or_name)?;
        ctx.profiles.get(&id)
    }

    pub fn add(ctx: &Context, input: NewProfile) -> Result<Profile, AppError> {
        let name = validate_name(&input.name)?;
        let cloud_root = guard::require_cloud_root(ctx.settings.as_ref())?;
        let game_executable = existing_file(&input.game_executable, "game executable")?;
        let local_save_folder = existing_dir(&input.local_save_folder, "save folder")?;
        ensure_outside(&local_save_folder, &cloud_root)?;
        ensure_name_free(ctx, &name, None)?;

        let id = loop {
            let candidate = generate_profile_id();
            if !ctx.profiles.exists(&candidate)? && !cloud_root.join(&candidate).exists() {
                break candidate;
            }
        };

        let profile = Profile {
            id,
            name,
            game_executable,
            local_save_folder,
            save_slot: 1,
            sync_mode: input.sync_mode,
            omitted_paths: OmittedPaths::new(),
        };

        let slot_dir = profile.remote_slot_dir(&cloud_root);
        fs::create_dir_all(&slot_dir).map_err(|e| AppError::io(&slot_dir, e))?;
        ctx.descriptors.store(
            &profile.id,
            &RemoteDescriptor::new(&profile.name, &profile.executable_name(), profile.sync_mode),
        )?;
        ctx.profiles.save(&profile)?;

        log::info!("added profile '{}' ({})", profile.name, profile.id);
        Ok(profile)
    }

    /// Forget a profile locally. Its cloud folder is left for other machines.
    pub fn remove(ctx: &Context, profile_id: &str) -> Result<Profile, AppError> {
        let profile = ctx.profiles.get(profile_id)?;
        ctx.profiles.delete(profile_id)?;
        log::info!("removed profile '{}' ({profile_id})", profile.name);
        Ok(profile)
    }

    pub fn rename(ctx: &Context, profile_id: &str, new_name: &str) -> Result<Profile, AppError> {
        let mut profile = ctx.profiles.get(profile_id)?;
        let name = validate_name(new_name)?;
        ensure_name_free(ctx, &name, Some(profile_id))?;

        ctx.profiles
            .write(profile_id, FIELD_NAME, Value::String(name.clone()))?;
        update_descriptor(ctx, profile_id, DESCRIPTOR_FIELD_NAME, &name)?;
        profile.name = name;
        Ok(profile)
    }

    pub fn set_executable(ctx: &Context, profile_id: &str, path: &Path) -> Result<Profile, AppError> {
        let mut profile = ctx.profiles.get(profile_id)?;
        let executable = existing_file(path, "game executable")?;
        ctx.profiles.write(
            profile_id,
            FIELD_GAME_EXECUTABLE,
            Value::String(executable.to_string_lossy().into_owned()),
        )?;
        profile.game_executable = executable;
        update_descriptor(
            ctx,
            profile_id,
            FIELD_EXECUTABLE_NAME,
            &profile.executable_name(),
        )?;
        Ok(profile)
    }

    pub fn set_local_save_folder(
        ctx: &Context,
        profile_id: &str,
        path: &Path,
    ) -> Result<Profile, AppError> {
        let mut profile = ctx.profiles.get(profile_id)?;
        let folder = existing_dir(path, "save folder")?;
        if let Ok(cloud_root) = ctx.cloud_root() {
            ensure_outside(&folder, &cloud_root)?;
        }
        ctx.profiles.write(
            profile_id,
            FIELD_LOCAL_SAVE_FOLDER,
            Value::String(folder.to_string_lossy().into_owned()),
        )?;
        profile.local_save_folder = folder;
        Ok(profile)
    }

    pub fn set_sync_mode(ctx: &Context, profile_id: &str, mode: SyncMode) -> Result<Profile, AppError> {
        let mut profile = ctx.profiles.get(profile_id)?;
        ctx.profiles
            .write(profile_id, FIELD_SYNC_MODE, Value::String(mode.as_str().into()))?;
        update_descriptor(ctx, profile_id, DESCRIPTOR_FIELD_SYNC_MODE, mode.as_str())?;
        profile.sync_mode = mode;
        Ok(profile)
    }

    // ========================================================================
    // Omission list
    // ========================================================================

    /// Omit `path` from sync. Relative paths are taken relative to the save folder; absolute
    /// ones must point inside it. Returns the stored (normalized) entry.
    pub fn omit_add(ctx: &Context, profile_id: &str, path: &Path) -> Result<String, AppError> {
        let mut profile = ctx.profiles.get(profile_id)?;
        let key = relative_to_save_folder(&profile, path)?;
        if profile.omitted_paths.insert(&key) {
            ctx.profiles.save(&profile)?;
            log::info!("'{}' now omits {key}", profile.name);
        }
        Ok(key)
    }

    pub fn omit_remove(ctx: &Context, profile_id: &str, path: &Path) -> Result<bool, AppError> {
        let mut profile = ctx.profiles.get(profile_id)?;
        let key = relative_to_save_folder(&profile, path)?;
        let removed = profile.omitted_paths.remove(&key);
        if removed {
            ctx.profiles.save(&profile)?;
        }
        Ok(removed)
    }

    pub fn omit_list(ctx: &Context, profile_id: &str) -> Result<Vec<String>, AppError> {
        Ok(ctx
            .profiles
            .get(profile_id)?
            .omitted_paths
            .iter()
            .cloned()
            .collect())
    }

    // ========================================================================
    // Import from cloud storage
    // ========================================================================

    /// Classify every profile folder under the cloud root.
    pub fn scan_cloud(ctx: &Context) -> Result<Vec<CloudProfile>, AppError> {
        let cloud_root = guard::require_cloud_root(ctx.settings.as_ref())?;
        let mut ids = Vec::new();
        for entry in fs::read_dir(&cloud_root).map_err(|e| AppError::io(&cloud_root, e))? {
            let entry = entry.map_err(|e| AppError::io(&cloud_root, e))?;
            if entry.path().is_dir() {
                ids.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        ids.sort();

        Ok(ids
            .into_iter()
            .map(|id| {
                let status = classify(ctx, &id);
                CloudProfile { id, status }
            })
            .collect())
    }

    pub fn import(ctx: &Context, request: ImportRequest) -> Result<Profile, AppError> {
        let cloud_root = guard::require_cloud_root(ctx.settings.as_ref())?;
        let id = request.profile_id.trim().to_string();
        if ctx.profiles.exists(&id)? {
            return Err(AppError::InvalidInput(format!(
                "profile '{id}' is already set up on this machine"
            )));
        }
        let descriptor = ctx.descriptors.load(&id)?.ok_or_else(|| {
            AppError::InvalidInput(format!("no SaveTitan profile found in cloud folder '{id}'"))
        })?;
        let missing = descriptor.missing_required();
        if !missing.is_empty() {
            return Err(AppError::InvalidInput(format!(
                "cloud profile '{id}' is missing: {}",
                missing.join(", ")
            )));
        }

        let game_executable = existing_file(&request.game_executable, "game executable")?;
        let local_save_folder = existing_dir(&request.local_save_folder, "save folder")?;
        ensure_outside(&game_executable, &cloud_root)?;
        ensure_outside(&local_save_folder, &cloud_root)?;

        let expected = descriptor.executable_name().unwrap_or_default();
        let chosen = file_name(&game_executable);
        if !request.force && !chosen.eq_ignore_ascii_case(expected) {
            return Err(AppError::InvalidInput(format!(
                "executable '{chosen}' does not match the profile's '{expected}' (use --force to accept)"
            )));
        }

        let name = descriptor.name().unwrap_or_default().to_string();
        ensure_name_free(ctx, &name, None)?;

        let profile = Profile {
            id,
            name,
            game_executable,
            local_save_folder,
            save_slot: descriptor.save_slot(),
            sync_mode: descriptor.sync_mode(),
            omitted_paths: OmittedPaths::new(),
        };
        ctx.profiles.save(&profile)?;
        log::info!("imported profile '{}' ({})", profile.name, profile.id);
        Ok(profile)
    }
}

fn classify(ctx: &Context, id: &str) -> CloudStatus {
    match ctx.profiles.exists(id) {
        Ok(true) => return CloudStatus::AlreadyKnown,
        Ok(false) => {}
        Err(e) => return CloudStatus::Invalid { reason: e.to_string() },
    }
    match ctx.descriptors.load(id) {
        Ok(Some(descriptor)) => {
            let missing = descriptor.missing_required();
            if !missing.is_empty() {
                return CloudStatus::Invalid {
                    reason: format!("missing {}", missing.join(", ")),
                };
            }
            CloudStatus::Importable {
                name: descriptor.name().unwrap_or_default().to_string(),
                executable_name: descriptor.executable_name().unwrap_or_default().to_string(),
                saves: descriptor.saves_count(),
            }
        }
        Ok(None) => CloudStatus::Invalid {
            reason: "no profile descriptor".to_string(),
        },
        Err(e) => {
            log::warn!("skipping cloud folder {id}: {e}");
            CloudStatus::Invalid {
                reason: e.to_string(),
            }
        }
    }
}

fn validate_name(name: &str) -> Result<String, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::InvalidInput("profile name cannot be empty".into()));
    }
    Ok(name.to_string())
}

/// `DuplicateProfileName` if any profile other than `except` already uses `name`.
fn ensure_name_free(ctx: &Context, name: &str, except: Option<&str>) -> Result<(), AppError> {
    let taken = ctx
        .profiles
        .find_by_name(name)?
        .into_iter()
        .any(|id| Some(id.as_str()) != except);
    if taken {
        return Err(AppError::DuplicateProfileName(name.to_string()));
    }
    Ok(())
}

fn absolute(path: &Path) -> Result<PathBuf, AppError> {
    std::path::absolute(path).map_err(|e| AppError::io(path, e))
}

fn existing_file(path: &Path, kind: &str) -> Result<PathBuf, AppError> {
    if path.as_os_str().is_empty() || !path.is_file() {
        return Err(AppError::InvalidInput(format!(
            "{kind} does not exist: {}",
            path.display()
        )));
    }
    absolute(path)
}

fn existing_dir(path: &Path, kind: &str) -> Result<PathBuf, AppError> {
    if path.as_os_str().is_empty() || !path.is_dir() {
        return Err(AppError::InvalidInput(format!(
            "{kind} is not a folder: {}",
            path.display()
        )));
    }
    absolute(path)
}

fn ensure_outside(path: &Path, cloud_root: &Path) -> Result<(), AppError> {
    let root = absolute(cloud_root)?;
    if path.starts_with(&root) {
        return Err(AppError::InvalidInput(format!(
            "{} is inside cloud storage; pick a local path",
            path.display()
        )));
    }
    Ok(())
}

fn relative_to_save_folder(profile: &Profile, path: &Path) -> Result<String, AppError> {
    let relative = if path.is_absolute() {
        let folder = absolute(&profile.local_save_folder)?;
        path.strip_prefix(&folder)
            .map_err(|_| {
                AppError::InvalidInput(format!(
                    "{} is not inside the save folder {}",
                    path.display(),
                    folder.display()
                ))
            })?
            .to_path_buf()
    } else {
        path.to_path_buf()
    };
    normalize_relative(&relative).ok_or_else(|| {
        AppError::InvalidInput(format!(
            "{} does not name anything inside the save folder",
            path.display()
        ))
    })
}

fn update_descriptor(ctx: &Context, profile_id: &str, field: &str, value: &str) -> Result<(), AppError> {
    if ctx.cloud_root().is_err() {
        return Ok(());
    }
    if let Some(mut descriptor) = ctx.descriptors.load(profile_id)? {
        descriptor.set(field, value);
        ctx.descriptors.store(profile_id, &descriptor)?;
    }
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
