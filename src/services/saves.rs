use std::fs;

use serde_json::Value;

use crate::context::Context;
use crate::descriptor::{RemoteDescriptor, FIELD_SAVES, FIELD_SAVE_SLOT};
use crate::error::AppError;
use crate::profile::{parse_slot_number, slot_key, Profile, FIELD_SAVE_SLOT as PROFILE_FIELD_SAVE_SLOT};
use crate::services::guard;
use crate::services::orchestrator::InProgressGuard;
use crate::services::sync::{SyncReport, SyncService};
use crate::sync_policy::{RetryHandler, RetryPolicy};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveSlot {
    pub number: u32,
    pub key: String,
    pub name: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub uploaded: Option<SyncReport>,
    pub downloaded: SyncReport,
}

/// Named save snapshots kept side by side in the cloud. Only the active one syncs.
pub struct SaveSlotService;

impl SaveSlotService {
    pub fn list(ctx: &Context, profile_id: &str) -> Result<Vec<SaveSlot>, AppError> {
        let profile = ctx.profiles.get(profile_id)?;
        let descriptor = load_descriptor(ctx, &profile)?;
        let mut slots: Vec<SaveSlot> = descriptor
            .saves
            .iter()
            .filter_map(|(key, name)| {
                let number = parse_slot_number(key)?;
                Some(SaveSlot {
                    number,
                    key: slot_key(number),
                    name: name.clone(),
                    active: number == profile.save_slot,
                })
            })
            .collect();
        slots.sort_by_key(|s| s.number);
        Ok(slots)
    }

    /// New empty slot named `Save N`. Slot numbers are never reused.
    pub fn create(ctx: &Context, profile_id: &str) -> Result<SaveSlot, AppError> {
        let profile = ctx.profiles.get(profile_id)?;
        let cloud_root = guard::require_cloud_root(ctx.settings.as_ref())?;
        let mut descriptor = load_descriptor(ctx, &profile)?;

        let mut number = descriptor.saves_count() + 1;
        while descriptor.saves.contains_key(&slot_key(number)) {
            number += 1;
        }
        let key = slot_key(number);
        let name = format!("Save {number}");

        let dir = profile.remote_dir(&cloud_root).join(&key);
        fs::create_dir_all(&dir).map_err(|e| AppError::io(&dir, e))?;
        descriptor.set(FIELD_SAVES, &number.to_string());
        descriptor.saves.insert(key.clone(), name.clone());
        ctx.descriptors.store(&profile.id, &descriptor)?;

        log::info!("created {key} for '{}'", profile.name);
        Ok(SaveSlot {
            number,
            key,
            name,
            active: false,
        })
    }

    /// Make `slot` the active slot and pull it into the local save folder. With
    /// `upload_current_first` the current slot is pushed before switching. Loading the slot
    /// that is already active does nothing and returns `None`. A failed pull leaves the old
    /// slot active.
    pub fn load(
        ctx: &Context,
        profile_id: &str,
        slot: u32,
        upload_current_first: bool,
        handler: &dyn RetryHandler,
    ) -> Result<Option<LoadReport>, AppError> {
        let _guard = InProgressGuard::acquire(profile_id)?;
        let mut profile = ctx.profiles.get(profile_id)?;
        if slot == profile.save_slot {
            return Ok(None);
        }
        let cloud_root = guard::require_cloud_root(ctx.settings.as_ref())?;
        let mut descriptor = load_descriptor(ctx, &profile)?;
        if !descriptor.saves.contains_key(&slot_key(slot)) {
            return Err(AppError::InvalidInput(format!(
                "'{}' has no save slot {slot}",
                profile.name
            )));
        }
        let policy = RetryPolicy::new(ctx.settings.load()?.sync_retry_limit());

        let uploaded = if upload_current_first {
            Some(SyncService::sync_to_cloud(&profile, &cloud_root, &policy, handler)?)
        } else {
            None
        };

        // The switch is only recorded once the new slot is actually on disk locally.
        profile.save_slot = slot;
        let slot_dir = profile.remote_slot_dir(&cloud_root);
        fs::create_dir_all(&slot_dir).map_err(|e| AppError::io(&slot_dir, e))?;
        let downloaded = SyncService::sync_to_local(&profile, &cloud_root, &policy, handler)?;

        ctx.profiles.write(
            profile_id,
            PROFILE_FIELD_SAVE_SLOT,
            Value::String(slot.to_string()),
        )?;
        descriptor.set(FIELD_SAVE_SLOT, &slot.to_string());
        ctx.descriptors.store(profile_id, &descriptor)?;

        log::info!("loaded {} for '{}'", profile.slot_key(), profile.name);
        Ok(Some(LoadReport {
            uploaded,
            downloaded,
        }))
    }

    pub fn rename(
        ctx: &Context,
        profile_id: &str,
        slot: u32,
        new_name: &str,
    ) -> Result<SaveSlot, AppError> {
        let profile = ctx.profiles.get(profile_id)?;
        let mut descriptor = load_descriptor(ctx, &profile)?;
        let key = slot_key(slot);
        let name = new_name.trim();
        if name.is_empty() {
            return Err(AppError::InvalidInput("save name cannot be empty".into()));
        }
        if !descriptor.saves.contains_key(&key) {
            return Err(AppError::InvalidInput(format!(
                "'{}' has no save slot {slot}",
                profile.name
            )));
        }
        let lowered = name.to_lowercase();
        if descriptor
            .saves
            .iter()
            .any(|(k, existing)| *k != key && existing.to_lowercase() == lowered)
        {
            return Err(AppError::InvalidInput(format!(
                "a save named '{name}' already exists"
            )));
        }

        descriptor.saves.insert(key.clone(), name.to_string());
        ctx.descriptors.store(&profile.id, &descriptor)?;
        Ok(SaveSlot {
            number: slot,
            key,
            name: name.to_string(),
            active: slot == profile.save_slot,
        })
    }

    /// Remove a slot and its cloud folder. The active slot cannot be deleted.
    pub fn delete(ctx: &Context, profile_id: &str, slot: u32) -> Result<(), AppError> {
        let profile = ctx.profiles.get(profile_id)?;
        if slot == profile.save_slot {
            return Err(AppError::InvalidInput(
                "cannot delete the save that is currently loaded".into(),
            ));
        }
        let cloud_root = guard::require_cloud_root(ctx.settings.as_ref())?;
        let mut descriptor = load_descriptor(ctx, &profile)?;
        let key = slot_key(slot);
        if descriptor.saves.shift_remove(&key).is_none() {
            return Err(AppError::InvalidInput(format!(
                "'{}' has no save slot {slot}",
                profile.name
            )));
        }
        ctx.descriptors.store(&profile.id, &descriptor)?;

        let dir = profile.remote_dir(&cloud_root).join(&key);
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(|e| AppError::io(&dir, e))?;
        }
        log::info!("deleted {key} of '{}'", profile.name);
        Ok(())
    }
}

fn load_descriptor(ctx: &Context, profile: &Profile) -> Result<RemoteDescriptor, AppError> {
    ctx.descriptors.load(&profile.id)?.ok_or_else(|| {
        AppError::Config(format!(
            "cloud descriptor for '{}' ({}) is missing",
            profile.name, profile.id
        ))
    })
}
