use clap::Subcommand;
use inquire::Confirm;
use std::path::PathBuf;

use crate::cli::ui::{create_table, error, highlight, info, success, warning};
use crate::context::Context;
use crate::error::AppError;
use crate::profile::SyncMode;
use crate::services::checkout::CheckoutService;
use crate::services::{CloudStatus, ImportRequest, NewProfile, ProfileService};

#[derive(Subcommand)]
pub enum ProfileCommand {
    /// List all profiles
    List,
    /// Show one profile in detail
    Show { profile: String },
    /// Add a new profile
    Add {
        /// Display name, unique across profiles
        #[arg(long)]
        name: String,
        /// Path to the game executable
        #[arg(long)]
        exe: PathBuf,
        /// Folder the game writes its saves to
        #[arg(long = "save-folder")]
        save_folder: PathBuf,
        #[arg(long, value_enum, default_value_t = SyncMode::Sync)]
        sync_mode: SyncMode,
    },
    /// Remove a profile from this machine (cloud data is kept)
    Remove {
        profile: String,
        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Rename a profile
    Rename { profile: String, new_name: String },
    /// Point a profile at a different game executable
    SetExe { profile: String, path: PathBuf },
    /// Point a profile at a different local save folder
    SetSaveFolder { profile: String, path: PathBuf },
    /// Turn syncing on or off for a profile
    SetSyncMode {
        profile: String,
        #[arg(value_enum)]
        mode: SyncMode,
    },
}

#[derive(Subcommand)]
pub enum OmitCommand {
    /// List omitted paths
    List { profile: String },
    /// Exclude a path (relative to the save folder, or absolute inside it)
    Add { profile: String, path: PathBuf },
    /// Include a previously omitted path again
    Remove { profile: String, path: PathBuf },
}

#[derive(Subcommand)]
pub enum ImportCommand {
    /// Show profile folders found in cloud storage
    Scan,
    /// Set up a cloud profile on this machine
    Add {
        /// Cloud folder name (profile id)
        id: String,
        #[arg(long)]
        exe: PathBuf,
        #[arg(long = "save-folder")]
        save_folder: PathBuf,
        /// Accept an executable whose name differs from the recorded one
        #[arg(long)]
        force: bool,
    },
}

pub fn execute(cmd: ProfileCommand) -> Result<(), AppError> {
    match cmd {
        ProfileCommand::List => list_profiles(),
        ProfileCommand::Show { profile } => show_profile(&profile),
        ProfileCommand::Add {
            name,
            exe,
            save_folder,
            sync_mode,
        } => add_profile(NewProfile {
            name,
            game_executable: exe,
            local_save_folder: save_folder,
            sync_mode,
        }),
        ProfileCommand::Remove { profile, yes } => remove_profile(&profile, yes),
        ProfileCommand::Rename { profile, new_name } => {
            let ctx = Context::load_default()?;
            let id = ProfileService::find(&ctx, &profile)?.id;
            let renamed = ProfileService::rename(&ctx, &id, &new_name)?;
            println!("{}", success(&format!("✓ Renamed to '{}'", renamed.name)));
            Ok(())
        }
        ProfileCommand::SetExe { profile, path } => {
            let ctx = Context::load_default()?;
            let id = ProfileService::find(&ctx, &profile)?.id;
            let updated = ProfileService::set_executable(&ctx, &id, &path)?;
            println!(
                "{}",
                success(&format!("✓ Executable set to {}", updated.game_executable.display()))
            );
            Ok(())
        }
        ProfileCommand::SetSaveFolder { profile, path } => {
            let ctx = Context::load_default()?;
            let id = ProfileService::find(&ctx, &profile)?.id;
            let updated = ProfileService::set_local_save_folder(&ctx, &id, &path)?;
            println!(
                "{}",
                success(&format!(
                    "✓ Save folder set to {}",
                    updated.local_save_folder.display()
                ))
            );
            Ok(())
        }
        ProfileCommand::SetSyncMode { profile, mode } => {
            let ctx = Context::load_default()?;
            let id = ProfileService::find(&ctx, &profile)?.id;
            ProfileService::set_sync_mode(&ctx, &id, mode)?;
            println!("{}", success(&format!("✓ Sync mode set to {mode}")));
            Ok(())
        }
    }
}

pub fn execute_omit(cmd: OmitCommand) -> Result<(), AppError> {
    let ctx = Context::load_default()?;
    match cmd {
        OmitCommand::List { profile } => {
            let profile = ProfileService::find(&ctx, &profile)?;
            let omitted = ProfileService::omit_list(&ctx, &profile.id)?;
            if omitted.is_empty() {
                println!("{}", info("Nothing is omitted; the whole save folder syncs."));
                return Ok(());
            }
            println!("{}", highlight(&format!("Omitted from '{}':", profile.name)));
            for path in omitted {
                println!("  {path}");
            }
            Ok(())
        }
        OmitCommand::Add { profile, path } => {
            let id = ProfileService::find(&ctx, &profile)?.id;
            let key = ProfileService::omit_add(&ctx, &id, &path)?;
            println!("{}", success(&format!("✓ Omitting {key}")));
            Ok(())
        }
        OmitCommand::Remove { profile, path } => {
            let id = ProfileService::find(&ctx, &profile)?.id;
            if ProfileService::omit_remove(&ctx, &id, &path)? {
                println!("{}", success(&format!("✓ {} syncs again", path.display())));
            } else {
                println!("{}", warning(&format!("{} was not omitted", path.display())));
            }
            Ok(())
        }
    }
}

pub fn execute_import(cmd: ImportCommand) -> Result<(), AppError> {
    let ctx = Context::load_default()?;
    match cmd {
        ImportCommand::Scan => {
            let found = ProfileService::scan_cloud(&ctx)?;
            if found.is_empty() {
                println!("{}", info("No profiles found in cloud storage."));
                return Ok(());
            }
            let mut table = create_table();
            table.set_header(vec!["ID", "Name", "Executable", "Saves", "Status"]);
            for entry in found {
                let row = match entry.status {
                    CloudStatus::Importable {
                        name,
                        executable_name,
                        saves,
                    } => vec![
                        entry.id,
                        name,
                        executable_name,
                        saves.to_string(),
                        success("importable"),
                    ],
                    CloudStatus::AlreadyKnown => vec![
                        entry.id,
                        String::new(),
                        String::new(),
                        String::new(),
                        info("already set up"),
                    ],
                    CloudStatus::Invalid { reason } => vec![
                        entry.id,
                        String::new(),
                        String::new(),
                        String::new(),
                        error(&format!("invalid: {reason}")),
                    ],
                };
                table.add_row(row);
            }
            println!("{table}");
            Ok(())
        }
        ImportCommand::Add {
            id,
            exe,
            save_folder,
            force,
        } => {
            let profile = ProfileService::import(
                &ctx,
                ImportRequest {
                    profile_id: id,
                    game_executable: exe,
                    local_save_folder: save_folder,
                    force,
                },
            )?;
            println!(
                "{}",
                success(&format!("✓ Imported '{}' ({})", profile.name, profile.id))
            );
            Ok(())
        }
    }
}

pub fn list_profiles() -> Result<(), AppError> {
    let ctx = Context::load_default()?;
    let profiles = ProfileService::list(&ctx)?;

    if profiles.is_empty() {
        println!("{}", info("No profiles yet."));
        println!("Use 'savetitan profile add' or 'savetitan import scan' to get started.");
        return Ok(());
    }

    let mut table = create_table();
    table.set_header(vec!["ID", "Name", "Sync", "Slot", "Checkout"]);
    for profile in profiles {
        let holder = CheckoutService::current_holder(ctx.descriptors.as_ref(), &profile.id)
            .unwrap_or_else(|e| {
                log::warn!("could not read checkout for {}: {e}", profile.id);
                None
            });
        let checkout = match holder {
            Some(host) if host == ctx.hostname => "this machine".to_string(),
            Some(host) => host,
            None => String::new(),
        };
        table.add_row(vec![
            profile.id.clone(),
            profile.name.clone(),
            profile.sync_mode.to_string(),
            profile.slot_key(),
            checkout,
        ]);
    }
    println!("{table}");
    Ok(())
}

fn show_profile(key: &str) -> Result<(), AppError> {
    let ctx = Context::load_default()?;
    let profile = ProfileService::find(&ctx, key)?;
    let cloud_root = ctx.cloud_root()?;

    println!("{}", highlight(&profile.name));
    println!("ID:          {}", profile.id);
    println!("Executable:  {}", profile.game_executable.display());
    println!("Save folder: {}", profile.local_save_folder.display());
    println!("Cloud slot:  {}", profile.remote_slot_dir(&cloud_root).display());
    println!("Sync mode:   {}", profile.sync_mode);
    if !profile.omitted_paths.is_empty() {
        println!("Omitted:     {} path(s)", profile.omitted_paths.len());
    }
    if let Some(holder) = CheckoutService::current_holder(ctx.descriptors.as_ref(), &profile.id)? {
        println!("Checkout:    {holder}");
    }
    Ok(())
}

fn add_profile(input: NewProfile) -> Result<(), AppError> {
    let ctx = Context::load_default()?;
    let profile = ProfileService::add(&ctx, input)?;
    println!(
        "{}",
        success(&format!("✓ Added '{}' ({})", profile.name, profile.id))
    );
    Ok(())
}

fn remove_profile(key: &str, yes: bool) -> Result<(), AppError> {
    let ctx = Context::load_default()?;
    let profile = ProfileService::find(&ctx, key)?;

    if !yes {
        let confirm = Confirm::new(&format!(
            "Remove '{}' from this machine? Cloud saves are kept.",
            profile.name
        ))
        .with_default(false)
        .prompt()
        .map_err(|e| AppError::Message(format!("Prompt failed: {}", e)))?;
        if !confirm {
            println!("{}", info("Cancelled."));
            return Ok(());
        }
    }

    ProfileService::remove(&ctx, &profile.id)?;
    println!("{}", success(&format!("✓ Removed '{}'", profile.name)));
    Ok(())
}
