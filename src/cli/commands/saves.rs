use clap::Subcommand;
use inquire::Confirm;

use crate::cli::prompter::InquirePrompter;
use crate::cli::ui::{create_table, info, success};
use crate::context::Context;
use crate::error::AppError;
use crate::services::{ProfileService, SaveSlotService};

#[derive(Subcommand)]
pub enum SavesCommand {
    /// List save slots of a profile
    List { profile: String },
    /// Create a new empty save slot
    New { profile: String },
    /// Switch to another slot and download it into the save folder
    Load {
        profile: String,
        slot: u32,
        /// Upload the current slot before switching
        #[arg(long, conflicts_with = "no_upload")]
        upload: bool,
        /// Switch without uploading the current slot
        #[arg(long)]
        no_upload: bool,
    },
    /// Rename a save slot
    Rename {
        profile: String,
        slot: u32,
        name: String,
    },
    /// Delete a save slot and its cloud folder
    Delete {
        profile: String,
        slot: u32,
        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

pub fn execute(cmd: SavesCommand) -> Result<(), AppError> {
    let ctx = Context::load_default()?;
    match cmd {
        SavesCommand::List { profile } => {
            let profile = ProfileService::find(&ctx, &profile)?;
            let slots = SaveSlotService::list(&ctx, &profile.id)?;
            let mut table = create_table();
            table.set_header(vec!["", "Slot", "Name"]);
            for slot in slots {
                let marker = if slot.active { "✓" } else { " " };
                table.add_row(vec![marker.to_string(), slot.number.to_string(), slot.name]);
            }
            println!("{table}");
            println!("{} ✓ = Currently loaded", info("→"));
            Ok(())
        }
        SavesCommand::New { profile } => {
            let id = ProfileService::find(&ctx, &profile)?.id;
            let slot = SaveSlotService::create(&ctx, &id)?;
            println!(
                "{}",
                success(&format!("✓ Created slot {} ('{}')", slot.number, slot.name))
            );
            Ok(())
        }
        SavesCommand::Load {
            profile,
            slot,
            upload,
            no_upload,
        } => {
            let id = ProfileService::find(&ctx, &profile)?.id;
            let upload_first = if upload || no_upload {
                upload
            } else {
                Confirm::new("Upload your current save before switching?")
                    .with_help_message("Your local save will be replaced with the selected one.")
                    .with_default(true)
                    .prompt()
                    .map_err(|_| AppError::Message("Cancelled".to_string()))?
            };
            let prompter = InquirePrompter::default();
            match SaveSlotService::load(&ctx, &id, slot, upload_first, &prompter)? {
                Some(_) => println!("{}", success(&format!("✓ Loaded slot {slot}"))),
                None => println!("{}", info(&format!("Slot {slot} is already loaded."))),
            }
            Ok(())
        }
        SavesCommand::Rename {
            profile,
            slot,
            name,
        } => {
            let id = ProfileService::find(&ctx, &profile)?.id;
            let renamed = SaveSlotService::rename(&ctx, &id, slot, &name)?;
            println!(
                "{}",
                success(&format!("✓ Slot {} is now '{}'", renamed.number, renamed.name))
            );
            Ok(())
        }
        SavesCommand::Delete { profile, slot, yes } => {
            let id = ProfileService::find(&ctx, &profile)?.id;
            if !yes {
                let confirm = Confirm::new(&format!(
                    "Delete slot {slot}? This removes it from cloud storage."
                ))
                .with_default(false)
                .prompt()
                .map_err(|e| AppError::Message(format!("Prompt failed: {}", e)))?;
                if !confirm {
                    println!("{}", info("Cancelled."));
                    return Ok(());
                }
            }
            SaveSlotService::delete(&ctx, &id, slot)?;
            println!("{}", success(&format!("✓ Deleted slot {slot}")));
            Ok(())
        }
    }
}
