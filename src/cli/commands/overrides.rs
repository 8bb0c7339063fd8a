use clap::Subcommand;

use crate::cli::ui::{create_table, info, success, warning};
use crate::error::AppError;
use crate::services::OverrideService;
use crate::settings::FileSettingsStore;

#[derive(Subcommand)]
pub enum OverridesCommand {
    /// List game overrides
    List,
    /// Wait on an extra process name (launcher, anti-cheat wrapper) before uploading
    Add {
        /// Game executable file name, e.g. eldenring.exe
        executable: String,
        process_name: String,
    },
    /// Remove one process name, or the whole override when none is given
    Remove {
        executable: String,
        process_name: Option<String>,
    },
    /// Turn process tracking on or off; off means you confirm when the game is done
    Tracking {
        executable: String,
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
}

pub fn execute(cmd: OverridesCommand) -> Result<(), AppError> {
    let store = FileSettingsStore::open_default();
    match cmd {
        OverridesCommand::List => {
            let overrides = OverrideService::list(&store)?;
            if overrides.is_empty() {
                println!("{}", info("No game overrides."));
                return Ok(());
            }
            let mut table = create_table();
            table.set_header(vec!["Executable", "Extra processes", "Tracking"]);
            for (exe, o) in overrides {
                table.add_row(vec![
                    exe,
                    o.process_names.join(", "),
                    if o.process_tracking { "on" } else { "off" }.to_string(),
                ]);
            }
            println!("{table}");
            Ok(())
        }
        OverridesCommand::Add {
            executable,
            process_name,
        } => {
            let o = OverrideService::add_process(&store, &executable, &process_name)?;
            println!(
                "{}",
                success(&format!(
                    "✓ {executable} waits on: {}",
                    o.process_names.join(", ")
                ))
            );
            Ok(())
        }
        OverridesCommand::Remove {
            executable,
            process_name: Some(process_name),
        } => {
            if OverrideService::remove_process(&store, &executable, &process_name)? {
                println!("{}", success(&format!("✓ Removed {process_name}")));
            } else {
                println!("{}", warning(&format!("{process_name} was not listed")));
            }
            Ok(())
        }
        OverridesCommand::Remove {
            executable,
            process_name: None,
        } => {
            if OverrideService::remove(&store, &executable)? {
                println!("{}", success(&format!("✓ Removed override for {executable}")));
            } else {
                println!("{}", warning(&format!("No override for {executable}")));
            }
            Ok(())
        }
        OverridesCommand::Tracking {
            executable,
            enabled,
        } => {
            OverrideService::set_tracking(&store, &executable, enabled)?;
            println!(
                "{}",
                success(&format!(
                    "✓ Process tracking for {executable}: {}",
                    if enabled { "on" } else { "off" }
                ))
            );
            Ok(())
        }
    }
}
