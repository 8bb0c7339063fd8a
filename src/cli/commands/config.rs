use clap::{Subcommand, ValueEnum};
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::cli::ui::{highlight, info, success};
use crate::config::get_app_config_dir;
use crate::error::AppError;
use crate::settings::{
    FileSettingsStore, GlobalSettingsStore, FIELD_CLOUD_STORAGE_PATH, FIELD_DEBUG,
    FIELD_SYNC_RETRY_LIMIT,
};

#[derive(Clone, Copy, ValueEnum)]
pub enum Toggle {
    Enable,
    Disable,
}

impl Toggle {
    fn as_str(&self) -> &'static str {
        match self {
            Toggle::Enable => "enable",
            Toggle::Disable => "disable",
        }
    }
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show global settings
    Show,
    /// Show the configuration directory
    Path,
    /// Set the cloud storage folder shared between machines
    SetCloudPath { path: PathBuf },
    /// Turn debug logging on or off
    Debug {
        #[arg(value_enum)]
        state: Toggle,
    },
    /// How many attempts a failing transfer gets before giving up
    RetryLimit { attempts: u32 },
}

pub fn execute(cmd: ConfigCommand) -> Result<(), AppError> {
    let store = FileSettingsStore::open_default();
    match cmd {
        ConfigCommand::Show => show(&store),
        ConfigCommand::Path => {
            println!("{}", get_app_config_dir().display());
            Ok(())
        }
        ConfigCommand::SetCloudPath { path } => set_cloud_path(&store, &path),
        ConfigCommand::Debug { state } => {
            store.write(FIELD_DEBUG, Value::String(state.as_str().to_string()))?;
            println!("{}", success(&format!("✓ Debug logging: {}", state.as_str())));
            Ok(())
        }
        ConfigCommand::RetryLimit { attempts } => {
            if attempts == 0 {
                return Err(AppError::InvalidInput(
                    "retry limit must be at least 1".to_string(),
                ));
            }
            store.write(FIELD_SYNC_RETRY_LIMIT, Value::from(attempts))?;
            println!("{}", success(&format!("✓ Transfers get up to {attempts} attempt(s)")));
            Ok(())
        }
    }
}

fn show(store: &FileSettingsStore) -> Result<(), AppError> {
    let settings = store.load()?;
    println!("{}", highlight("SaveTitan settings"));
    println!("Config file:   {}", store.path().display());
    println!(
        "Cloud storage: {}",
        settings.cloud_storage_path.as_deref().unwrap_or("(not set)")
    );
    println!(
        "Debug:         {}",
        if settings.debug_enabled() { "enable" } else { "disable" }
    );
    println!("Retry limit:   {}", settings.sync_retry_limit());
    println!(
        "Overrides:     {} game(s)",
        settings.game_overrides.len()
    );
    if settings.risk_acknowledged.is_none() {
        println!("{}", info("The risk notice will be shown on the first run."));
    }
    Ok(())
}

fn set_cloud_path(store: &FileSettingsStore, path: &Path) -> Result<(), AppError> {
    if !path.is_dir() {
        return Err(AppError::Config(format!(
            "cloud storage path is invalid (not a directory): {}",
            path.display()
        )));
    }
    let absolute = std::path::absolute(path).map_err(|e| AppError::io(path, e))?;
    store.write(
        FIELD_CLOUD_STORAGE_PATH,
        Value::String(absolute.to_string_lossy().into_owned()),
    )?;
    println!(
        "{}",
        success(&format!("✓ Cloud storage set to {}", absolute.display()))
    );
    Ok(())
}
