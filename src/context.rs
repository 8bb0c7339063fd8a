use std::path::PathBuf;
use std::sync::Arc;

use crate::config::current_hostname;
use crate::descriptor::{DescriptorStore, FileDescriptorStore};
use crate::error::AppError;
use crate::services::process::{ProcessRunner, SystemProcessRunner};
use crate::settings::{FileSettingsStore, GlobalSettingsStore};
use crate::store::{FileProfileStore, ProfileStore};

/// Everything the sync engine talks to, passed explicitly instead of living in globals.
#[derive(Clone)]
pub struct Context {
    pub profiles: Arc<dyn ProfileStore>,
    pub settings: Arc<dyn GlobalSettingsStore>,
    pub descriptors: Arc<dyn DescriptorStore>,
    pub runner: Arc<dyn ProcessRunner>,
    /// Name written into the checkout field.
    pub hostname: String,
}

impl Context {
    /// File-backed stores under the app config dir and the configured cloud root.
    pub fn load_default() -> Result<Self, AppError> {
        let settings = FileSettingsStore::open_default();
        let cloud_root = settings.load()?.cloud_root()?;
        Ok(Self {
            profiles: Arc::new(FileProfileStore::open_default()),
            settings: Arc::new(settings),
            descriptors: Arc::new(FileDescriptorStore::new(cloud_root)),
            runner: Arc::new(SystemProcessRunner::default()),
            hostname: current_hostname(),
        })
    }

    /// Remote root from the global settings. Errors with `Config` when unset.
    pub fn cloud_root(&self) -> Result<PathBuf, AppError> {
        self.settings.load()?.cloud_root()
    }
}
