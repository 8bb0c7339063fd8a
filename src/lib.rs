pub mod cli;
pub mod config;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod profile;
pub mod services;
pub mod settings;
pub mod store;
pub mod sync_policy;

pub use context::Context;
pub use descriptor::{DescriptorStore, FileDescriptorStore, RemoteDescriptor};
pub use error::{Access, AppError};
pub use profile::{OmittedPaths, Profile, SyncMode};
pub use services::{
    Acquisition, BackupService, CheckoutService, Direction, Orchestrator, Outcome,
    ProcessRunner, ProfileService, SaveSlotService, SyncPrompter, SyncService,
};
pub use settings::{FileSettingsStore, GameOverride, GlobalSettings, GlobalSettingsStore};
pub use store::{FileProfileStore, ProfileStore};
pub use sync_policy::{NoRetry, RetryHandler, RetryPolicy};
