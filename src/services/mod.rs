pub mod backup;
pub mod checkout;
pub mod compare;
pub mod guard;
pub mod orchestrator;
pub mod overrides;
pub mod process;
pub mod profile;
pub mod saves;
pub mod sync;

pub use backup::{BackupReport, BackupService, Side};
pub use checkout::{Acquisition, CheckoutService};
pub use compare::{ComparisonResult, Divergence};
pub use orchestrator::{
    AbortReason, DivergenceChoice, DivergenceView, Orchestrator, Outcome, Plan, Prepared,
    PushResult, Session, SyncPrompter,
};
pub use overrides::OverrideService;
pub use process::{ProcessHandle, ProcessRunner, SystemProcessRunner};
pub use profile::{CloudProfile, CloudStatus, ImportRequest, NewProfile, ProfileService};
pub use saves::{LoadReport, SaveSlot, SaveSlotService};
pub use sync::{Direction, MirrorStats, SyncReport, SyncService};
