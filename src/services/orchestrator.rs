//! One invocation of "play this profile": lock, reconcile, launch, push on exit, unlock.
//!
//! The flow is split in two so the blocking part can finish before the game exits:
//! [`Orchestrator::prepare`] runs everything up to and including the launch and hands back a
//! [`Session`]; [`Orchestrator::finish`] waits for the game on a blocking worker and pushes.
//! [`Orchestrator::run`] chains both.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock, PoisonError};

use crate::context::Context;
use crate::descriptor::RemoteDescriptor;
use crate::error::{Access, AppError};
use crate::profile::{Profile, SyncMode};
use crate::services::checkout::{Acquisition, CheckoutService};
use crate::services::compare::{self, ComparisonResult, Divergence};
use crate::services::guard;
use crate::services::process::ProcessHandle;
use crate::services::sync::{SyncReport, SyncService};
use crate::sync_policy::{RetryHandler, RetryPolicy};

// ============================================================================
// Outcomes
// ============================================================================

/// What the user picked when the two copies disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DivergenceChoice {
    /// Pull the cloud copy over the local one, then play.
    Download,
    /// Keep the local copy; it overwrites the cloud copy on exit.
    Upload,
    /// Play without syncing this time. The lock is released right away.
    NoSync,
}

/// Both sides of a divergence, formatted for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DivergenceView {
    pub profile_name: String,
    pub divergence: Divergence,
    pub local_modified: String,
    pub remote_modified: String,
    pub remote_newer: bool,
}

impl DivergenceView {
    fn from_comparison(profile: &Profile, result: &ComparisonResult, divergence: Divergence) -> Self {
        Self {
            profile_name: profile.name.clone(),
            divergence,
            local_modified: compare::format_mtime(result.latest_local_mtime),
            remote_modified: compare::format_mtime(result.latest_remote_mtime),
            remote_newer: result.remote_is_newer(),
        }
    }

    pub fn remote_label(&self) -> &'static str {
        if self.remote_newer {
            "Cloud Copy: Newer"
        } else {
            "Cloud Copy: Older"
        }
    }

    pub fn local_label(&self) -> &'static str {
        if self.remote_newer {
            "Local Copy: Older"
        } else {
            "Local Copy: Newer"
        }
    }
}

/// How the game gets started once the lock is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    LaunchDirect,
    PullThenLaunch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// Another host holds the checkout and the user did not take it over.
    LockDeclined { holder: String },
    /// The divergence prompt was closed without a choice.
    DecisionDismissed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushResult {
    Pushed(SyncReport),
    /// Game tracking is off and the user chose not to upload.
    Skipped,
    /// The push (or the wait before it) failed. The lock was released anyway.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Aborted(AbortReason),
    LaunchedAndSynced(PushResult),
    LaunchedNoSync,
}

/// UI seam for every decision the flow can ask for.
pub trait SyncPrompter {
    /// Another host holds the checkout. `true` takes it over.
    fn confirm_checkout_override(&self, holder: &str) -> bool;

    /// `None` means the prompt was dismissed.
    fn choose_divergence(&self, view: &DivergenceView) -> Option<DivergenceChoice>;

    /// Asked instead of process polling when tracking is off. `true` uploads.
    fn confirm_game_finished(&self, profile: &Profile) -> bool;

    /// A transfer failed with a retryable error. `true` tries again.
    fn retry_sync(&self, error: &AppError, attempt: u32) -> bool;

    fn notify(&self, message: &str);
}

struct PromptRetry<'a>(&'a dyn SyncPrompter);

impl RetryHandler for PromptRetry<'_> {
    fn retry_requested(&self, error: &AppError, attempt: u32) -> bool {
        self.0.retry_sync(error, attempt)
    }
}

// ============================================================================
// In-process double invocation guard
// ============================================================================

static IN_PROGRESS: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();

/// Held for as long as a profile is being synced in this process.
#[derive(Debug)]
pub struct InProgressGuard {
    profile_id: String,
}

impl InProgressGuard {
    pub fn acquire(profile_id: &str) -> Result<Self, AppError> {
        let mut running = IN_PROGRESS
            .get_or_init(Default::default)
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !running.insert(profile_id.to_string()) {
            return Err(AppError::SyncInProgress(profile_id.to_string()));
        }
        Ok(Self {
            profile_id: profile_id.to_string(),
        })
    }
}

impl Drop for InProgressGuard {
    fn drop(&mut self) {
        if let Some(running) = IN_PROGRESS.get() {
            running
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&self.profile_id);
        }
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// A launched game still waiting for its post-exit push.
#[derive(Debug)]
pub struct Session {
    profile: Profile,
    cloud_root: PathBuf,
    plan: Plan,
    acquisition: Acquisition,
    pulled: Option<SyncReport>,
    handle: ProcessHandle,
    _guard: InProgressGuard,
}

impl Session {
    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn plan(&self) -> Plan {
        self.plan
    }

    pub fn acquisition(&self) -> &Acquisition {
        &self.acquisition
    }

    pub fn pulled(&self) -> Option<&SyncReport> {
        self.pulled.as_ref()
    }

    pub fn handle(&self) -> &ProcessHandle {
        &self.handle
    }
}

#[derive(Debug)]
pub enum Prepared {
    Finished(Outcome),
    AwaitingExit(Session),
}

enum Decision {
    Proceed(Plan),
    Done(Outcome),
}

pub struct Orchestrator {
    ctx: Context,
}

impl Orchestrator {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub async fn run(&self, profile_id: &str, prompter: &dyn SyncPrompter) -> Result<Outcome, AppError> {
        match self.prepare(profile_id, prompter)? {
            Prepared::Finished(outcome) => Ok(outcome),
            Prepared::AwaitingExit(session) => self.finish(session, prompter).await,
        }
    }

    /// Everything up to the launch. Never leaves a lock it claimed behind on failure.
    pub fn prepare(&self, profile_id: &str, prompter: &dyn SyncPrompter) -> Result<Prepared, AppError> {
        let guard = InProgressGuard::acquire(profile_id)?;
        let profile = self.ctx.profiles.get(profile_id)?;
        log::info!("starting '{}' ({})", profile.name, profile.id);

        if profile.sync_mode == SyncMode::None {
            log::info!("sync disabled for '{}', launching directly", profile.name);
            self.launch(&profile)?;
            return Ok(Prepared::Finished(Outcome::LaunchedNoSync));
        }

        let cloud_root = guard::require_cloud_root(self.ctx.settings.as_ref())?;
        self.ensure_descriptor(&profile)?;

        let acquisition = CheckoutService::acquire(
            self.ctx.descriptors.as_ref(),
            &profile.id,
            &self.ctx.hostname,
            |holder| prompter.confirm_checkout_override(holder),
        )?;
        if let Acquisition::Declined { holder } = acquisition {
            return Ok(Prepared::Finished(Outcome::Aborted(AbortReason::LockDeclined {
                holder,
            })));
        }

        match self.reconcile_and_launch(profile, cloud_root, acquisition, guard, prompter) {
            Ok(prepared) => Ok(prepared),
            Err(err) => {
                log::warn!("aborting '{profile_id}': {err}");
                self.release_quietly(profile_id);
                Err(err)
            }
        }
    }

    fn reconcile_and_launch(
        &self,
        profile: Profile,
        cloud_root: PathBuf,
        acquisition: Acquisition,
        guard: InProgressGuard,
        prompter: &dyn SyncPrompter,
    ) -> Result<Prepared, AppError> {
        let plan = match self.decide(&profile, &cloud_root, prompter)? {
            Decision::Proceed(plan) => plan,
            Decision::Done(outcome) => return Ok(Prepared::Finished(outcome)),
        };
        log::info!("plan for '{}': {plan:?}", profile.name);

        let pulled = match plan {
            Plan::PullThenLaunch => Some(SyncService::sync_to_local(
                &profile,
                &cloud_root,
                &self.retry_policy()?,
                &PromptRetry(prompter),
            )?),
            Plan::LaunchDirect => None,
        };

        let handle = self.launch(&profile)?;
        Ok(Prepared::AwaitingExit(Session {
            profile,
            cloud_root,
            plan,
            acquisition,
            pulled,
            handle,
            _guard: guard,
        }))
    }

    fn decide(
        &self,
        profile: &Profile,
        cloud_root: &Path,
        prompter: &dyn SyncPrompter,
    ) -> Result<Decision, AppError> {
        let remote = profile.remote_slot_dir(cloud_root);
        if !compare::has_content(&remote) {
            log::info!("cloud {} is empty, local copy wins", profile.slot_key());
            return Ok(Decision::Proceed(Plan::LaunchDirect));
        }

        guard::check(&profile.local_save_folder, "save folder", Access::Read)?;
        let result = compare::compare(&profile.local_save_folder, &remote, &profile.omitted_paths)?;
        log::info!(
            "compare '{}': identical={} local={} cloud={}",
            profile.name,
            result.identical,
            result.local_file_count,
            result.remote_file_count
        );

        let Some(divergence) = result.divergence.clone() else {
            let plan = if result.remote_file_count > result.local_file_count {
                Plan::PullThenLaunch
            } else {
                Plan::LaunchDirect
            };
            return Ok(Decision::Proceed(plan));
        };

        let view = DivergenceView::from_comparison(profile, &result, divergence);
        log::info!(
            "copies diverge at {} ({}, {})",
            view.divergence.path().display(),
            view.remote_label(),
            view.local_label()
        );
        match prompter.choose_divergence(&view) {
            Some(DivergenceChoice::Download) => Ok(Decision::Proceed(Plan::PullThenLaunch)),
            Some(DivergenceChoice::Upload) => Ok(Decision::Proceed(Plan::LaunchDirect)),
            Some(DivergenceChoice::NoSync) => {
                CheckoutService::release(self.ctx.descriptors.as_ref(), &profile.id)?;
                self.launch(profile)?;
                Ok(Decision::Done(Outcome::LaunchedNoSync))
            }
            None => {
                CheckoutService::release(self.ctx.descriptors.as_ref(), &profile.id)?;
                Ok(Decision::Done(Outcome::Aborted(AbortReason::DecisionDismissed)))
            }
        }
    }

    /// Wait for the game to go away, push, and release the lock whatever happened.
    pub async fn finish(&self, session: Session, prompter: &dyn SyncPrompter) -> Result<Outcome, AppError> {
        let profile = &session.profile;
        let push = match self.await_exit(profile, prompter).await {
            Ok(true) => self.push(profile, &session.cloud_root, prompter),
            Ok(false) => {
                log::info!("upload skipped for '{}'", profile.name);
                PushResult::Skipped
            }
            Err(err) => {
                log::error!("lost track of '{}': {err}", profile.name);
                prompter.notify(&format!("Could not confirm that the game exited: {err}"));
                PushResult::Failed(err.to_string())
            }
        };
        if let Err(err) = CheckoutService::release(self.ctx.descriptors.as_ref(), &profile.id) {
            log::error!("could not release checkout for '{}': {err}", profile.name);
            prompter.notify(&format!(
                "Could not release the checkout, other machines will be asked to take it over: {err}"
            ));
        }
        Ok(Outcome::LaunchedAndSynced(push))
    }

    /// `true` once it is safe to upload.
    async fn await_exit(&self, profile: &Profile, prompter: &dyn SyncPrompter) -> Result<bool, AppError> {
        let exe_name = profile.executable_name();
        let game_override = self.ctx.settings.load()?.game_override(&exe_name);
        if !game_override.process_tracking {
            return Ok(prompter.confirm_game_finished(profile));
        }

        let mut names = vec![exe_name];
        names.extend(game_override.process_names);
        log::info!("waiting for {} to exit", names.join(", "));

        let runner = self.ctx.runner.clone();
        tokio::task::spawn_blocking(move || runner.wait_until_exited(&names))
            .await
            .map_err(|e| AppError::Message(format!("process watcher stopped: {e}")))??;
        Ok(true)
    }

    fn push(&self, profile: &Profile, cloud_root: &Path, prompter: &dyn SyncPrompter) -> PushResult {
        let result = self
            .retry_policy()
            .and_then(|policy| {
                SyncService::sync_to_cloud(profile, cloud_root, &policy, &PromptRetry(prompter))
            });
        match result {
            Ok(report) => PushResult::Pushed(report),
            Err(err) => {
                log::error!("upload of '{}' failed: {err}", profile.name);
                prompter.notify(&format!("Upload to cloud failed: {err}"));
                PushResult::Failed(err.to_string())
            }
        }
    }

    /// Manual push of the active slot. Clears the checkout once the upload succeeds.
    pub fn upload(&self, profile_id: &str, prompter: &dyn SyncPrompter) -> Result<SyncReport, AppError> {
        let _guard = InProgressGuard::acquire(profile_id)?;
        let profile = self.ctx.profiles.get(profile_id)?;
        let cloud_root = guard::require_cloud_root(self.ctx.settings.as_ref())?;
        self.ensure_descriptor(&profile)?;
        let report = SyncService::sync_to_cloud(
            &profile,
            &cloud_root,
            &self.retry_policy()?,
            &PromptRetry(prompter),
        )?;
        CheckoutService::release(self.ctx.descriptors.as_ref(), &profile.id)?;
        Ok(report)
    }

    fn launch(&self, profile: &Profile) -> Result<ProcessHandle, AppError> {
        guard::check(&profile.game_executable, "game executable", Access::Execute)?;
        self.ctx.runner.launch(&profile.game_executable)
    }

    fn retry_policy(&self) -> Result<RetryPolicy, AppError> {
        Ok(RetryPolicy::new(self.ctx.settings.load()?.sync_retry_limit()))
    }

    /// A profile whose cloud folder lost its descriptor gets a fresh one.
    fn ensure_descriptor(&self, profile: &Profile) -> Result<(), AppError> {
        if self.ctx.descriptors.load(&profile.id)?.is_some() {
            return Ok(());
        }
        log::warn!("no cloud descriptor for '{}', recreating it", profile.name);
        let mut descriptor =
            RemoteDescriptor::new(&profile.name, &profile.executable_name(), profile.sync_mode);
        descriptor.set(
            crate::descriptor::FIELD_SAVE_SLOT,
            &profile.save_slot.to_string(),
        );
        self.ctx.descriptors.store(&profile.id, &descriptor)
    }

    fn release_quietly(&self, profile_id: &str) {
        if let Err(err) = CheckoutService::release(self.ctx.descriptors.as_ref(), profile_id) {
            log::error!("could not release checkout for {profile_id}: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_guard_for_same_profile_is_refused() {
        let first = InProgressGuard::acquire("guard-test-profile").expect("first");
        let err = InProgressGuard::acquire("guard-test-profile").expect_err("double invocation");
        assert!(matches!(err, AppError::SyncInProgress(ref id) if id == "guard-test-profile"));

        drop(first);
        InProgressGuard::acquire("guard-test-profile").expect("free again after drop");
    }

    #[test]
    fn labels_follow_which_side_is_newer() {
        let view = DivergenceView {
            profile_name: "Hades".into(),
            divergence: Divergence::ContentDiffers("a.sav".into()),
            local_modified: String::new(),
            remote_modified: String::new(),
            remote_newer: true,
        };
        assert_eq!(view.remote_label(), "Cloud Copy: Newer");
        assert_eq!(view.local_label(), "Local Copy: Older");
    }
}
