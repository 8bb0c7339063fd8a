use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use savetitan_lib::services::checkout::CheckoutService;
use savetitan_lib::services::{
    AbortReason, Divergence, DivergenceChoice, Orchestrator, OverrideService, Outcome, Plan,
    Prepared, ProfileService, PushResult,
};
use savetitan_lib::settings::FIELD_CLOUD_STORAGE_PATH;
use savetitan_lib::{
    AppError, DescriptorStore, FileDescriptorStore, GlobalSettingsStore, RemoteDescriptor, SyncMode,
};

#[path = "support.rs"]
mod support;
use support::{set_mtime, Sandbox, ScriptedPrompter, THIS_HOST};

fn holder(sb: &Sandbox, id: &str) -> Option<String> {
    CheckoutService::current_holder(sb.ctx.descriptors.as_ref(), id).expect("read checkout")
}

fn seed_checkout(sb: &Sandbox, id: &str, host: &str) {
    sb.ctx
        .descriptors
        .write(id, "checkout", host)
        .expect("seed checkout");
}

#[tokio::test]
async fn empty_cloud_slot_launches_directly_and_pushes_on_exit() {
    let sb = Sandbox::new();
    let profile = sb.add_profile("Hollow Knight");
    sb.write_local("user1.dat", "one");
    sb.write_local("user2.dat", "two");
    sb.write_local("shared.dat", "three");

    let orchestrator = Orchestrator::new(sb.ctx.clone());
    let prompter = ScriptedPrompter::default();

    let session = match orchestrator.prepare(&profile.id, &prompter).expect("prepare") {
        Prepared::AwaitingExit(session) => session,
        other => panic!("expected a launched session, got {other:?}"),
    };
    assert_eq!(session.plan(), Plan::LaunchDirect);
    assert!(session.pulled().is_none(), "nothing to pull from an empty slot");
    assert!(prompter.views.borrow().is_empty());
    assert_eq!(sb.runner.launch_count(), 1);
    assert_eq!(holder(&sb, &profile.id).as_deref(), Some(THIS_HOST));

    let outcome = orchestrator.finish(session, &prompter).await.expect("finish");
    match outcome {
        Outcome::LaunchedAndSynced(PushResult::Pushed(report)) => {
            assert_eq!(report.stats.copied, 3);
        }
        other => panic!("expected a successful push, got {other:?}"),
    }
    assert_eq!(sb.read_remote(&profile, "user2.dat").as_deref(), Some("two"));
    assert_eq!(holder(&sb, &profile.id), None);
}

#[tokio::test]
async fn extra_remote_file_is_pulled_before_launch() {
    let sb = Sandbox::new();
    let profile = sb.add_profile("Celeste");
    for (rel, content) in [("A.sav", "a"), ("B.sav", "b")] {
        sb.write_local(rel, content);
        sb.write_remote(&profile, rel, content);
    }
    sb.write_remote(&profile, "C.sav", "c");

    let orchestrator = Orchestrator::new(sb.ctx.clone());
    let prompter = ScriptedPrompter::default();
    let session = match orchestrator.prepare(&profile.id, &prompter).expect("prepare") {
        Prepared::AwaitingExit(session) => session,
        other => panic!("expected a launched session, got {other:?}"),
    };

    assert_eq!(session.plan(), Plan::PullThenLaunch);
    assert!(prompter.views.borrow().is_empty(), "identical files never prompt");
    assert_eq!(sb.read_local("C.sav").as_deref(), Some("c"));

    orchestrator.finish(session, &prompter).await.expect("finish");
    assert_eq!(holder(&sb, &profile.id), None);
}

#[tokio::test]
async fn newer_cloud_copy_is_offered_and_downloaded() {
    let sb = Sandbox::new();
    let profile = sb.add_profile("Hades");
    sb.write_local("A.sav", "local progress");
    sb.write_remote(&profile, "A.sav", "cloud progress");
    set_mtime(&sb.local.join("A.sav"), 1_600_000_000);
    set_mtime(&sb.remote_slot(&profile).join("A.sav"), 1_700_000_000);

    let orchestrator = Orchestrator::new(sb.ctx.clone());
    let prompter = ScriptedPrompter::choosing(DivergenceChoice::Download);
    let outcome = orchestrator.run(&profile.id, &prompter).await.expect("run");

    let views = prompter.views.borrow();
    assert_eq!(views.len(), 1);
    assert!(views[0].remote_newer);
    assert_eq!(views[0].remote_label(), "Cloud Copy: Newer");
    assert_eq!(views[0].local_label(), "Local Copy: Older");
    assert_eq!(
        views[0].divergence,
        Divergence::ContentDiffers(PathBuf::from("A.sav"))
    );

    assert_eq!(sb.read_local("A.sav").as_deref(), Some("cloud progress"));
    assert!(matches!(
        outcome,
        Outcome::LaunchedAndSynced(PushResult::Pushed(_))
    ));
    assert_eq!(sb.runner.launch_count(), 1);
}

#[tokio::test]
async fn upload_choice_keeps_local_copy_and_overwrites_cloud_on_exit() {
    let sb = Sandbox::new();
    let profile = sb.add_profile("Hades");
    sb.write_local("A.sav", "local progress");
    sb.write_remote(&profile, "A.sav", "cloud progress");

    let orchestrator = Orchestrator::new(sb.ctx.clone());
    let prompter = ScriptedPrompter::choosing(DivergenceChoice::Upload);
    let session = match orchestrator.prepare(&profile.id, &prompter).expect("prepare") {
        Prepared::AwaitingExit(session) => session,
        other => panic!("expected a launched session, got {other:?}"),
    };
    assert_eq!(session.plan(), Plan::LaunchDirect);
    assert_eq!(sb.read_local("A.sav").as_deref(), Some("local progress"));

    orchestrator.finish(session, &prompter).await.expect("finish");
    assert_eq!(
        sb.read_remote(&profile, "A.sav").as_deref(),
        Some("local progress")
    );
}

#[tokio::test]
async fn contested_lock_declined_touches_nothing() {
    let sb = Sandbox::new();
    let profile = sb.add_profile("Stardew Valley");
    sb.write_local("farm.sav", "local");
    sb.write_remote(&profile, "farm.sav", "cloud");
    seed_checkout(&sb, &profile.id, "host-b");

    let orchestrator = Orchestrator::new(sb.ctx.clone());
    let prompter = ScriptedPrompter::default();
    let outcome = orchestrator.run(&profile.id, &prompter).await.expect("run");

    assert_eq!(
        outcome,
        Outcome::Aborted(AbortReason::LockDeclined {
            holder: "host-b".to_string()
        })
    );
    assert_eq!(prompter.override_prompts.get(), 1);
    assert_eq!(holder(&sb, &profile.id).as_deref(), Some("host-b"));
    assert_eq!(sb.runner.launch_count(), 0);
    assert_eq!(sb.read_local("farm.sav").as_deref(), Some("local"));
    assert_eq!(sb.read_remote(&profile, "farm.sav").as_deref(), Some("cloud"));
    assert!(!profile.remote_backup_dir(&sb.cloud).exists());
}

#[tokio::test]
async fn contested_lock_taken_over_then_released() {
    let sb = Sandbox::new();
    let profile = sb.add_profile("Stardew Valley");
    sb.write_local("farm.sav", "local");
    seed_checkout(&sb, &profile.id, "host-b");

    let orchestrator = Orchestrator::new(sb.ctx.clone());
    let prompter = ScriptedPrompter {
        take_over_checkout: true,
        ..ScriptedPrompter::default()
    };
    let session = match orchestrator.prepare(&profile.id, &prompter).expect("prepare") {
        Prepared::AwaitingExit(session) => session,
        other => panic!("expected a launched session, got {other:?}"),
    };
    assert_eq!(holder(&sb, &profile.id).as_deref(), Some(THIS_HOST));

    orchestrator.finish(session, &prompter).await.expect("finish");
    assert_eq!(holder(&sb, &profile.id), None);
}

#[tokio::test]
async fn lock_held_by_this_host_is_resumed_without_prompt() {
    let sb = Sandbox::new();
    let profile = sb.add_profile("Terraria");
    sb.write_local("world.wld", "w");
    seed_checkout(&sb, &profile.id, THIS_HOST);

    let orchestrator = Orchestrator::new(sb.ctx.clone());
    let prompter = ScriptedPrompter::default();
    orchestrator.run(&profile.id, &prompter).await.expect("run");
    assert_eq!(prompter.override_prompts.get(), 0);
    assert_eq!(holder(&sb, &profile.id), None);
}

#[tokio::test]
async fn no_sync_choice_releases_lock_and_launches_without_push() {
    let sb = Sandbox::new();
    let profile = sb.add_profile("Hades");
    sb.write_local("A.sav", "local");
    sb.write_remote(&profile, "A.sav", "cloud");

    let orchestrator = Orchestrator::new(sb.ctx.clone());
    let prompter = ScriptedPrompter::choosing(DivergenceChoice::NoSync);
    let outcome = orchestrator.run(&profile.id, &prompter).await.expect("run");

    assert_eq!(outcome, Outcome::LaunchedNoSync);
    assert_eq!(sb.runner.launch_count(), 1);
    assert!(sb.runner.waited_on.lock().expect("lock").is_empty());
    assert_eq!(holder(&sb, &profile.id), None);
    assert_eq!(sb.read_remote(&profile, "A.sav").as_deref(), Some("cloud"));
}

#[tokio::test]
async fn dismissed_decision_aborts_and_releases_lock() {
    let sb = Sandbox::new();
    let profile = sb.add_profile("Hades");
    sb.write_local("A.sav", "local");
    sb.write_remote(&profile, "A.sav", "cloud");

    let orchestrator = Orchestrator::new(sb.ctx.clone());
    let prompter = ScriptedPrompter::default();
    let outcome = orchestrator.run(&profile.id, &prompter).await.expect("run");

    assert_eq!(outcome, Outcome::Aborted(AbortReason::DecisionDismissed));
    assert_eq!(sb.runner.launch_count(), 0);
    assert_eq!(holder(&sb, &profile.id), None);
    assert_eq!(sb.read_local("A.sav").as_deref(), Some("local"));
}

#[tokio::test]
async fn swapped_file_with_equal_counts_is_caught_as_divergence() {
    let sb = Sandbox::new();
    let profile = sb.add_profile("Dead Cells");
    sb.write_local("A.sav", "a");
    sb.write_local("B.sav", "b");
    sb.write_remote(&profile, "A.sav", "a");
    sb.write_remote(&profile, "C.sav", "c");

    let orchestrator = Orchestrator::new(sb.ctx.clone());
    let prompter = ScriptedPrompter::default();
    orchestrator.run(&profile.id, &prompter).await.expect("run");

    let views = prompter.views.borrow();
    assert_eq!(views.len(), 1, "equal counts must not hide the swap");
    assert_eq!(
        views[0].divergence,
        Divergence::MissingRemote(PathBuf::from("B.sav"))
    );
}

#[tokio::test]
async fn failed_push_still_releases_lock_and_notifies() {
    let sb = Sandbox::new();
    let profile = sb.add_profile("Factorio");
    sb.write_local("save.zip", "factory");

    let orchestrator = Orchestrator::new(sb.ctx.clone());
    let prompter = ScriptedPrompter::default();
    let session = match orchestrator.prepare(&profile.id, &prompter).expect("prepare") {
        Prepared::AwaitingExit(session) => session,
        other => panic!("expected a launched session, got {other:?}"),
    };

    // The save folder vanishes while the game runs.
    fs::remove_dir_all(&sb.local).expect("remove save folder");

    let outcome = orchestrator.finish(session, &prompter).await.expect("finish");
    assert!(matches!(
        outcome,
        Outcome::LaunchedAndSynced(PushResult::Failed(_))
    ));
    assert_eq!(prompter.notices.borrow().len(), 1);
    assert_eq!(holder(&sb, &profile.id), None);
}

#[tokio::test]
async fn failed_exit_watch_skips_push_but_releases_lock() {
    let sb = Sandbox::new();
    let profile = sb.add_profile("Factorio");
    sb.write_local("save.zip", "factory");
    *sb.runner.fail_wait.lock().expect("lock") = true;

    let orchestrator = Orchestrator::new(sb.ctx.clone());
    let prompter = ScriptedPrompter::default();
    let outcome = orchestrator.run(&profile.id, &prompter).await.expect("run");

    assert!(matches!(
        outcome,
        Outcome::LaunchedAndSynced(PushResult::Failed(_))
    ));
    assert_eq!(sb.read_remote(&profile, "save.zip"), None);
    assert_eq!(holder(&sb, &profile.id), None);
}

#[tokio::test]
async fn waits_on_executable_and_override_aliases() {
    let sb = Sandbox::new();
    let profile = sb.add_profile("Elden Ring");
    sb.write_local("ER0000.sl2", "tarnished");
    OverrideService::add_process(sb.ctx.settings.as_ref(), "GAME.SH", "start_protected_game.exe")
        .expect("add alias");

    let orchestrator = Orchestrator::new(sb.ctx.clone());
    orchestrator
        .run(&profile.id, &ScriptedPrompter::default())
        .await
        .expect("run");

    let waited = sb.runner.waited_on.lock().expect("lock");
    assert_eq!(
        waited.as_slice(),
        &[vec![
            "game.sh".to_string(),
            "start_protected_game.exe".to_string()
        ]]
    );
}

#[tokio::test]
async fn tracking_off_asks_user_and_abort_skips_upload() {
    let sb = Sandbox::new();
    let profile = sb.add_profile("Elden Ring");
    sb.write_local("ER0000.sl2", "tarnished");
    OverrideService::set_tracking(sb.ctx.settings.as_ref(), "game.sh", false).expect("tracking");

    let orchestrator = Orchestrator::new(sb.ctx.clone());
    let prompter = ScriptedPrompter {
        upload_after_game: false,
        ..ScriptedPrompter::default()
    };
    let outcome = orchestrator.run(&profile.id, &prompter).await.expect("run");

    assert_eq!(outcome, Outcome::LaunchedAndSynced(PushResult::Skipped));
    assert_eq!(prompter.game_finished_prompts.get(), 1);
    assert!(sb.runner.waited_on.lock().expect("lock").is_empty());
    assert_eq!(sb.read_remote(&profile, "ER0000.sl2"), None);
    assert_eq!(holder(&sb, &profile.id), None);
}

#[tokio::test]
async fn sync_disabled_profile_launches_without_touching_the_lock() {
    let sb = Sandbox::new();
    let profile = sb.add_profile("Minecraft");
    ProfileService::set_sync_mode(&sb.ctx, &profile.id, SyncMode::None).expect("mode");
    seed_checkout(&sb, &profile.id, "host-b");

    let orchestrator = Orchestrator::new(sb.ctx.clone());
    let prompter = ScriptedPrompter::default();
    let outcome = orchestrator.run(&profile.id, &prompter).await.expect("run");

    assert_eq!(outcome, Outcome::LaunchedNoSync);
    assert_eq!(prompter.override_prompts.get(), 0);
    assert_eq!(holder(&sb, &profile.id).as_deref(), Some("host-b"));
    assert_eq!(sb.runner.launch_count(), 1);
}

#[test]
fn second_invocation_for_same_profile_is_refused() {
    let sb = Sandbox::new();
    let profile = sb.add_profile("Celeste");
    sb.write_local("0.celeste", "x");

    let orchestrator = Orchestrator::new(sb.ctx.clone());
    let prompter = ScriptedPrompter::default();
    let _session = orchestrator.prepare(&profile.id, &prompter).expect("first");
    let err = orchestrator
        .prepare(&profile.id, &prompter)
        .expect_err("double invocation");
    assert!(matches!(err, AppError::SyncInProgress(_)));
}

#[test]
fn unset_cloud_path_is_a_configuration_error() {
    let sb = Sandbox::new();
    let profile = sb.add_profile("Celeste");
    sb.ctx
        .settings
        .write(FIELD_CLOUD_STORAGE_PATH, serde_json::Value::String(String::new()))
        .expect("clear cloud path");

    let orchestrator = Orchestrator::new(sb.ctx.clone());
    let err = orchestrator
        .prepare(&profile.id, &ScriptedPrompter::default())
        .expect_err("no cloud path");
    assert!(matches!(err, AppError::Config(_)));
    assert_eq!(sb.runner.launch_count(), 0);
}

#[test]
fn unknown_profile_is_reported() {
    let sb = Sandbox::new();
    let orchestrator = Orchestrator::new(sb.ctx.clone());
    let err = orchestrator
        .prepare("nosuch", &ScriptedPrompter::default())
        .expect_err("unknown id");
    assert!(matches!(err, AppError::ProfileNotFound(_)));
}

#[test]
fn manual_upload_pushes_and_clears_checkout() {
    let sb = Sandbox::new();
    let profile = sb.add_profile("Factorio");
    sb.write_local("save.zip", "factory");
    seed_checkout(&sb, &profile.id, THIS_HOST);

    let orchestrator = Orchestrator::new(sb.ctx.clone());
    let report = orchestrator
        .upload(&profile.id, &ScriptedPrompter::default())
        .expect("upload");
    assert_eq!(report.stats.copied, 1);
    assert_eq!(sb.read_remote(&profile, "save.zip").as_deref(), Some("factory"));
    assert_eq!(holder(&sb, &profile.id), None);
}

#[cfg(unix)]
#[test]
fn failure_after_claiming_the_lock_releases_it() {
    use std::os::unix::fs::PermissionsExt;

    let sb = Sandbox::new();
    let profile = sb.add_profile("Celeste");
    sb.write_local("0.celeste", "x");
    fs::set_permissions(&sb.exe, fs::Permissions::from_mode(0o644)).expect("chmod -x");

    let orchestrator = Orchestrator::new(sb.ctx.clone());
    let err = orchestrator
        .prepare(&profile.id, &ScriptedPrompter::default())
        .expect_err("game cannot be executed");
    assert!(matches!(err, AppError::PermissionDenied { .. }));
    assert_eq!(holder(&sb, &profile.id), None);
    assert_eq!(sb.runner.launch_count(), 0);
}

/// Descriptor store whose writes can be switched off mid-flow.
struct FlakyDescriptors {
    inner: FileDescriptorStore,
    fail_writes: AtomicBool,
}

impl DescriptorStore for FlakyDescriptors {
    fn load(&self, profile_id: &str) -> Result<Option<RemoteDescriptor>, AppError> {
        self.inner.load(profile_id)
    }

    fn store(&self, profile_id: &str, descriptor: &RemoteDescriptor) -> Result<(), AppError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Message("cloud folder went read-only".into()));
        }
        self.inner.store(profile_id, descriptor)
    }
}

#[tokio::test]
async fn failed_release_still_reports_the_push() {
    let mut sb = Sandbox::new();
    let profile = sb.add_profile("Factorio");
    sb.write_local("save.zip", "factory");
    let descriptors = Arc::new(FlakyDescriptors {
        inner: FileDescriptorStore::new(&sb.cloud),
        fail_writes: AtomicBool::new(false),
    });
    sb.ctx.descriptors = descriptors.clone();

    let orchestrator = Orchestrator::new(sb.ctx.clone());
    let prompter = ScriptedPrompter::default();
    let session = match orchestrator.prepare(&profile.id, &prompter).expect("prepare") {
        Prepared::AwaitingExit(session) => session,
        other => panic!("expected a launched session, got {other:?}"),
    };
    descriptors.fail_writes.store(true, Ordering::SeqCst);

    let outcome = orchestrator.finish(session, &prompter).await.expect("finish");
    assert!(matches!(
        outcome,
        Outcome::LaunchedAndSynced(PushResult::Pushed(_))
    ));
    assert_eq!(sb.read_remote(&profile, "save.zip").as_deref(), Some("factory"));
    assert_eq!(holder(&sb, &profile.id).as_deref(), Some(THIS_HOST));
    let notices = prompter.notices.borrow();
    assert_eq!(notices.len(), 1);
    assert!(notices[0].contains("release the checkout"));
}
