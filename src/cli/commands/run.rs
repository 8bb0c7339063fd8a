use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use inquire::Confirm;

use crate::cli::prompter::InquirePrompter;
use crate::cli::ui::{error, highlight, info, success, warning};
use crate::context::Context;
use crate::error::AppError;
use crate::services::{
    AbortReason, Orchestrator, Outcome, Plan, Prepared, ProfileService, PushResult, SyncReport,
};
use crate::settings::FIELD_RISK_ACKNOWLEDGED;

const RISK_NOTICE: &str = "SaveTitan overwrites save folders on this machine and in your cloud \
folder. A single backup of the overwritten side is kept next to each save slot in the cloud. \
Keep your own backups of saves you cannot afford to lose.";

/// Sync, launch, wait for exit, push. `key` is a profile id or name.
pub fn run_profile(key: &str) -> Result<(), AppError> {
    let ctx = Context::load_default()?;
    ensure_risk_acknowledged(&ctx)?;
    let profile = ProfileService::find(&ctx, key)?;
    let tracking = ctx
        .settings
        .load()?
        .game_override(&profile.executable_name())
        .process_tracking;

    let orchestrator = Orchestrator::new(ctx);
    let prompter = InquirePrompter::new(spinner());
    prompter
        .progress()
        .set_message(format!("Checking saves for '{}'...", profile.name));

    let outcome = match orchestrator.prepare(&profile.id, &prompter)? {
        Prepared::Finished(outcome) => outcome,
        Prepared::AwaitingExit(session) => {
            if session.plan() == Plan::PullThenLaunch {
                prompter
                    .progress()
                    .println(info("Downloaded the cloud copy."));
            }
            prompter.progress().println(success(&format!(
                "✓ Launched {} (pid {})",
                session.handle().executable.display(),
                session.handle().pid
            )));
            if tracking {
                prompter
                    .progress()
                    .set_message("Waiting for the game to exit...");
            } else {
                prompter.progress().finish_and_clear();
            }

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| AppError::Message(format!("Failed to create runtime: {e}")))?;
            runtime.block_on(orchestrator.finish(session, &prompter))?
        }
    };
    prompter.progress().finish_and_clear();

    report_outcome(&outcome);
    Ok(())
}

/// Manual push of the active slot.
pub fn upload(key: &str) -> Result<(), AppError> {
    let ctx = Context::load_default()?;
    let profile = ProfileService::find(&ctx, key)?;
    let orchestrator = Orchestrator::new(ctx);
    let prompter = InquirePrompter::new(spinner());
    prompter
        .progress()
        .set_message(format!("Uploading '{}'...", profile.name));

    let result = orchestrator.upload(&profile.id, &prompter);
    prompter.progress().finish_and_clear();
    let report = result?;
    println!("{}", success(&format!("✓ Uploaded '{}'", profile.name)));
    print_report(&report);
    Ok(())
}

fn spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

fn ensure_risk_acknowledged(ctx: &Context) -> Result<(), AppError> {
    if ctx.settings.load()?.risk_acknowledged.is_some() {
        return Ok(());
    }
    println!("{}", warning(RISK_NOTICE));
    let accepted = Confirm::new("I understand. Continue?")
        .with_default(false)
        .prompt()
        .map_err(|_| AppError::Message("Cancelled".to_string()))?;
    if !accepted {
        return Err(AppError::Message(
            "the risk notice must be acknowledged before syncing".to_string(),
        ));
    }
    ctx.settings.write(
        FIELD_RISK_ACKNOWLEDGED,
        serde_json::Value::String(chrono::Local::now().to_rfc3339()),
    )
}

fn report_outcome(outcome: &Outcome) {
    match outcome {
        Outcome::Aborted(AbortReason::LockDeclined { holder }) => {
            println!(
                "{}",
                info(&format!("Sync aborted; the save stays checked out by '{holder}'."))
            );
        }
        Outcome::Aborted(AbortReason::DecisionDismissed) => {
            println!("{}", info("Sync cancelled; nothing was launched."));
        }
        Outcome::LaunchedNoSync => {
            println!("{}", info("Game launched without sync."));
        }
        Outcome::LaunchedAndSynced(PushResult::Pushed(report)) => {
            println!("{}", success("✓ Save uploaded to the cloud"));
            print_report(report);
        }
        Outcome::LaunchedAndSynced(PushResult::Skipped) => {
            println!("{}", warning("Upload skipped; the cloud copy was not changed."));
        }
        Outcome::LaunchedAndSynced(PushResult::Failed(message)) => {
            println!("{}", error(&format!("Upload failed: {message}")));
            println!(
                "{}",
                info("The checkout was released. Run `savetitan upload` to try again.")
            );
        }
    }
}

fn print_report(report: &SyncReport) {
    println!(
        "  {} copied, {} deleted, {} unchanged",
        highlight(&report.stats.copied.to_string()),
        highlight(&report.stats.deleted.to_string()),
        report.stats.unchanged
    );
    println!("  backup: {}", report.backup.path.display());
}
