use indicatif::ProgressBar;
use inquire::{Confirm, Select};

use crate::cli::ui::{create_table, highlight, info, warning};
use crate::error::AppError;
use crate::profile::Profile;
use crate::services::{DivergenceChoice, DivergenceView, SyncPrompter};
use crate::sync_policy::RetryHandler;

const DOWNLOAD: &str = "Download: replace the local copy with the cloud copy";
const UPLOAD: &str = "Upload: keep the local copy, it goes to the cloud after playing";
const NO_SYNC: &str = "Don't sync: play without syncing this time";
const UPLOAD_TO_CLOUD: &str = "Upload to Cloud";
const ABORT_SYNC: &str = "Abort Sync";

/// Terminal prompts. Any spinner passed in is paused while a prompt is on screen.
pub struct InquirePrompter {
    progress: ProgressBar,
}

impl Default for InquirePrompter {
    fn default() -> Self {
        Self::new(ProgressBar::hidden())
    }
}

impl InquirePrompter {
    pub fn new(progress: ProgressBar) -> Self {
        Self { progress }
    }

    pub fn progress(&self) -> &ProgressBar {
        &self.progress
    }
}

impl SyncPrompter for InquirePrompter {
    fn confirm_checkout_override(&self, holder: &str) -> bool {
        self.progress.suspend(|| {
            println!(
                "{}",
                warning(&format!(
                    "This save is checked out by '{holder}': someone started playing there and has not synced back."
                ))
            );
            Confirm::new("Take over the checkout and continue anyway?")
                .with_default(false)
                .prompt()
                .unwrap_or(false)
        })
    }

    fn choose_divergence(&self, view: &DivergenceView) -> Option<DivergenceChoice> {
        self.progress.suspend(|| {
            println!(
                "{}",
                highlight(&format!(
                    "The local and cloud saves of '{}' differ ({}).",
                    view.profile_name,
                    view.divergence.path().display()
                ))
            );
            let mut table = create_table();
            table.set_header(vec!["Copy", "Last modified"]);
            table.add_row(vec![view.remote_label().to_string(), view.remote_modified.clone()]);
            table.add_row(vec![view.local_label().to_string(), view.local_modified.clone()]);
            println!("{table}");

            let options = vec![DOWNLOAD, UPLOAD, NO_SYNC];
            let choice = Select::new("How do you want to continue?", options)
                .with_starting_cursor(if view.remote_newer { 0 } else { 1 })
                .prompt()
                .ok()?;
            match choice {
                DOWNLOAD => Some(DivergenceChoice::Download),
                UPLOAD => Some(DivergenceChoice::Upload),
                _ => Some(DivergenceChoice::NoSync),
            }
        })
    }

    fn confirm_game_finished(&self, profile: &Profile) -> bool {
        self.progress.suspend(|| {
            println!(
                "{}",
                info(&format!(
                    "'{}' is in progress. Choose an option once you are done playing.",
                    profile.name
                ))
            );
            matches!(
                Select::new("Game in progress", vec![UPLOAD_TO_CLOUD, ABORT_SYNC]).prompt(),
                Ok(UPLOAD_TO_CLOUD)
            )
        })
    }

    fn retry_sync(&self, error: &AppError, attempt: u32) -> bool {
        self.progress.suspend(|| {
            println!("{}", warning(&format!("Sync attempt {attempt} failed: {error}")));
            Confirm::new("Retry?")
                .with_default(true)
                .prompt()
                .unwrap_or(false)
        })
    }

    fn notify(&self, message: &str) {
        self.progress
            .suspend(|| eprintln!("{}", warning(message)));
    }
}

impl RetryHandler for InquirePrompter {
    fn retry_requested(&self, error: &AppError, attempt: u32) -> bool {
        self.retry_sync(error, attempt)
    }
}
