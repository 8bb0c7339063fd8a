#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use savetitan_lib::services::process::ProcessHandle;
use savetitan_lib::services::{DivergenceChoice, DivergenceView, NewProfile, ProfileService};
use savetitan_lib::settings::FIELD_CLOUD_STORAGE_PATH;
use savetitan_lib::{
    AppError, Context, FileDescriptorStore, FileProfileStore, FileSettingsStore,
    GlobalSettingsStore, ProcessRunner, Profile, SyncMode, SyncPrompter,
};
use tempfile::TempDir;

pub const THIS_HOST: &str = "host-a";

/// Temp config dir, cloud root, save folder and game executable wired into a [`Context`].
pub struct Sandbox {
    _dir: TempDir,
    pub cloud: PathBuf,
    pub local: PathBuf,
    pub config: PathBuf,
    pub exe: PathBuf,
    pub runner: Arc<FakeRunner>,
    pub ctx: Context,
}

impl Sandbox {
    pub fn new() -> Self {
        Self::with_hostname(THIS_HOST)
    }

    pub fn with_hostname(hostname: &str) -> Self {
        let dir = TempDir::new().expect("create sandbox");
        let root = dir.path().to_path_buf();
        let cloud = root.join("cloud");
        let local = root.join("local").join("saves");
        let config = root.join("config");
        let exe = root.join("games").join("game.sh");
        for d in [&cloud, &local, &config] {
            fs::create_dir_all(d).expect("create sandbox dir");
        }
        write_file(&exe, "#!/bin/sh\nexit 0\n");
        make_executable(&exe);

        let settings = FileSettingsStore::new(config.join("settings.json"));
        settings
            .write(
                FIELD_CLOUD_STORAGE_PATH,
                serde_json::Value::String(cloud.to_string_lossy().into_owned()),
            )
            .expect("configure cloud path");

        let runner = Arc::new(FakeRunner::default());
        let ctx = Context {
            profiles: Arc::new(FileProfileStore::new(config.join("profiles"))),
            settings: Arc::new(settings),
            descriptors: Arc::new(FileDescriptorStore::new(&cloud)),
            runner: runner.clone(),
            hostname: hostname.to_string(),
        };

        Self {
            _dir: dir,
            cloud,
            local,
            config,
            exe,
            runner,
            ctx,
        }
    }

    /// Same stores, different machine name.
    pub fn as_host(&self, hostname: &str) -> Context {
        let mut ctx = self.ctx.clone();
        ctx.hostname = hostname.to_string();
        ctx
    }

    pub fn add_profile(&self, name: &str) -> Profile {
        ProfileService::add(
            &self.ctx,
            NewProfile {
                name: name.to_string(),
                game_executable: self.exe.clone(),
                local_save_folder: self.local.clone(),
                sync_mode: SyncMode::Sync,
            },
        )
        .expect("add profile")
    }

    pub fn profile(&self, id: &str) -> Profile {
        self.ctx.profiles.get(id).expect("read profile")
    }

    pub fn remote_slot(&self, profile: &Profile) -> PathBuf {
        profile.remote_slot_dir(&self.cloud)
    }

    pub fn write_local(&self, rel: &str, content: &str) {
        write_file(&self.local.join(rel), content);
    }

    pub fn write_remote(&self, profile: &Profile, rel: &str, content: &str) {
        write_file(&self.remote_slot(profile).join(rel), content);
    }

    pub fn read_local(&self, rel: &str) -> Option<String> {
        fs::read_to_string(self.local.join(rel)).ok()
    }

    pub fn read_remote(&self, profile: &Profile, rel: &str) -> Option<String> {
        fs::read_to_string(self.remote_slot(profile).join(rel)).ok()
    }
}

pub fn write_file(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().expect("parent dir")).expect("create parent");
    fs::write(path, content).expect("write file");
}

pub fn set_mtime(path: &Path, secs_since_epoch: u64) {
    let file = fs::File::options()
        .write(true)
        .open(path)
        .expect("open for mtime");
    file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs_since_epoch))
        .expect("set mtime");
}

#[cfg(unix)]
fn make_executable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).expect("chmod +x");
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) {}

// ============================================================================
// Fakes
// ============================================================================

/// Records launches and returns immediately from waits.
#[derive(Default)]
pub struct FakeRunner {
    pub launched: Mutex<Vec<PathBuf>>,
    pub waited_on: Mutex<Vec<Vec<String>>>,
    pub fail_wait: Mutex<bool>,
}

impl FakeRunner {
    pub fn launch_count(&self) -> usize {
        self.launched.lock().expect("launched lock").len()
    }
}

impl ProcessRunner for FakeRunner {
    fn launch(&self, executable: &Path) -> Result<ProcessHandle, AppError> {
        self.launched
            .lock()
            .expect("launched lock")
            .push(executable.to_path_buf());
        Ok(ProcessHandle {
            pid: 4242,
            executable: executable.to_path_buf(),
        })
    }

    fn wait_until_exited(&self, process_names: &[String]) -> Result<(), AppError> {
        self.waited_on
            .lock()
            .expect("waited lock")
            .push(process_names.to_vec());
        if *self.fail_wait.lock().expect("fail lock") {
            return Err(AppError::Message("process table unavailable".into()));
        }
        Ok(())
    }
}

/// Canned answers for every prompt, with a record of what was asked.
pub struct ScriptedPrompter {
    pub take_over_checkout: bool,
    pub divergence_choice: Option<DivergenceChoice>,
    pub upload_after_game: bool,
    pub retry: bool,
    pub override_prompts: Cell<u32>,
    pub views: RefCell<Vec<DivergenceView>>,
    pub notices: RefCell<Vec<String>>,
    pub game_finished_prompts: Cell<u32>,
}

impl Default for ScriptedPrompter {
    fn default() -> Self {
        Self {
            take_over_checkout: false,
            divergence_choice: None,
            upload_after_game: true,
            retry: false,
            override_prompts: Cell::new(0),
            views: RefCell::new(Vec::new()),
            notices: RefCell::new(Vec::new()),
            game_finished_prompts: Cell::new(0),
        }
    }
}

impl ScriptedPrompter {
    pub fn choosing(choice: DivergenceChoice) -> Self {
        Self {
            divergence_choice: Some(choice),
            ..Self::default()
        }
    }
}

impl SyncPrompter for ScriptedPrompter {
    fn confirm_checkout_override(&self, _holder: &str) -> bool {
        self.override_prompts.set(self.override_prompts.get() + 1);
        self.take_over_checkout
    }

    fn choose_divergence(&self, view: &DivergenceView) -> Option<DivergenceChoice> {
        self.views.borrow_mut().push(view.clone());
        self.divergence_choice
    }

    fn confirm_game_finished(&self, _profile: &Profile) -> bool {
        self.game_finished_prompts
            .set(self.game_finished_prompts.get() + 1);
        self.upload_after_game
    }

    fn retry_sync(&self, _error: &AppError, _attempt: u32) -> bool {
        self.retry
    }

    fn notify(&self, message: &str) {
        self.notices.borrow_mut().push(message.to_string());
    }
}
