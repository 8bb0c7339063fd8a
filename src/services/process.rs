use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;
use std::time::Duration;

use sysinfo::{Process, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System, UpdateKind};

use crate::error::AppError;

/// A launched game process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    pub pid: u32,
    pub executable: PathBuf,
}

/// Starts the game and watches for it to go away.
pub trait ProcessRunner: Send + Sync {
    fn launch(&self, executable: &Path) -> Result<ProcessHandle, AppError>;

    /// Blocks until none of `process_names` is running. A name that vanishes and comes back
    /// before the confirmation re-check counts as still running.
    fn wait_until_exited(&self, process_names: &[String]) -> Result<(), AppError>;
}

pub struct SystemProcessRunner {
    poll_interval: Duration,
    confirm_delay: Duration,
}

impl Default for SystemProcessRunner {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            confirm_delay: Duration::from_secs(5),
        }
    }
}

impl SystemProcessRunner {
    pub fn new(poll_interval: Duration, confirm_delay: Duration) -> Self {
        Self {
            poll_interval,
            confirm_delay,
        }
    }

    /// Bare command names are looked up on PATH.
    fn resolve(executable: &Path) -> Result<PathBuf, AppError> {
        if executable.exists() {
            return Ok(executable.to_path_buf());
        }
        if executable.components().count() == 1 {
            if let Ok(found) = which::which(executable) {
                return Ok(found);
            }
        }
        Err(AppError::InvalidInput(format!(
            "game executable not found: {}",
            executable.display()
        )))
    }

    fn any_running(system: &mut System, process_names: &[String]) -> bool {
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing()
                .with_exe(UpdateKind::OnlyIfNotSet)
                .with_cmd(UpdateKind::OnlyIfNotSet),
        );
        system
            .processes()
            .values()
            .filter(|p| p.status() != ProcessStatus::Zombie)
            .any(|p| process_matches(p, process_names))
    }
}

/// Linux truncates `name()` to the 15-byte `comm`, so the executable path and `argv[0]`
/// are checked as well.
fn process_matches(process: &Process, wanted: &[String]) -> bool {
    if comm_matches(&process.name().to_string_lossy(), wanted) {
        return true;
    }
    let exe = process
        .exe()
        .and_then(Path::file_name)
        .map(|n| n.to_string_lossy().into_owned());
    let argv0 = process
        .cmd()
        .first()
        .and_then(|arg| Path::new(arg).file_name())
        .map(|n| n.to_string_lossy().into_owned());
    [exe, argv0]
        .into_iter()
        .flatten()
        .any(|name| names_match(&name, wanted))
}

const COMM_LEN: usize = 15;

/// Like [`names_match`], but a `comm` cut at the kernel limit matches any wanted name it
/// is a prefix of.
pub fn comm_matches(comm: &str, wanted: &[String]) -> bool {
    if names_match(comm, wanted) {
        return true;
    }
    if comm.len() < COMM_LEN {
        return false;
    }
    let comm = comm.trim().to_lowercase();
    wanted
        .iter()
        .any(|w| w.trim().to_lowercase().starts_with(&comm))
}

impl ProcessRunner for SystemProcessRunner {
    fn launch(&self, executable: &Path) -> Result<ProcessHandle, AppError> {
        let resolved = Self::resolve(executable)?;
        let mut command = Command::new(&resolved);
        if let Some(dir) = resolved.parent().filter(|p| !p.as_os_str().is_empty()) {
            command.current_dir(dir);
        }
        let mut child = command.spawn().map_err(|e| AppError::IoContext {
            context: format!("failed to launch {}", resolved.display()),
            source: e,
        })?;
        let pid = child.id();
        log::info!("launched {} (pid {pid})", resolved.display());

        // Reap the child so an exited game does not linger as a zombie in the process table.
        thread::spawn(move || {
            let _ = child.wait();
        });

        Ok(ProcessHandle {
            pid,
            executable: resolved,
        })
    }

    fn wait_until_exited(&self, process_names: &[String]) -> Result<(), AppError> {
        if process_names.is_empty() {
            return Ok(());
        }
        let mut system = System::new();
        loop {
            if Self::any_running(&mut system, process_names) {
                thread::sleep(self.poll_interval);
                continue;
            }
            // Launchers often exit and respawn the real game under the same name.
            thread::sleep(self.confirm_delay);
            if !Self::any_running(&mut system, process_names) {
                log::info!("game processes exited: {}", process_names.join(", "));
                return Ok(());
            }
            log::debug!("process reappeared during confirmation, still waiting");
        }
    }
}

/// Case-insensitive match that also ignores a trailing `.exe`.
pub fn names_match(running: &str, wanted: &[String]) -> bool {
    let running = strip_exe(running);
    wanted.iter().any(|w| strip_exe(w) == running)
}

fn strip_exe(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    match lower.strip_suffix(".exe") {
        Some(stem) => stem.to_string(),
        None => lower,
    }
}
