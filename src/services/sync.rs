use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{Access, AppError};
use crate::profile::{OmittedPaths, Profile};
use crate::services::backup::{BackupReport, BackupService, Side};
use crate::services::compare::{self, files_identical};
use crate::services::guard;
use crate::sync_policy::{RetryHandler, RetryPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Push: local save folder to the remote slot.
    ToCloud,
    /// Pull: remote slot to the local save folder.
    ToLocal,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::ToCloud => "upload",
            Direction::ToLocal => "download",
        }
    }

    /// The side that gets overwritten.
    pub fn destination_side(&self) -> Side {
        match self {
            Direction::ToCloud => Side::Remote,
            Direction::ToLocal => Side::Local,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MirrorStats {
    pub copied: usize,
    pub deleted: usize,
    pub unchanged: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub direction: Direction,
    pub stats: MirrorStats,
    pub attempts: u32,
    pub backup: BackupReport,
}

pub struct SyncService;

impl SyncService {
    pub fn sync_to_cloud(
        profile: &Profile,
        cloud_root: &Path,
        policy: &RetryPolicy,
        handler: &dyn RetryHandler,
    ) -> Result<SyncReport, AppError> {
        Self::sync(profile, cloud_root, Direction::ToCloud, policy, handler)
    }

    pub fn sync_to_local(
        profile: &Profile,
        cloud_root: &Path,
        policy: &RetryPolicy,
        handler: &dyn RetryHandler,
    ) -> Result<SyncReport, AppError> {
        Self::sync(profile, cloud_root, Direction::ToLocal, policy, handler)
    }

    /// Back up the destination once, then mirror and verify under `policy`.
    ///
    /// The backup is taken before the first attempt only, so it always holds the
    /// destination's pre-sync state even when a retry follows a partial copy.
    pub fn sync(
        profile: &Profile,
        cloud_root: &Path,
        direction: Direction,
        policy: &RetryPolicy,
        handler: &dyn RetryHandler,
    ) -> Result<SyncReport, AppError> {
        let remote = profile.remote_slot_dir(cloud_root);
        let (source, destination): (PathBuf, PathBuf) = match direction {
            Direction::ToCloud => (profile.local_save_folder.clone(), remote),
            Direction::ToLocal => (remote, profile.local_save_folder.clone()),
        };

        guard::check(&source, "save folder", Access::Read)?;
        guard::check(&destination, "save folder", Access::Write)?;
        // A missing source would otherwise mirror as "delete everything".
        if !source.is_dir() {
            return Err(AppError::io(
                &source,
                io::Error::new(io::ErrorKind::NotFound, "save folder does not exist"),
            ));
        }
        fs::create_dir_all(&destination).map_err(|e| AppError::io(&destination, e))?;

        let backup = BackupService::backup(profile, cloud_root, direction.destination_side())?;

        log::info!(
            "{direction} '{}' ({}): {} -> {}",
            profile.name,
            profile.slot_key(),
            source.display(),
            destination.display()
        );

        let mut attempts = 0;
        let stats = policy.run(handler, |attempt| {
            attempts = attempt;
            let stats = mirror(&source, &destination, &profile.omitted_paths)?;
            verify(&source, &destination, &profile.omitted_paths)?;
            Ok(stats)
        })?;

        log::info!(
            "{direction} finished: {} copied, {} deleted, {} unchanged",
            stats.copied,
            stats.deleted,
            stats.unchanged
        );
        Ok(SyncReport {
            direction,
            stats,
            attempts,
            backup,
        })
    }
}

/// Make `destination` an exact copy of `source`, ignoring omitted paths on both sides.
pub fn mirror(
    source: &Path,
    destination: &Path,
    omitted: &OmittedPaths,
) -> Result<MirrorStats, AppError> {
    let mut stats = MirrorStats::default();
    fs::create_dir_all(destination)
        .map_err(|e| AppError::sync(format!("create {}", destination.display()), e))?;

    // Copy pass.
    for entry in walk(source, omitted) {
        let entry = entry.map_err(|e| AppError::sync("read source tree", e))?;
        let target = destination.join(&entry.relative);
        if entry.is_dir {
            if target.is_file() {
                fs::remove_file(&target)
                    .map_err(|e| AppError::sync(format!("delete {}", target.display()), e))?;
            }
            fs::create_dir_all(&target)
                .map_err(|e| AppError::sync(format!("create {}", target.display()), e))?;
            continue;
        }

        if target.is_dir() {
            fs::remove_dir_all(&target)
                .map_err(|e| AppError::sync(format!("delete {}", target.display()), e))?;
        } else if target.is_file() {
            let same = files_identical(&entry.path, &target)
                .map_err(|e| AppError::sync(format!("compare {}", entry.relative.display()), e))?;
            if same {
                stats.unchanged += 1;
                continue;
            }
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| AppError::sync(format!("create {}", parent.display()), e))?;
        }
        fs::copy(&entry.path, &target)
            .map_err(|e| AppError::sync(format!("copy {}", entry.relative.display()), e))?;
        log::debug!("copied {}", entry.relative.display());
        stats.copied += 1;
    }

    // Prune pass, deepest entries first so emptied directories can go too.
    let mut stale: Vec<WalkEntry> = Vec::new();
    for entry in walk_contents_first(destination, omitted) {
        stale.push(entry.map_err(|e| AppError::sync("read destination tree", e))?);
    }
    for entry in stale {
        let counterpart = source.join(&entry.relative);
        if entry.is_dir {
            if counterpart.is_dir() || !dir_is_empty(&entry.path) {
                continue;
            }
            fs::remove_dir(&entry.path)
                .map_err(|e| AppError::sync(format!("delete {}", entry.relative.display()), e))?;
            log::debug!("removed empty folder {}", entry.relative.display());
        } else if !counterpart.is_file() {
            fs::remove_file(&entry.path)
                .map_err(|e| AppError::sync(format!("delete {}", entry.relative.display()), e))?;
            log::debug!("deleted {}", entry.relative.display());
            stats.deleted += 1;
        }
    }

    Ok(stats)
}

/// Post-copy check: every source file matches and the counts agree.
fn verify(source: &Path, destination: &Path, omitted: &OmittedPaths) -> Result<(), AppError> {
    let result = compare::compare(source, destination, omitted)?;
    if result.identical && result.local_file_count == result.remote_file_count {
        return Ok(());
    }
    log::warn!(
        "verification failed: {:?} ({} vs {} files)",
        result.divergence,
        result.local_file_count,
        result.remote_file_count
    );
    Err(AppError::sync(
        format!("verify {}", destination.display()),
        io::Error::other("mismatch in directory contents"),
    ))
}

struct WalkEntry {
    relative: PathBuf,
    path: PathBuf,
    is_dir: bool,
}

fn walk(root: &Path, omitted: &OmittedPaths) -> impl Iterator<Item = io::Result<WalkEntry>> {
    walk_with(WalkDir::new(root).min_depth(1).sort_by_file_name(), root, omitted)
}

fn walk_contents_first(
    root: &Path,
    omitted: &OmittedPaths,
) -> impl Iterator<Item = io::Result<WalkEntry>> {
    walk_with(
        WalkDir::new(root).min_depth(1).contents_first(true),
        root,
        omitted,
    )
}

fn walk_with(
    walker: WalkDir,
    root: &Path,
    omitted: &OmittedPaths,
) -> impl Iterator<Item = io::Result<WalkEntry>> {
    let root = root.to_path_buf();
    let filter_root = root.clone();
    let omitted = omitted.clone();
    walker
        .into_iter()
        .filter_entry(move |e| match e.path().strip_prefix(&filter_root) {
            Ok(rel) => !omitted.contains(rel),
            Err(_) => true,
        })
        .filter_map(move |entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => return Some(Err(io::Error::from(e))),
            };
            let file_type = entry.file_type();
            if !file_type.is_dir() && !file_type.is_file() {
                return None;
            }
            let relative = entry.path().strip_prefix(&root).ok()?.to_path_buf();
            Some(Ok(WalkEntry {
                relative,
                is_dir: file_type.is_dir(),
                path: entry.into_path(),
            }))
        })
}

fn dir_is_empty(dir: &Path) -> bool {
    fs::read_dir(dir)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}
