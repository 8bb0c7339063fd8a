use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::error::AppError;
use crate::profile::Profile;

/// Which copy of a save slot is about to be overwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Local,
    Remote,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Local => "local",
            Side::Remote => "cloud",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReport {
    pub path: PathBuf,
    pub files: usize,
    /// SHA-256 over the backed-up tree, see [`tree_digest`].
    pub digest: String,
}

pub struct BackupService;

impl BackupService {
    /// Snapshot `side`'s current copy of the active slot into `<cloud>/<id>/save<N>.bak`.
    ///
    /// Backups always live under the cloud root, whichever side is being saved. Only one
    /// generation is kept.
    pub fn backup(profile: &Profile, cloud_root: &Path, side: Side) -> Result<BackupReport, AppError> {
        let source = match side {
            Side::Local => profile.local_save_folder.clone(),
            Side::Remote => profile.remote_slot_dir(cloud_root),
        };
        let target = profile.remote_backup_dir(cloud_root);
        log::info!(
            "backing up {} copy of '{}' ({}) to {}",
            side.as_str(),
            profile.name,
            profile.slot_key(),
            target.display()
        );
        Self::backup_dir(&source, &target)
    }

    /// Replace `target` with a verified copy of `source`.
    pub fn backup_dir(source: &Path, target: &Path) -> Result<BackupReport, AppError> {
        if !source.is_dir() {
            return Err(AppError::backup(
                target,
                format!("source folder does not exist: {}", source.display()),
            ));
        }

        if target.exists() {
            fs::remove_dir_all(target)
                .map_err(|e| AppError::backup(target, format!("could not remove old backup: {e}")))?;
        }

        let files = copy_tree(source, target).map_err(|e| AppError::backup(target, e))?;

        let expected = tree_digest(source).map_err(|e| AppError::backup(target, e))?;
        let actual = tree_digest(target).map_err(|e| AppError::backup(target, e))?;
        if expected != actual {
            return Err(AppError::backup(target, "backup does not match its source"));
        }

        log::debug!("backup of {} holds {files} file(s)", source.display());
        Ok(BackupReport {
            path: target.to_path_buf(),
            files,
            digest: actual,
        })
    }
}

/// Recursive copy of every regular file and directory under `source` into `target`.
/// Returns the number of files copied.
pub(crate) fn copy_tree(source: &Path, target: &Path) -> io::Result<usize> {
    fs::create_dir_all(target)?;
    let mut files = 0;
    for entry in WalkDir::new(source).min_depth(1) {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| io::Error::other(e.to_string()))?;
        let dest = target.join(relative);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&dest)?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &dest)?;
            files += 1;
        } else {
            log::debug!("skipping non-regular entry {}", entry.path().display());
        }
    }
    Ok(files)
}

/// Order-stable SHA-256 over relative paths and file contents.
pub fn tree_digest(root: &Path) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| io::Error::other(e.to_string()))?;
        hasher.update(relative.to_string_lossy().replace('\\', "/").as_bytes());
        hasher.update([0u8]);
        let mut file = File::open(entry.path())?;
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        hasher.update([0u8]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
