//! Byte-exact comparison of a local save tree against its remote slot.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local};
use walkdir::WalkDir;

use crate::error::AppError;
use crate::profile::OmittedPaths;

const COMPARE_BUF_SIZE: usize = 64 * 1024;

/// Why two trees are not identical. Only the first one found is reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Divergence {
    /// Local file with no remote counterpart.
    MissingRemote(PathBuf),
    ContentDiffers(PathBuf),
}

impl Divergence {
    pub fn path(&self) -> &Path {
        match self {
            Divergence::MissingRemote(p) | Divergence::ContentDiffers(p) => p,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonResult {
    pub identical: bool,
    pub divergence: Option<Divergence>,
    pub local_file_count: usize,
    pub remote_file_count: usize,
    pub latest_local_mtime: SystemTime,
    pub latest_remote_mtime: SystemTime,
}

impl ComparisonResult {
    pub fn remote_is_newer(&self) -> bool {
        self.latest_remote_mtime > self.latest_local_mtime
    }
}

/// A regular file found under a root, minus omitted paths.
#[derive(Debug, Clone)]
pub(crate) struct TreeFile {
    pub relative: PathBuf,
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// Regular files under `root`, skipping omitted paths (and whole omitted directories).
/// A missing root is an empty tree.
pub(crate) fn walk_files(root: &Path, omitted: &OmittedPaths) -> io::Result<Vec<TreeFile>> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| match entry.path().strip_prefix(root) {
            Ok(rel) => !omitted.contains(rel),
            Err(_) => true,
        });
    for entry in walker {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .map(Path::to_path_buf)
            .map_err(|e| io::Error::other(e.to_string()))?;
        let modified = entry
            .metadata()
            .map_err(io::Error::from)?
            .modified()
            .unwrap_or(SystemTime::UNIX_EPOCH);
        files.push(TreeFile {
            relative,
            path: entry.into_path(),
            modified,
        });
    }
    Ok(files)
}

/// Byte-for-byte equality. Sizes are checked first.
pub fn files_identical(a: &Path, b: &Path) -> io::Result<bool> {
    if fs::metadata(a)?.len() != fs::metadata(b)?.len() {
        return Ok(false);
    }
    let mut ra = BufReader::new(File::open(a)?);
    let mut rb = BufReader::new(File::open(b)?);
    let mut buf_a = vec![0u8; COMPARE_BUF_SIZE];
    let mut buf_b = vec![0u8; COMPARE_BUF_SIZE];
    loop {
        let n = read_full(&mut ra, &mut buf_a)?;
        let m = read_full(&mut rb, &mut buf_b)?;
        if n != m || buf_a[..n] != buf_b[..m] {
            return Ok(false);
        }
        if n == 0 {
            return Ok(true);
        }
    }
}

fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// First local divergence from `remote`, or `None` if every local file has an identical
/// remote twin. Files only present remotely are not considered here.
pub(crate) fn first_divergence(
    local_files: &[TreeFile],
    remote: &Path,
) -> io::Result<Option<Divergence>> {
    for file in local_files {
        let twin = remote.join(&file.relative);
        if !twin.is_file() {
            log::debug!("missing remotely: {}", file.relative.display());
            return Ok(Some(Divergence::MissingRemote(file.relative.clone())));
        }
        if !files_identical(&file.path, &twin)? {
            log::debug!("content differs: {}", file.relative.display());
            return Ok(Some(Divergence::ContentDiffers(file.relative.clone())));
        }
    }
    Ok(None)
}

pub fn compare(
    local: &Path,
    remote: &Path,
    omitted: &OmittedPaths,
) -> Result<ComparisonResult, AppError> {
    let local_files = walk_files(local, omitted).map_err(|e| AppError::io(local, e))?;
    let remote_files = walk_files(remote, omitted).map_err(|e| AppError::io(remote, e))?;
    let divergence = first_divergence(&local_files, remote).map_err(|e| AppError::io(remote, e))?;

    Ok(ComparisonResult {
        identical: divergence.is_none(),
        divergence,
        local_file_count: local_files.len(),
        remote_file_count: remote_files.len(),
        latest_local_mtime: latest_of(&local_files),
        latest_remote_mtime: latest_of(&remote_files),
    })
}

fn latest_of(files: &[TreeFile]) -> SystemTime {
    files
        .iter()
        .map(|f| f.modified)
        .max()
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

/// Newest modification time under `dir`, or the epoch for an empty tree.
pub fn latest_mtime(dir: &Path, omitted: &OmittedPaths) -> Result<SystemTime, AppError> {
    let files = walk_files(dir, omitted).map_err(|e| AppError::io(dir, e))?;
    Ok(latest_of(&files))
}

pub fn count_files(dir: &Path, omitted: &OmittedPaths) -> Result<usize, AppError> {
    Ok(walk_files(dir, omitted)
        .map_err(|e| AppError::io(dir, e))?
        .len())
}

/// Exists and has at least one entry.
pub fn has_content(dir: &Path) -> bool {
    fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

/// `January 02, 2024, 03:04:05 PM` in local time.
pub fn format_mtime(time: SystemTime) -> String {
    let local: DateTime<Local> = time.into();
    local.format("%B %d, %Y, %I:%M:%S %p").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, content).expect("write");
    }

    fn set_mtime(root: &Path, rel: &str, secs: u64) {
        let file = File::options()
            .write(true)
            .open(root.join(rel))
            .expect("open");
        file.set_modified(SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(secs))
            .expect("set mtime");
    }

    #[test]
    fn identical_trees_match() {
        let local = TempDir::new().expect("tempdir");
        let remote = TempDir::new().expect("tempdir");
        for root in [local.path(), remote.path()] {
            write(root, "slot1.sav", "hp=10");
            write(root, "profiles/user.cfg", "vsync=1");
        }

        let result = compare(local.path(), remote.path(), &OmittedPaths::new()).expect("compare");
        assert!(result.identical);
        assert_eq!(result.local_file_count, 2);
        assert_eq!(result.remote_file_count, 2);
    }

    #[test]
    fn same_size_different_bytes_diverge() {
        let local = TempDir::new().expect("tempdir");
        let remote = TempDir::new().expect("tempdir");
        write(local.path(), "slot1.sav", "hp=10");
        write(remote.path(), "slot1.sav", "hp=99");

        let result = compare(local.path(), remote.path(), &OmittedPaths::new()).expect("compare");
        assert!(!result.identical);
        assert_eq!(
            result.divergence,
            Some(Divergence::ContentDiffers(PathBuf::from("slot1.sav")))
        );
    }

    #[test]
    fn missing_remote_file_diverges_but_remote_only_file_does_not() {
        let local = TempDir::new().expect("tempdir");
        let remote = TempDir::new().expect("tempdir");
        write(local.path(), "a.sav", "a");
        write(remote.path(), "a.sav", "a");
        write(remote.path(), "c.sav", "c");

        let result = compare(local.path(), remote.path(), &OmittedPaths::new()).expect("compare");
        assert!(result.identical, "remote-only files are left to the count check");
        assert_eq!(result.remote_file_count, 2);

        write(local.path(), "b.sav", "b");
        let result = compare(local.path(), remote.path(), &OmittedPaths::new()).expect("compare");
        assert_eq!(
            result.divergence,
            Some(Divergence::MissingRemote(PathBuf::from("b.sav")))
        );
    }

    #[test]
    fn omitted_files_are_ignored_for_divergence_and_counts() {
        let local = TempDir::new().expect("tempdir");
        let remote = TempDir::new().expect("tempdir");
        write(local.path(), "a.sav", "a");
        write(remote.path(), "a.sav", "a");
        write(local.path(), "cache/shader.bin", "local");
        write(remote.path(), "cache/shader.bin", "remote");
        write(local.path(), "machine.cfg", "only-here");

        let omitted: OmittedPaths = ["cache", "machine.cfg"].into_iter().collect();
        let result = compare(local.path(), remote.path(), &omitted).expect("compare");
        assert!(result.identical);
        assert_eq!(result.local_file_count, 1);
        assert_eq!(result.remote_file_count, 1);
    }

    #[test]
    fn latest_mtime_skips_omitted_and_floors_at_epoch() {
        let dir = TempDir::new().expect("tempdir");
        assert_eq!(
            latest_mtime(&dir.path().join("missing"), &OmittedPaths::new()).expect("empty"),
            SystemTime::UNIX_EPOCH
        );

        write(dir.path(), "a.sav", "a");
        write(dir.path(), "log.txt", "noise");
        set_mtime(dir.path(), "a.sav", 1_000);
        set_mtime(dir.path(), "log.txt", 9_000);

        let omitted: OmittedPaths = ["log.txt"].into_iter().collect();
        let latest = latest_mtime(dir.path(), &omitted).expect("latest");
        assert_eq!(
            latest,
            SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_000)
        );
    }

    #[test]
    fn has_content_distinguishes_missing_empty_and_populated() {
        let dir = TempDir::new().expect("tempdir");
        assert!(!has_content(&dir.path().join("nope")));
        assert!(!has_content(dir.path()));
        write(dir.path(), "x", "1");
        assert!(has_content(dir.path()));
    }
}
