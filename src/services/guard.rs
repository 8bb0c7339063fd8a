use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Access, AppError};
use crate::settings::GlobalSettingsStore;

/// Whether `action` is allowed on `path`. A path that does not exist yet is not a blocker;
/// creating it is the caller's job.
pub fn is_permitted(path: &Path, action: Access) -> bool {
    let Ok(metadata) = fs::metadata(path) else {
        return !path.exists();
    };
    match action {
        Access::Read => {
            if metadata.is_dir() {
                fs::read_dir(path).is_ok()
            } else {
                fs::File::open(path).is_ok()
            }
        }
        Access::Write => !metadata.permissions().readonly(),
        Access::Execute => is_executable(&metadata),
    }
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(metadata: &fs::Metadata) -> bool {
    metadata.is_file() || metadata.is_dir()
}

/// Like [`is_permitted`], but a denial becomes a `PermissionDenied` naming the path and action.
pub fn check(path: &Path, kind: &str, action: Access) -> Result<(), AppError> {
    if is_permitted(path, action) {
        return Ok(());
    }
    log::warn!("permission denied to {action} the {kind}: {}", path.display());
    Err(AppError::PermissionDenied {
        path: path.to_path_buf(),
        kind: kind.to_string(),
        action,
    })
}

/// Resolve the configured cloud root and make sure it can be read.
pub fn network_reachable(settings: &dyn GlobalSettingsStore) -> Result<PathBuf, AppError> {
    let root = settings.load()?.cloud_root()?;
    check(&root, "cloud storage", Access::Read)?;
    Ok(root)
}

/// Stricter variant for entry points: the cloud root must also exist.
pub fn require_cloud_root(settings: &dyn GlobalSettingsStore) -> Result<PathBuf, AppError> {
    let root = network_reachable(settings)?;
    if !root.is_dir() {
        return Err(AppError::Config(format!(
            "cloud storage path is invalid (not a directory): {}",
            root.display()
        )));
    }
    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{FileSettingsStore, FIELD_CLOUD_STORAGE_PATH};
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn missing_path_is_not_a_blocker() {
        let dir = TempDir::new().expect("tempdir");
        let missing = dir.path().join("not-yet");
        for action in [Access::Read, Access::Write, Access::Execute] {
            assert!(is_permitted(&missing, action));
        }
    }

    #[test]
    fn readonly_file_denies_write() {
        let dir = TempDir::new().expect("tempdir");
        let file = dir.path().join("save.dat");
        fs::write(&file, b"data").expect("write");
        assert!(check(&file, "save file", Access::Write).is_ok());

        let mut perms = fs::metadata(&file).expect("meta").permissions();
        perms.set_readonly(true);
        fs::set_permissions(&file, perms).expect("chmod");

        let err = check(&file, "save file", Access::Write).expect_err("readonly");
        assert!(matches!(
            err,
            AppError::PermissionDenied {
                action: Access::Write,
                ..
            }
        ));
    }

    #[cfg(unix)]
    #[test]
    fn execute_bit_is_checked() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().expect("tempdir");
        let script = dir.path().join("game.sh");
        fs::write(&script, "#!/bin/sh\n").expect("write");
        fs::set_permissions(&script, fs::Permissions::from_mode(0o644)).expect("chmod");
        assert!(!is_permitted(&script, Access::Execute));

        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).expect("chmod");
        assert!(is_permitted(&script, Access::Execute));
    }

    #[test]
    fn unset_cloud_root_fails_reachability() {
        let dir = TempDir::new().expect("tempdir");
        let store = FileSettingsStore::new(dir.path().join("settings.json"));
        assert!(matches!(
            network_reachable(&store),
            Err(AppError::Config(_))
        ));

        store
            .write(
                FIELD_CLOUD_STORAGE_PATH,
                json!(dir.path().join("missing").to_string_lossy()),
            )
            .expect("write");
        // Reachable (nothing denies it) but not a usable root yet.
        assert!(network_reachable(&store).is_ok());
        assert!(matches!(
            require_cloud_root(&store),
            Err(AppError::Config(_))
        ));
    }
}
