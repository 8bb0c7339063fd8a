use std::path::{Path, PathBuf};

use thiserror::Error;

/// Access kind checked by the permission guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    Execute,
}

impl Access {
    pub fn as_str(&self) -> &'static str {
        match self {
            Access::Read => "read",
            Access::Write => "write",
            Access::Execute => "execute",
        }
    }
}

impl std::fmt::Display for Access {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    /// Cloud storage path unset or unusable. Fatal to the invocation.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("permission denied to {action} the {kind}: {}", path.display())]
    PermissionDenied {
        path: PathBuf,
        kind: String,
        action: Access,
    },

    #[error("profile not found: {0}")]
    ProfileNotFound(String),

    #[error("a profile named '{0}' already exists")]
    DuplicateProfileName(String),

    #[error("backup failed for {}: {reason}", path.display())]
    BackupFailed { path: PathBuf, reason: String },

    /// Copy/delete failure in the middle of a directory walk. The only retryable kind.
    #[error("sync failed ({context}): {source}")]
    Sync {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("a sync for profile '{0}' is already running in this process")]
    SyncInProgress(String),

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{context}: {source}")]
    IoContext {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("JSON serialization failed: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    #[error("invalid descriptor {}: {message}", path.display())]
    Toml { path: PathBuf, message: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Message(String),
}

impl AppError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn json(path: impl AsRef<Path>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn toml(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::Toml {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }

    pub fn sync(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Sync {
            context: context.into(),
            source,
        }
    }

    pub fn backup(path: impl AsRef<Path>, reason: impl std::fmt::Display) -> Self {
        Self::BackupFailed {
            path: path.as_ref().to_path_buf(),
            reason: reason.to_string(),
        }
    }

    /// Only mid-walk transfer failures may be offered to the user for retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Sync { .. })
    }
}
