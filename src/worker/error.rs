//! Error types for launching and executing workers.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Error type for child process launch failures.
#[derive(thiserror::Error, Debug)]
pub enum LaunchError {
    /// The executable does not exist.
    #[error("Executable not found: {}", path.display())]
    NotFound { path: PathBuf },
    /// The executable exists but cannot be run.
    #[error("Permission denied launching {}", path.display())]
    PermissionDenied { path: PathBuf },
    /// Any other spawn failure.
    #[error("Failed to launch {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LaunchError {
    /// Classify a spawn error by its `io::ErrorKind`.
    pub(crate) fn from_io(err: std::io::Error, path: &Path) -> Self {
        match err.kind() {
            ErrorKind::NotFound => Self::NotFound {
                path: path.to_path_buf(),
            },
            ErrorKind::PermissionDenied => Self::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => Self::Io {
                path: path.to_path_buf(),
                source: err,
            },
        }
    }
}

/// Error type for the synchronous exec variant.
#[derive(thiserror::Error, Debug)]
pub enum ExecError {
    /// The child never launched.
    #[error(transparent)]
    Launch(#[from] LaunchError),
    /// The execution was cancelled, individually or by a process-wide
    /// shutdown, before the child exited on its own.
    #[error("Execution cancelled")]
    Cancelled,
}
