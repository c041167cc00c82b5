//! Logical worker-name resolution.
//!
//! Loading of worker settings files is out of scope for this crate; callers
//! provide a [`PathResolver`] and we only consume the narrow
//! name-to-executable mapping.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

/// Error type for logical-name resolution.
#[derive(thiserror::Error, Debug)]
pub enum ResolveError {
    /// No executable is registered under the given name.
    #[error("No executable registered for worker \"{name}\"")]
    NotFound { name: String },
}

/// Maps a logical worker name to a real executable path.
pub trait PathResolver: Send + Sync {
    /// Resolve `name` to an executable path.
    ///
    /// # Errors
    ///
    /// Returns `ResolveError::NotFound` when the name is unknown.
    fn resolve(&self, name: &str) -> Result<PathBuf, ResolveError>;
}

/// In-memory resolver backed by an explicit name-to-path table.
///
/// Names on the passthrough list resolve to themselves, so tools expected on
/// `PATH` (the classic case being `git`) work without an absolute path.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    entries: HashMap<String, PathBuf>,
    passthrough: HashSet<String>,
}

impl StaticResolver {
    /// Create an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker name with its executable path.
    #[must_use]
    pub fn with_worker(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.entries.insert(name.into(), path.into());
        self
    }

    /// Allow a name to resolve to itself (found via `PATH`).
    #[must_use]
    pub fn with_passthrough(mut self, name: impl Into<String>) -> Self {
        self.passthrough.insert(name.into());
        self
    }
}

impl PathResolver for StaticResolver {
    fn resolve(&self, name: &str) -> Result<PathBuf, ResolveError> {
        if let Some(path) = self.entries.get(name) {
            return Ok(path.clone());
        }
        if self.passthrough.contains(name) {
            return Ok(PathBuf::from(name));
        }
        Err(ResolveError::NotFound {
            name: name.to_string(),
        })
    }
}
