//! Scoped temporary files for one extraction attempt

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::debug;

const TEMP_PREFIX: &str = "avtrack-";

/// A temp file that could not be removed during teardown.
#[derive(Debug)]
pub struct CleanupWarning {
    pub path: PathBuf,
    pub error: io::Error,
}

impl fmt::Display for CleanupWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Could not delete {}: {}", self.path.display(), self.error)
    }
}

/// Owns every temp file a workflow creates. Each handle is deleted by
/// [`TempFileRegistry::release`], or on drop if release is never called.
#[derive(Debug)]
pub struct TempFileRegistry {
    dir: PathBuf,
    handles: Vec<TempPath>,
}

impl TempFileRegistry {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            handles: Vec::new(),
        }
    }

    /// Create an empty, uniquely named file ending in `suffix`
    pub fn create(&mut self, suffix: &str) -> io::Result<PathBuf> {
        let path = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(suffix)
            .tempfile_in(&self.dir)?
            .into_temp_path();
        let owned = path.to_path_buf();
        debug!("Registered temp file {}", owned.display());
        self.handles.push(path);
        Ok(owned)
    }

    /// Take ownership of a path produced by some other step
    pub fn adopt(&mut self, path: impl Into<PathBuf>) -> io::Result<PathBuf> {
        let path = TempPath::try_from_path(path)?;
        let owned = path.to_path_buf();
        debug!("Registered temp file {}", owned.display());
        self.handles.push(path);
        Ok(owned)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.handles.iter().any(|h| **h == *path)
    }

    /// Delete every registered file, independently of each other. Files that
    /// are already gone are not reported.
    pub fn release(&mut self) -> Vec<CleanupWarning> {
        let mut warnings = Vec::new();
        for handle in self.handles.drain(..) {
            let path = handle.to_path_buf();
            match handle.close() {
                Ok(()) => debug!("Deleted {}", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(error) => warnings.push(CleanupWarning { path, error }),
            }
        }
        warnings
    }
}
