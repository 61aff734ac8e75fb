//! Per-request scratch directories.
//!
//! A [`ScratchDir`] is removed when it is released or dropped, so every exit
//! path of a conversion (success, error, timeout, cancellation) cleans up.

use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// Root under which request-scoped scratch directories are created.
#[derive(Debug, Clone)]
pub struct ScratchSpace {
    root: PathBuf,
}

impl ScratchSpace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates a fresh directory namespaced by `request_id`.
    pub fn acquire(&self, request_id: &str) -> io::Result<ScratchDir> {
        std::fs::create_dir_all(&self.root)?;

        let prefix: String = request_id
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
            .take(64)
            .collect();

        let dir = tempfile::Builder::new()
            .prefix(&format!("{}-", prefix))
            .tempdir_in(&self.root)?;

        debug!(path = %dir.path().display(), "Acquired scratch directory");
        Ok(ScratchDir { dir: Some(dir) })
    }

    /// Number of scratch directories currently present under the root.
    pub fn active_count(&self) -> io::Result<usize> {
        match std::fs::read_dir(&self.root) {
            Ok(entries) => Ok(entries.count()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e),
        }
    }
}

/// A scratch directory owned by one conversion.
#[derive(Debug)]
pub struct ScratchDir {
    dir: Option<TempDir>,
}

impl ScratchDir {
    pub fn path(&self) -> &Path {
        match &self.dir {
            Some(dir) => dir.path(),
            None => Path::new(""),
        }
    }

    /// Path of a file named `name` inside the directory.
    pub fn file(&self, name: &str) -> PathBuf {
        self.path().join(name)
    }

    /// Writes `bytes` to `name` and returns the full path.
    pub async fn write(&self, name: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        let path = self.file(name);
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    /// Removes the directory, reporting failures instead of swallowing them.
    pub fn release(mut self) -> io::Result<()> {
        match self.dir.take() {
            Some(dir) => {
                let path = dir.path().to_path_buf();
                dir.close()?;
                debug!(path = %path.display(), "Released scratch directory");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                warn!(path = %path.display(), error = %e, "Failed to remove scratch directory");
            }
        }
    }
}
