use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::runtime::Runtime;

/// RAII guard over a path that must not outlive the operation that created it.
///
/// The path is removed when the guard drops, on every exit path, unless
/// [`ScopedPath::keep`] was called first.
pub struct ScopedPath<R: Runtime> {
    runtime: Arc<R>,
    path: PathBuf,
    armed: bool,
}

impl<R: Runtime> ScopedPath<R> {
    /// Register an existing (or about to be created) path for removal.
    pub fn new(runtime: Arc<R>, path: PathBuf) -> Self {
        Self {
            runtime,
            path,
            armed: true,
        }
    }

    /// Create a fresh, uniquely named directory under `parent` and guard it.
    pub fn create_unique_dir(runtime: Arc<R>, parent: &Path) -> anyhow::Result<Self> {
        let path = parent.join(Uuid::new_v4().to_string());
        runtime.create_dir_all(&path)?;
        debug!("Created scoped directory {:?}", path);
        Ok(Self::new(runtime, path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The operation succeeded; leave the path on disk.
    pub fn keep(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }
}

impl<R: Runtime> Drop for ScopedPath<R> {
    fn drop(&mut self) {
        if !self.armed || !self.runtime.exists(&self.path) {
            return;
        }

        debug!("Cleaning up: {:?}", self.path);
        let result = if self.runtime.is_dir(&self.path) {
            self.runtime.remove_dir_all(&self.path)
        } else {
            self.runtime.remove_file(&self.path)
        };
        if let Err(e) = result {
            warn!("Failed to clean up {:?}: {}", self.path, e);
        }
    }
}
