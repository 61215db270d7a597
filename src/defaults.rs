//! App-group key-value store.
//!
//! Each key maps to one opaque blob. The file-backed implementation keeps one
//! file per key and replaces it by writing a sibling temporary file and
//! renaming it over the old one, so a reader never observes a torn blob.

use anyhow::{Context, Result, bail};
use log::debug;
use std::path::PathBuf;
use std::sync::Arc;

use crate::runtime::Runtime;

#[cfg_attr(test, mockall::automock)]
pub trait KeyValueStore: Send + Sync {
    /// The blob stored under `key`, or `None` when absent or unreadable.
    fn data(&self, key: &str) -> Option<Vec<u8>>;

    /// Replace the blob stored under `key`.
    fn set_data(&self, key: &str, data: &[u8]) -> Result<()>;
}

pub struct FileKeyValueStore<R: Runtime> {
    runtime: Arc<R>,
    dir: PathBuf,
}

impl<R: Runtime> FileKeyValueStore<R> {
    pub fn new(runtime: Arc<R>, dir: PathBuf) -> Self {
        Self { runtime, dir }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            bail!("Invalid storage key {:?}", key);
        }
        Ok(self.dir.join(format!("{}.blob", key)))
    }
}

impl<R: Runtime> KeyValueStore for FileKeyValueStore<R> {
    #[tracing::instrument(skip(self))]
    fn data(&self, key: &str) -> Option<Vec<u8>> {
        let path = self.path_for(key).ok()?;
        if !self.runtime.exists(&path) {
            return None;
        }
        match self.runtime.read(&path) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                debug!("Failed to read {:?}: {}", path, e);
                None
            }
        }
    }

    #[tracing::instrument(skip(self, data))]
    fn set_data(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        if !self.runtime.exists(&self.dir) {
            self.runtime.create_dir_all(&self.dir)?;
        }

        let staging = self.dir.join(format!(".{}.blob.tmp", key));
        self.runtime
            .write(&staging, data)
            .with_context(|| format!("Failed to write {:?}", staging))?;
        self.runtime
            .rename(&staging, &path)
            .with_context(|| format!("Failed to replace {:?}", path))
    }
}
