mod zip;

use crate::runtime::Runtime;
use anyhow::Result;
use std::path::Path;

pub use zip::ZipArchiver;

/// Compresses a staged directory tree into a single archive.
#[cfg_attr(test, mockall::automock)]
pub trait Archiver: Send + Sync {
    /// Compress everything under `source` (entries relative to `source`)
    /// and return the archive bytes. An empty result means nothing usable
    /// was produced.
    fn archive_directory<R: Runtime + 'static>(&self, runtime: &R, source: &Path)
    -> Result<Vec<u8>>;
}
