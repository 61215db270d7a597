//! Listing and removal of archives in the downloads directory.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use std::path::PathBuf;

use crate::runtime::Runtime;

use super::{ARCHIVE_EXTENSION, DownloadEngine};

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadedArchive {
    pub path: PathBuf,
    pub file_name: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

impl<R: Runtime> DownloadEngine<R> {
    /// Archives currently in the downloads directory, newest first.
    /// The directory is created when missing.
    #[tracing::instrument(skip(self))]
    pub fn list_downloaded(&self) -> Result<Vec<DownloadedArchive>> {
        if !self.runtime.exists(&self.downloads_dir) {
            self.runtime
                .create_dir_all(&self.downloads_dir)
                .context("Failed to create downloads directory")?;
        }

        let entries = self
            .runtime
            .read_dir(&self.downloads_dir)
            .with_context(|| format!("Failed to list {:?}", self.downloads_dir))?;

        let mut archives: Vec<DownloadedArchive> = entries
            .into_iter()
            .filter(|path| {
                path.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case(ARCHIVE_EXTENSION))
            })
            .filter_map(|path| {
                let info = match self.runtime.file_info(&path) {
                    Ok(info) => info,
                    Err(e) => {
                        debug!("Skipping {:?}: {}", path, e);
                        return None;
                    }
                };
                let file_name = path.file_name()?.to_string_lossy().into_owned();
                Some(DownloadedArchive {
                    path,
                    file_name,
                    size: info.size,
                    modified: info.modified,
                })
            })
            .collect();

        archives.sort_by(|a, b| b.modified.cmp(&a.modified));
        Ok(archives)
    }

    /// Remove the named archives from the downloads directory.
    /// Names that do not exist are skipped. Returns how many were removed.
    #[tracing::instrument(skip(self))]
    pub fn delete_downloaded(&self, file_names: &[String]) -> Result<usize> {
        let mut removed = 0;
        for name in file_names {
            if name.contains(['/', '\\']) || name == ".." || name == "." {
                bail!("{:?} is not a file name in the downloads directory", name);
            }
            let path = self.downloads_dir.join(name);
            if !self.runtime.exists(&path) {
                debug!("{:?} already gone", path);
                continue;
            }
            match self.runtime.remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to remove {:?}: {}", path, e),
            }
        }
        Ok(removed)
    }

    /// Remove every archive in the downloads directory.
    #[tracing::instrument(skip(self))]
    pub fn delete_all_downloaded(&self) -> Result<usize> {
        let names: Vec<String> = self
            .list_downloaded()?
            .into_iter()
            .map(|a| a.file_name)
            .collect();
        self.delete_downloaded(&names)
    }
}
