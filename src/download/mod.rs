//! Streaming download of saved links into the downloads directory.

mod inventory;

use anyhow::Result;
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;
use uuid::Uuid;

use crate::cleanup::ScopedPath;
use crate::http::HttpClient;
use crate::links::LinkRecord;
use crate::progress::{Phase, ProgressReporter, ProgressUpdate, transfer_fraction};
use crate::runtime::Runtime;

pub use inventory::DownloadedArchive;

/// Extension given to every downloaded or exported package archive.
pub const ARCHIVE_EXTENSION: &str = "ipa";

/// File stem used when a link has no display name.
pub const FALLBACK_FILE_STEM: &str = "downloaded";

/// Terminal failure of a download.
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadError {
    /// The link's URL could not be parsed; nothing was sent.
    InvalidUrl(String),
    /// The transfer itself failed (network, status or local write).
    Transfer(String),
    /// A required directory could not be created.
    CreateDirectory(String),
    /// The finished file could not be moved into place.
    Move(String),
}

impl std::fmt::Display for DownloadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DownloadError::InvalidUrl(msg) => write!(f, "Invalid URL: {}", msg),
            DownloadError::Transfer(msg) => write!(f, "Download failed: {}", msg),
            DownloadError::CreateDirectory(msg) => {
                write!(f, "Failed to create download directory: {}", msg)
            }
            DownloadError::Move(msg) => write!(f, "Failed to move downloaded file: {}", msg),
        }
    }
}

impl std::error::Error for DownloadError {}

/// Downloads link targets and manages the downloaded archives.
pub struct DownloadEngine<R: Runtime> {
    runtime: Arc<R>,
    client: HttpClient,
    downloads_dir: PathBuf,
    temp_dir: PathBuf,
}

impl<R: Runtime> DownloadEngine<R> {
    pub fn new(runtime: Arc<R>, client: HttpClient, downloads_dir: PathBuf, temp_dir: PathBuf) -> Self {
        Self {
            runtime,
            client,
            downloads_dir,
            temp_dir,
        }
    }

    pub fn downloads_dir(&self) -> &Path {
        &self.downloads_dir
    }

    /// Download `record`'s target into `<downloads_dir>/<name>.ipa`.
    ///
    /// Progress covers the transfer phase only; the callback is released once
    /// it has seen `1.0`. A file already at the destination is replaced.
    #[tracing::instrument(skip(self, record, on_progress), fields(id = %record.id))]
    pub async fn download<F>(&self, record: &LinkRecord, on_progress: F) -> Result<PathBuf>
    where
        F: FnMut(ProgressUpdate) + Send,
    {
        let url = Url::parse(&record.url)
            .map_err(|e| DownloadError::InvalidUrl(format!("{:?}: {}", record.url, e)))?;

        self.runtime
            .create_dir_all(&self.temp_dir)
            .map_err(|e| DownloadError::CreateDirectory(format!("{:#}", e)))?;
        let transient = ScopedPath::new(
            Arc::clone(&self.runtime),
            self.temp_dir.join(format!("{}.download", Uuid::new_v4())),
        );

        info!("Downloading {} from {}...", record.name, url);
        let mut reporter = ProgressReporter::new(on_progress);
        reporter.report(Phase::Transfer, 0.0);

        let bytes = self
            .client
            .download_file(
                url.as_str(),
                || self.runtime.create_file(transient.path()),
                |received, total| {
                    if let Some(fraction) = transfer_fraction(received, total) {
                        reporter.report(Phase::Transfer, fraction);
                    }
                },
            )
            .await
            .map_err(|e| DownloadError::Transfer(format!("{:#}", e)))?;
        reporter.report(Phase::Transfer, 1.0);
        debug!("Transferred {} bytes to {:?}", bytes, transient.path());

        self.runtime
            .create_dir_all(&self.downloads_dir)
            .map_err(|e| DownloadError::CreateDirectory(format!("{:#}", e)))?;

        let destination = self.downloads_dir.join(archive_file_name(&record.name));
        if self.runtime.exists(&destination) {
            self.runtime
                .remove_file(&destination)
                .map_err(|e| DownloadError::Move(format!("{:#}", e)))?;
        }
        self.runtime
            .rename(transient.path(), &destination)
            .map_err(|e| DownloadError::Move(format!("{:#}", e)))?;
        transient.keep();

        info!("Saved {}", destination.display());
        Ok(destination)
    }
}

/// `<name>.ipa`, with path separators neutralised; empty names fall back to
/// [`FALLBACK_FILE_STEM`].
pub fn archive_file_name(display_name: &str) -> String {
    let stem: String = display_name
        .trim()
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect();
    let stem = match stem.as_str() {
        "" | "." | ".." => FALLBACK_FILE_STEM,
        s => s,
    };
    format!("{}.{}", stem, ARCHIVE_EXTENSION)
}
