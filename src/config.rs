//! Configuration resolved once at startup and shared by every service.

use anyhow::{Context, Result};
use log::{debug, warn};
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::http::HttpClient;
use crate::runtime::Runtime;

/// Environment variable overriding the probe timeout, in seconds.
pub const PROBE_TIMEOUT_ENV: &str = "IPAVAULT_PROBE_TIMEOUT";

/// Default timeout for link probes.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Key under which the link collection lives in the group key-value store.
pub const LINKS_STORAGE_KEY: &str = "LCSavedIPALinks";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub root: PathBuf,
    pub probe_timeout: Duration,
    pub user_agent: String,
}

impl Config {
    /// Resolve configuration from an explicit root (flag or `IPAVAULT_ROOT`)
    /// and the environment.
    pub fn new<R: Runtime>(runtime: &R, root: Option<PathBuf>) -> Result<Self> {
        let root = match root {
            Some(path) => path,
            None => default_root(runtime)?,
        };
        debug!("Using root: {}", root.display());

        let probe_timeout = match runtime.env_var(PROBE_TIMEOUT_ENV) {
            Ok(value) => match value.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    warn!(
                        "Ignoring invalid {}={:?}, using {:?}",
                        PROBE_TIMEOUT_ENV, value, DEFAULT_PROBE_TIMEOUT
                    );
                    DEFAULT_PROBE_TIMEOUT
                }
            },
            Err(_) => DEFAULT_PROBE_TIMEOUT,
        };

        Ok(Self {
            root,
            probe_timeout,
            user_agent: format!("ipavault/{}", env!("IPAVAULT_VERSION")),
        })
    }

    /// User-visible documents area.
    pub fn documents_dir(&self) -> PathBuf {
        self.root.join("Documents")
    }

    /// Where downloaded archives are placed.
    pub fn downloads_dir(&self) -> PathBuf {
        self.documents_dir().join("DownloadedIPAs")
    }

    /// Where exported archives are written.
    pub fn exports_dir(&self) -> PathBuf {
        self.documents_dir().join("ExportedIPAs")
    }

    /// Shared app-group area holding the key-value store.
    pub fn group_dir(&self) -> PathBuf {
        self.root.join("AppGroup")
    }

    /// Root of containers private to this installation.
    pub fn private_data_dir(&self) -> PathBuf {
        self.root.join("Data").join("Application")
    }

    /// Root of containers shared through the app group.
    pub fn shared_data_dir(&self) -> PathBuf {
        self.group_dir().join("Data").join("Application")
    }

    /// Scratch space for transient downloads and staging workspaces.
    pub fn temp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Default root: `<data dir>/ipavault`, falling back to `~/.ipavault`.
#[tracing::instrument(skip(runtime))]
pub fn default_root<R: Runtime>(runtime: &R) -> Result<PathBuf> {
    if let Some(data_dir) = runtime.data_dir() {
        return Ok(data_dir.join("ipavault"));
    }
    let home_dir = runtime
        .home_dir()
        .context("Could not find a data or home directory")?;
    Ok(home_dir.join(".ipavault"))
}

/// Build the HTTP client every network service shares.
pub fn build_http_client(config: &Config) -> Result<HttpClient> {
    let client = Client::builder()
        .user_agent(config.user_agent.as_str())
        .build()
        .context("Failed to build HTTP client")?;
    Ok(HttpClient::new(client))
}
