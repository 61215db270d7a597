//! Service construction for the CLI.
//!
//! Every long-lived service is built once from [`Config`] and shared for the
//! life of the process; nothing here needs teardown.

use anyhow::Result;
use log::debug;
use std::path::PathBuf;
use std::sync::Arc;

use crate::{
    archive::ZipArchiver,
    config::{Config, build_http_client},
    defaults::FileKeyValueStore,
    download::DownloadEngine,
    export::{ContainerLocator, Exporter},
    links::{HttpProber, LinkRegistry, LinkStore},
    runtime::Runtime,
};

/// The link registry as the CLI wires it.
pub type Registry<R> = LinkRegistry<FileKeyValueStore<R>, HttpProber>;

pub struct Services<R: Runtime + 'static> {
    pub runtime: Arc<R>,
    pub config: Config,
    pub registry: Registry<R>,
    pub downloads: DownloadEngine<R>,
    pub exporter: Exporter<R, ZipArchiver>,
    pub containers: ContainerLocator,
}

impl<R: Runtime + 'static> Services<R> {
    /// Resolve configuration and build every service from it.
    #[tracing::instrument(skip(runtime))]
    pub fn build(runtime: R, root: Option<PathBuf>) -> Result<Self> {
        let runtime = Arc::new(runtime);
        let config = Config::new(runtime.as_ref(), root)?;
        let client = build_http_client(&config)?;
        debug!("Services rooted at {}", config.root().display());

        let defaults = FileKeyValueStore::new(Arc::clone(&runtime), config.group_dir());
        let registry = LinkRegistry::new(
            Arc::new(LinkStore::open(defaults)),
            Arc::new(HttpProber::new(client.clone(), config.probe_timeout)),
        );
        let downloads = DownloadEngine::new(
            Arc::clone(&runtime),
            client,
            config.downloads_dir(),
            config.temp_dir(),
        );
        let exporter = Exporter::new(
            Arc::clone(&runtime),
            ZipArchiver,
            config.temp_dir(),
            config.exports_dir(),
        );
        let containers = ContainerLocator::from_config(&config);

        Ok(Self {
            runtime,
            config,
            registry,
            downloads,
            exporter,
            containers,
        })
    }
}
