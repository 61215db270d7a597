use anyhow::{Result, bail};
use log::debug;
use std::path::PathBuf;
use std::sync::Arc;

use crate::{
    archive::ZipArchiver,
    export::{AppDescriptor, ContainerRecord, ExportOptions, Exporter},
    runtime::Runtime,
};

use super::download::print_progress;
use super::services::Services;

/// Where the container data for an export comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ContainerSource {
    None,
    /// An explicit container directory.
    Path(PathBuf),
    /// A container identifier resolved under the private or shared root.
    Id { data_id: String, shared: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportRequest {
    pub bundle: PathBuf,
    pub bundle_id: Option<String>,
    pub name: Option<String>,
    pub version: Option<String>,
    pub container: ContainerSource,
    pub include_documents: bool,
    pub include_library: bool,
    pub include_caches: bool,
    pub output: Option<PathBuf>,
}

impl ExportRequest {
    fn app(&self) -> AppDescriptor {
        let mut app = AppDescriptor::from_bundle(self.bundle.clone());
        if let Some(bundle_id) = &self.bundle_id {
            app.bundle_id = bundle_id.clone();
        }
        if let Some(name) = &self.name {
            app.display_name = name.clone();
        }
        if let Some(version) = &self.version {
            app.version = version.clone();
        }
        if let ContainerSource::Id { data_id, shared } = &self.container {
            app.is_shared = *shared;
            app.containers.push(ContainerRecord {
                data_id: data_id.clone(),
                name: String::new(),
                group_id: None,
            });
        }
        app
    }
}

/// Export a bundle, optionally with container data, and print the archive path.
#[tracing::instrument(skip(services))]
pub async fn export<R: Runtime + 'static>(services: &Services<R>, request: ExportRequest) -> Result<()> {
    let app = request.app();
    let container = match &request.container {
        ContainerSource::None => None,
        ContainerSource::Path(path) => Some(path.clone()),
        ContainerSource::Id { .. } => Some(services.containers.container_path(&app, 0)?),
    };
    if let Some(container) = &container
        && !services.runtime.is_dir(container)
    {
        bail!("Container {} does not exist", container.display());
    }
    debug!("Exporting with container {:?}", container);

    let options = ExportOptions {
        container,
        include_documents: request.include_documents,
        include_library: request.include_library,
        include_caches: request.include_caches,
    };

    let custom;
    let exporter = match request.output {
        Some(dir) => {
            custom = Exporter::new(
                Arc::clone(&services.runtime),
                ZipArchiver,
                services.config.temp_dir(),
                dir,
            );
            &custom
        }
        None => &services.exporter,
    };

    let path = exporter.export(&app, &options, print_progress).await?;
    eprintln!();
    println!("Exported {} to {}", app.display_name, path.display());
    Ok(())
}
