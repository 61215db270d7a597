//! Staging an installed app and its container data into a single archive.

mod container;
mod stage;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use crate::archive::Archiver;
use crate::progress::{ProgressReporter, ProgressUpdate};
use crate::runtime::Runtime;

pub use container::{AppDescriptor, ContainerLocator, ContainerRecord};
use stage::StageJob;

/// Top-level directory holding the app bundle inside an archive.
pub const PAYLOAD_DIR: &str = "Payload";

/// Top-level directory holding the staged container data.
pub const CONTAINER_DIR: &str = "ContainerData";

/// Name of the metadata file at the archive root.
pub const METADATA_FILE_NAME: &str = "LCExportMetadata.json";

/// Value of the `exportedBy` metadata field.
pub const EXPORTER_NAME: &str = "ipavault";

/// Terminal failure of an export.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportError {
    /// The staging workspace could not be created.
    Workspace(String),
    BundleCopy(String),
    ContainerCopy(String),
    Metadata(String),
    /// The archiver failed or produced no data.
    ArchiveCreation(String),
    /// The output directory or a stale output file could not be prepared.
    Output(String),
}

impl std::fmt::Display for ExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportError::Workspace(msg) => write!(f, "Failed to create staging workspace: {}", msg),
            ExportError::BundleCopy(msg) => write!(f, "Failed to copy app bundle: {}", msg),
            ExportError::ContainerCopy(msg) => write!(f, "Failed to copy container data: {}", msg),
            ExportError::Metadata(msg) => write!(f, "Failed to write export metadata: {}", msg),
            ExportError::ArchiveCreation(msg) => write!(f, "Archive creation failed: {}", msg),
            ExportError::Output(msg) => write!(f, "Failed to prepare export destination: {}", msg),
        }
    }
}

impl std::error::Error for ExportError {}

/// What to take from the app's container.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportOptions {
    /// Container directory to take data from; `None` exports the bundle only.
    pub container: Option<PathBuf>,
    pub include_documents: bool,
    pub include_library: bool,
    pub include_caches: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            container: None,
            include_documents: true,
            include_library: true,
            include_caches: false,
        }
    }
}

/// Descriptor written next to the payload so importers know what the
/// archive holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetadata {
    pub export_date: DateTime<Utc>,
    pub exported_by: String,
    pub bundle_identifier: String,
    pub app_name: String,
    pub app_version: String,
    pub container_included: bool,
    pub documents_included: bool,
    pub library_included: bool,
    pub caches_included: bool,
}

impl ExportMetadata {
    /// Category flags record what was requested for a supplied container,
    /// whether or not the source directory turned out to exist.
    pub fn new(app: &AppDescriptor, options: &ExportOptions, export_date: DateTime<Utc>) -> Self {
        let container = options.container.is_some();
        Self {
            export_date,
            exported_by: EXPORTER_NAME.to_string(),
            bundle_identifier: app.bundle_id.clone(),
            app_name: app.display_name.clone(),
            app_version: app.version.clone(),
            container_included: container,
            documents_included: container && options.include_documents,
            library_included: container && options.include_library,
            caches_included: container && options.include_caches,
        }
    }
}

/// Observer-visible export state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportStatus {
    pub exporting: bool,
    pub progress: f64,
    pub error: Option<String>,
}

/// Runs exports and publishes their status.
pub struct Exporter<R: Runtime, A: Archiver> {
    runtime: Arc<R>,
    archiver: Arc<A>,
    temp_dir: PathBuf,
    output_dir: PathBuf,
    status: watch::Sender<ExportStatus>,
}

impl<R: Runtime + 'static, A: Archiver + 'static> Exporter<R, A> {
    pub fn new(runtime: Arc<R>, archiver: A, temp_dir: PathBuf, output_dir: PathBuf) -> Self {
        let (status, _) = watch::channel(ExportStatus::default());
        Self {
            runtime,
            archiver: Arc::new(archiver),
            temp_dir,
            output_dir,
            status,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Follow `exporting`, `progress` and `error` of the current or last run.
    pub fn status(&self) -> watch::Receiver<ExportStatus> {
        self.status.subscribe()
    }

    /// Export `app` into `<output_dir>/<name>_<unix time>.ipa`.
    ///
    /// File work runs on a blocking worker. Progress and status are updated
    /// only from the task awaiting this call. The staging workspace is gone
    /// by the time this returns, whatever the outcome.
    #[tracing::instrument(skip(self, app, on_progress), fields(bundle = %app.bundle_id))]
    pub async fn export<F>(
        &self,
        app: &AppDescriptor,
        options: &ExportOptions,
        on_progress: F,
    ) -> Result<PathBuf>
    where
        F: FnMut(ProgressUpdate) + Send,
    {
        self.status.send_replace(ExportStatus {
            exporting: true,
            progress: 0.0,
            error: None,
        });
        info!("Exporting {}...", app.display_name);

        let job = StageJob {
            runtime: Arc::clone(&self.runtime),
            archiver: Arc::clone(&self.archiver),
            app: app.clone(),
            options: options.clone(),
            temp_dir: self.temp_dir.clone(),
            output_dir: self.output_dir.clone(),
            started_at: Utc::now(),
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        let worker = tokio::task::spawn_blocking(move || job.run(&tx));

        let mut reporter = ProgressReporter::new(on_progress);
        while let Some(update) = rx.recv().await {
            self.status
                .send_modify(|status| status.progress = status.progress.max(update.fraction));
            reporter.report(update.phase, update.fraction);
        }

        let result = worker.await.context("Export worker terminated").and_then(|r| r);

        self.status.send_modify(|status| {
            status.exporting = false;
            match &result {
                Ok(_) => status.progress = 1.0,
                Err(e) => status.error = Some(format!("{:#}", e)),
            }
        });
        if let Err(e) = &result {
            warn!("Export of {} failed: {:#}", app.display_name, e);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{MockArchiver, ZipArchiver};
    use crate::progress::Phase;
    use crate::runtime::RealRuntime;
    use std::fs;
    use std::io::Read;
    use std::sync::Mutex;
    use tempfile::{TempDir, tempdir};
    use zip::ZipArchive;

    struct Fixture {
        dir: TempDir,
        app: AppDescriptor,
    }

    impl Fixture {
        /// `AppX.app` with one file, and a container holding only `Documents`.
        fn new() -> Self {
            let dir = tempdir().unwrap();
            let bundle = dir.path().join("apps/AppX.app");
            fs::create_dir_all(&bundle).unwrap();
            fs::write(bundle.join("AppX"), "binary").unwrap();

            let documents = dir.path().join("container/Documents");
            fs::create_dir_all(&documents).unwrap();
            fs::write(documents.join("save.dat"), "progress").unwrap();

            let app = AppDescriptor {
                bundle_id: "com.example.appx".into(),
                display_name: "AppX".into(),
                version: "1.2".into(),
                ..AppDescriptor::from_bundle(bundle)
            };
            Self { dir, app }
        }

        fn container(&self) -> PathBuf {
            self.dir.path().join("container")
        }

        fn temp_dir(&self) -> PathBuf {
            self.dir.path().join("tmp")
        }

        fn output_dir(&self) -> PathBuf {
            self.dir.path().join("Documents/ExportedIPAs")
        }

        fn exporter(&self) -> Exporter<RealRuntime, ZipArchiver> {
            Exporter::new(
                Arc::new(RealRuntime),
                ZipArchiver,
                self.temp_dir(),
                self.output_dir(),
            )
        }

        fn workspace_entries(&self) -> usize {
            fs::read_dir(self.temp_dir()).map(|d| d.count()).unwrap_or(0)
        }
    }

    fn export_error(err: &anyhow::Error) -> &ExportError {
        err.downcast_ref::<ExportError>().expect("typed export error")
    }

    fn entry_names(path: &Path) -> Vec<String> {
        let archive = ZipArchive::new(fs::File::open(path).unwrap()).unwrap();
        archive.file_names().map(String::from).collect()
    }

    #[tokio::test]
    async fn test_export_with_partial_container() {
        let fixture = Fixture::new();
        let options = ExportOptions {
            container: Some(fixture.container()),
            include_documents: true,
            include_library: true,
            include_caches: false,
        };

        let output = fixture
            .exporter()
            .export(&fixture.app, &options, |_| {})
            .await
            .unwrap();

        assert!(output.starts_with(fixture.output_dir()));
        let name = output.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("AppX_") && name.ends_with(".ipa"), "{}", name);

        let names = entry_names(&output);
        assert!(names.contains(&"Payload/AppX.app/AppX".to_string()));
        assert!(names.contains(&"ContainerData/Documents/save.dat".to_string()));
        assert!(!names.iter().any(|n| n.starts_with("ContainerData/Library")));
        assert!(!names.iter().any(|n| n.starts_with("ContainerData/Caches")));

        let mut archive = ZipArchive::new(fs::File::open(&output).unwrap()).unwrap();
        let mut json = String::new();
        archive
            .by_name(METADATA_FILE_NAME)
            .unwrap()
            .read_to_string(&mut json)
            .unwrap();
        let metadata: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(metadata["documentsIncluded"], true);
        assert_eq!(metadata["libraryIncluded"], true);
        assert_eq!(metadata["cachesIncluded"], false);
        assert_eq!(metadata["containerIncluded"], true);
        assert_eq!(metadata["bundleIdentifier"], "com.example.appx");
        assert!(metadata.get("bundleId").is_none());
        assert_eq!(metadata["appVersion"], "1.2");
        assert_eq!(metadata["exportedBy"], EXPORTER_NAME);

        assert_eq!(fixture.workspace_entries(), 0);
    }

    #[tokio::test]
    async fn test_caches_are_staged_from_library() {
        let fixture = Fixture::new();
        let caches = fixture.container().join("Library/Caches");
        fs::create_dir_all(&caches).unwrap();
        fs::write(caches.join("thumb.png"), "png").unwrap();
        let options = ExportOptions {
            container: Some(fixture.container()),
            include_documents: false,
            include_library: false,
            include_caches: true,
        };

        let output = fixture
            .exporter()
            .export(&fixture.app, &options, |_| {})
            .await
            .unwrap();

        let names = entry_names(&output);
        assert!(names.contains(&"ContainerData/Caches/thumb.png".to_string()));
        assert!(!names.iter().any(|n| n.starts_with("ContainerData/Documents")));
    }

    #[tokio::test]
    async fn test_progress_checkpoints() {
        let fixture = Fixture::new();
        let seen = Mutex::new(Vec::new());
        let options = ExportOptions {
            container: Some(fixture.container()),
            ..ExportOptions::default()
        };

        fixture
            .exporter()
            .export(&fixture.app, &options, |u| seen.lock().unwrap().push(u.fraction))
            .await
            .unwrap();

        assert_eq!(seen.into_inner().unwrap(), vec![0.0, 0.3, 0.5, 0.65, 0.8, 0.8, 1.0]);
    }

    #[tokio::test]
    async fn test_bundle_only_export() {
        let fixture = Fixture::new();
        let seen = Mutex::new(Vec::new());

        let output = fixture
            .exporter()
            .export(&fixture.app, &ExportOptions::default(), |u| {
                seen.lock().unwrap().push((u.phase, u.fraction))
            })
            .await
            .unwrap();

        assert_eq!(
            seen.into_inner().unwrap(),
            vec![
                (Phase::StageBundle, 0.0),
                (Phase::StageBundle, 0.3),
                (Phase::WriteDescriptor, 0.8),
                (Phase::Compress, 0.8),
                (Phase::Done, 1.0),
            ]
        );
        assert!(!entry_names(&output).iter().any(|n| n.starts_with(CONTAINER_DIR)));
    }

    #[test_log::test(tokio::test)]
    async fn test_missing_bundle_fails_and_cleans_up() {
        let mut fixture = Fixture::new();
        fixture.app.bundle_path = fixture.dir.path().join("apps/Gone.app");
        let exporter = fixture.exporter();
        let status = exporter.status();

        let err = exporter
            .export(&fixture.app, &ExportOptions::default(), |_| {})
            .await
            .unwrap_err();

        assert!(matches!(export_error(&err), ExportError::BundleCopy(_)));
        assert_eq!(fixture.workspace_entries(), 0);
        assert!(!fixture.output_dir().exists());

        let status = status.borrow().clone();
        assert!(!status.exporting);
        assert!(status.error.unwrap().contains("Failed to copy app bundle"));
    }

    #[tokio::test]
    async fn test_empty_archive_is_archive_error() {
        let fixture = Fixture::new();
        let mut archiver = MockArchiver::new();
        archiver
            .expect_archive_directory::<RealRuntime>()
            .times(1)
            .returning(|_, _| Ok(Vec::new()));
        let exporter = Exporter::new(
            Arc::new(RealRuntime),
            archiver,
            fixture.temp_dir(),
            fixture.output_dir(),
        );
        let seen = Mutex::new(Vec::new());

        let err = exporter
            .export(&fixture.app, &ExportOptions::default(), |u| {
                seen.lock().unwrap().push((u.phase, u.fraction))
            })
            .await
            .unwrap_err();

        assert!(matches!(export_error(&err), ExportError::ArchiveCreation(_)));
        assert_eq!(seen.into_inner().unwrap().last(), Some(&(Phase::Compress, 0.8)));
        assert_eq!(fixture.workspace_entries(), 0);
        assert!(!fixture.output_dir().exists());
    }

    #[cfg(unix)]
    #[test_log::test(tokio::test)]
    async fn test_unreadable_container_data_aborts_export() {
        let fixture = Fixture::new();
        std::os::unix::fs::symlink(
            fixture.dir.path().join("nowhere"),
            fixture.container().join("Documents/dangling"),
        )
        .unwrap();
        let options = ExportOptions {
            container: Some(fixture.container()),
            ..ExportOptions::default()
        };

        let err = fixture
            .exporter()
            .export(&fixture.app, &options, |_| {})
            .await
            .unwrap_err();

        assert!(matches!(export_error(&err), ExportError::ContainerCopy(_)));
        assert_eq!(fixture.workspace_entries(), 0);
        assert!(!fixture.output_dir().exists());
    }

    #[tokio::test]
    async fn test_back_to_back_exports_keep_both_archives() {
        let fixture = Fixture::new();
        let exporter = fixture.exporter();

        let first = exporter
            .export(&fixture.app, &ExportOptions::default(), |_| {})
            .await
            .unwrap();
        let second = exporter
            .export(&fixture.app, &ExportOptions::default(), |_| {})
            .await
            .unwrap();

        assert_ne!(first, second);
        assert!(first.exists());
        assert!(second.exists());
        assert_eq!(fs::read_dir(fixture.output_dir()).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn test_status_after_success() {
        let fixture = Fixture::new();
        let exporter = fixture.exporter();
        let status = exporter.status();
        assert_eq!(*status.borrow(), ExportStatus::default());

        exporter
            .export(&fixture.app, &ExportOptions::default(), |_| {})
            .await
            .unwrap();

        let status = status.borrow().clone();
        assert!(!status.exporting);
        assert_eq!(status.progress, 1.0);
        assert_eq!(status.error, None);
    }

    #[test]
    fn test_metadata_without_container() {
        let app = AppDescriptor::from_bundle(PathBuf::from("/apps/AppX.app"));
        let metadata = ExportMetadata::new(&app, &ExportOptions::default(), Utc::now());
        assert!(!metadata.container_included);
        assert!(!metadata.documents_included);
        assert!(!metadata.library_included);

        let json = serde_json::to_value(&metadata).unwrap();
        assert!(json["exportDate"].as_str().unwrap().contains('T'));
        assert_eq!(json["appName"], "AppX");
    }
}
