use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

use crate::archive::Archiver;
use crate::cleanup::ScopedPath;
use crate::download::archive_file_name;
use crate::progress::{Phase, ProgressUpdate};
use crate::runtime::Runtime;

use super::{
    AppDescriptor, CONTAINER_DIR, ExportError, ExportMetadata, ExportOptions,
    METADATA_FILE_NAME, PAYLOAD_DIR,
};

/// One export run, executed on a blocking worker thread.
///
/// Progress goes back to the awaiting task through `progress`; nothing here
/// touches observer-visible state directly.
pub(super) struct StageJob<R: Runtime, A: Archiver> {
    pub runtime: Arc<R>,
    pub archiver: Arc<A>,
    pub app: AppDescriptor,
    pub options: ExportOptions,
    pub temp_dir: PathBuf,
    pub output_dir: PathBuf,
    pub started_at: DateTime<Utc>,
}

impl<R: Runtime + 'static, A: Archiver> StageJob<R, A> {
    pub fn run(self, progress: &UnboundedSender<ProgressUpdate>) -> Result<PathBuf> {
        let emit = |phase: Phase, fraction: f64| {
            // The receiver only disappears when the export future was dropped.
            let _ = progress.send(ProgressUpdate::new(phase, fraction));
        };

        let workspace = self
            .runtime
            .create_dir_all(&self.temp_dir)
            .and_then(|_| ScopedPath::create_unique_dir(Arc::clone(&self.runtime), &self.temp_dir))
            .map_err(|e| ExportError::Workspace(format!("{:#}", e)))?;

        self.stage_and_compress(workspace.path(), &emit)
    }

    fn stage_and_compress(
        &self,
        workspace: &Path,
        emit: &dyn Fn(Phase, f64),
    ) -> Result<PathBuf> {
        debug!("Staging {} in {:?}", self.app.display_name, workspace);

        emit(Phase::StageBundle, 0.0);
        self.stage_bundle(workspace)?;
        emit(Phase::StageBundle, 0.3);

        if let Some(container) = &self.options.container {
            self.stage_container(container, workspace, emit)?;
        }

        emit(Phase::WriteDescriptor, 0.8);
        self.write_metadata(workspace)?;

        emit(Phase::Compress, 0.8);
        let output = self.compress(workspace)?;
        emit(Phase::Done, 1.0);
        Ok(output)
    }

    fn stage_bundle(&self, workspace: &Path) -> Result<()> {
        let bundle = &self.app.bundle_path;
        let Some(bundle_name) = bundle.file_name() else {
            return Err(ExportError::BundleCopy(format!("{:?} has no file name", bundle)).into());
        };
        if !self.runtime.is_dir(bundle) {
            return Err(
                ExportError::BundleCopy(format!("{:?} is not a directory", bundle)).into(),
            );
        }

        let payload = workspace.join(PAYLOAD_DIR);
        self.runtime
            .create_dir_all(&payload)
            .and_then(|_| self.runtime.copy_all(bundle, &payload.join(bundle_name)))
            .map_err(|e| ExportError::BundleCopy(format!("{:#}", e)))?;
        Ok(())
    }

    fn stage_container(
        &self,
        container: &Path,
        workspace: &Path,
        emit: &dyn Fn(Phase, f64),
    ) -> Result<()> {
        let staged = workspace.join(CONTAINER_DIR);
        self.runtime
            .create_dir_all(&staged)
            .map_err(|e| ExportError::ContainerCopy(format!("{:#}", e)))?;

        self.copy_category(
            self.options.include_documents,
            &container.join("Documents"),
            &staged.join("Documents"),
        )?;
        emit(Phase::StageContainer, 0.5);

        self.copy_category(
            self.options.include_library,
            &container.join("Library"),
            &staged.join("Library"),
        )?;
        emit(Phase::StageContainer, 0.65);

        self.copy_category(
            self.options.include_caches,
            &container.join("Library").join("Caches"),
            &staged.join("Caches"),
        )
    }

    /// Copies one optional category. Missing sources are skipped.
    fn copy_category(&self, requested: bool, from: &Path, to: &Path) -> Result<()> {
        if !requested {
            return Ok(());
        }
        if !self.runtime.is_dir(from) {
            debug!("Skipping {:?}: not present", from);
            return Ok(());
        }
        self.runtime
            .copy_all(from, to)
            .map_err(|e| ExportError::ContainerCopy(format!("{:#}", e)).into())
    }

    fn write_metadata(&self, workspace: &Path) -> Result<()> {
        let metadata = ExportMetadata::new(&self.app, &self.options, self.started_at);
        let json = serde_json::to_vec_pretty(&metadata)
            .map_err(|e| ExportError::Metadata(e.to_string()))?;
        self.runtime
            .write(&workspace.join(METADATA_FILE_NAME), &json)
            .map_err(|e| ExportError::Metadata(format!("{:#}", e)).into())
    }

    fn compress(&self, workspace: &Path) -> Result<PathBuf> {
        let bytes = self
            .archiver
            .archive_directory(self.runtime.as_ref(), workspace)
            .map_err(|e| ExportError::ArchiveCreation(format!("{:#}", e)))?;
        if bytes.is_empty() {
            return Err(ExportError::ArchiveCreation("archiver produced no data".into()).into());
        }

        self.runtime
            .create_dir_all(&self.output_dir)
            .map_err(|e| ExportError::Output(format!("{:#}", e)))?;
        let output = self.output_dir.join(self.output_file_name());
        if self.runtime.exists(&output) {
            self.runtime
                .remove_file(&output)
                .map_err(|e| ExportError::Output(format!("{:#}", e)))?;
        }

        // A partially written archive must not survive a failed write.
        let guard = ScopedPath::new(Arc::clone(&self.runtime), output);
        self.runtime
            .write(guard.path(), &bytes)
            .map_err(|e| ExportError::ArchiveCreation(format!("{:#}", e)))?;
        let output = guard.keep();

        info!("Exported {} to {}", self.app.display_name, output.display());
        Ok(output)
    }

    fn output_file_name(&self) -> String {
        let name = match self.app.display_name.trim() {
            "" => "App",
            name => name,
        };
        // Sub-second precision keeps back-to-back exports from replacing each other.
        archive_file_name(&format!("{}_{}", name, self.started_at.format("%s%.6f")))
    }
}
