use anyhow::{Result, bail};
use std::io::Write;
use uuid::Uuid;

use crate::{
    defaults::KeyValueStore,
    download::DownloadEngine,
    links::{LinkRegistry, Prober},
    progress::ProgressUpdate,
    runtime::Runtime,
};

use super::links::{format_size, format_time};

/// Download a saved link, drawing a progress line on stderr.
#[tracing::instrument(skip(registry, engine))]
pub async fn download<R, K, P>(
    registry: &LinkRegistry<K, P>,
    engine: &DownloadEngine<R>,
    id: Uuid,
) -> Result<()>
where
    R: Runtime,
    K: KeyValueStore + 'static,
    P: Prober + 'static,
{
    let Some(record) = registry.store().get(id).await else {
        bail!("No link with id {}", id);
    };

    let path = engine.download(&record, print_progress).await?;
    eprintln!();
    println!("Downloaded {} to {}", record.name, path.display());
    Ok(())
}

#[tracing::instrument(skip(engine))]
pub fn list_downloads<R: Runtime>(engine: &DownloadEngine<R>) -> Result<()> {
    let archives = engine.list_downloaded()?;
    if archives.is_empty() {
        println!("No downloaded archives.");
        return Ok(());
    }
    for archive in archives {
        println!(
            "{}  {}  {}",
            archive.file_name,
            format_size(archive.size),
            format_time(archive.modified)
        );
    }
    Ok(())
}

#[tracing::instrument(skip(engine))]
pub fn remove_downloads<R: Runtime>(engine: &DownloadEngine<R>, file_names: &[String]) -> Result<()> {
    let removed = engine.delete_downloaded(file_names)?;
    println!("Removed {} archive(s).", removed);
    Ok(())
}

/// Remove every downloaded archive, asking first unless `yes` is set.
#[tracing::instrument(skip(runtime, engine))]
pub fn clear_downloads<R: Runtime>(runtime: &R, engine: &DownloadEngine<R>, yes: bool) -> Result<()> {
    let count = engine.list_downloaded()?.len();
    if count == 0 {
        println!("No downloaded archives.");
        return Ok(());
    }
    if !yes && !runtime.confirm(&format!("Remove {} downloaded archive(s)?", count))? {
        println!("Aborted.");
        return Ok(());
    }

    let removed = engine.delete_all_downloaded()?;
    println!("Removed {} archive(s).", removed);
    Ok(())
}

pub(crate) fn print_progress(update: ProgressUpdate) {
    let mut stderr = std::io::stderr();
    let _ = write!(stderr, "\r{:>5.1}%", update.fraction * 100.0);
    let _ = stderr.flush();
}
