use crate::runtime::Runtime;
use anyhow::{Context, Result, bail};
use log::{debug, info};
use std::io::{Cursor, Write};
use std::path::Path;
use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::FileOptions;

use super::Archiver;

/// Builds deflated .zip archives in memory.
pub struct ZipArchiver;

impl Archiver for ZipArchiver {
    #[tracing::instrument(skip(self, runtime))]
    fn archive_directory<R: Runtime + 'static>(
        &self,
        runtime: &R,
        source: &Path,
    ) -> Result<Vec<u8>> {
        if !runtime.is_dir(source) {
            bail!("{:?} is not a directory", source);
        }

        debug!("Compressing {:?}...", source);
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let mut entries = 0usize;
        add_children(runtime, &mut zip, source, "", &mut entries)?;

        let bytes = zip
            .finish()
            .context("Failed to finalize ZIP archive")?
            .into_inner();

        info!("Compressed {} entries into {} bytes.", entries, bytes.len());
        Ok(bytes)
    }
}

/// Adds the children of `dir` under the archive prefix `prefix` (either empty
/// or ending in `/`). Children are visited in name order so archives are
/// reproducible.
fn add_children<R: Runtime, W: Write + std::io::Seek>(
    runtime: &R,
    zip: &mut ZipWriter<W>,
    dir: &Path,
    prefix: &str,
    entries: &mut usize,
) -> Result<()> {
    let mut children = runtime
        .read_dir(dir)
        .with_context(|| format!("Failed to list {:?}", dir))?;
    children.sort();

    for child in children {
        let Some(name) = child.file_name().and_then(|n| n.to_str()) else {
            bail!("Cannot archive non UTF-8 path {:?}", child);
        };
        let entry_name = format!("{}{}", prefix, name);
        let mut options: FileOptions<()> =
            FileOptions::default().compression_method(CompressionMethod::Deflated);
        if let Some(mode) = runtime.unix_mode(&child) {
            options = options.unix_permissions(mode & 0o7777);
        }

        if runtime.is_dir(&child) {
            let dir_name = format!("{}/", entry_name);
            zip.add_directory(dir_name.as_str(), options)
                .with_context(|| format!("Failed to add directory {}", dir_name))?;
            *entries += 1;
            add_children(runtime, zip, &child, &dir_name, entries)?;
        } else {
            zip.start_file(entry_name.as_str(), options)
                .with_context(|| format!("Failed to add file {}", entry_name))?;
            let mut reader = runtime.open(&child)?;
            std::io::copy(&mut reader, zip)
                .with_context(|| format!("Failed to compress {:?}", child))?;
            *entries += 1;
        }
    }
    Ok(())
}
