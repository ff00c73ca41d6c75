//! Archive packager and post-packaging cleanup

use anyhow::{Context, Result};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::GrabberError;

/// What `package` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageOutcome {
    Created,
    AlreadyExisted,
}

/// Bundle `files` into a deflated zip at `archive_path`, each under its base name.
///
/// An existing archive is left untouched. A missing input is a fatal
/// [`GrabberError::Packaging`], checked before anything is written.
pub fn package(files: &[PathBuf], archive_path: &Path) -> Result<PackageOutcome> {
    if archive_path.exists() {
        info!("{:?} already existed, not re-packaging", archive_path);
        return Ok(PackageOutcome::AlreadyExisted);
    }

    if let Some(missing) = files.iter().find(|p| !p.is_file()) {
        return Err(GrabberError::Packaging { path: missing.clone() }.into());
    }

    if let Some(parent) = archive_path.parent() {
        std::fs::create_dir_all(parent)
            .context(format!("Failed to create directory: {:?}", parent))?;
    }

    // Build next to the target and rename, so a crash never leaves a partial
    // archive that the skip-if-exists check would accept
    let tmp_path = archive_path.with_extension("zip.part");
    let file = File::create(&tmp_path)
        .context(format!("Failed to create archive: {:?}", tmp_path))?;
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for path in files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| GrabberError::Packaging { path: path.clone() })?;

        zip.start_file(name.as_str(), options)
            .context(format!("Failed to add {} to archive", name))?;
        let mut input = File::open(path)
            .context(format!("Failed to open {:?}", path))?;
        io::copy(&mut input, &mut zip)
            .context(format!("Failed to compress {:?}", path))?;
        debug!("Added {} to archive", name);
    }

    zip.finish().context("Failed to finalize archive")?;
    std::fs::rename(&tmp_path, archive_path)
        .context(format!("Failed to move archive into place: {:?}", archive_path))?;

    info!("zipped {} files into {:?}", files.len(), archive_path);
    Ok(PackageOutcome::Created)
}

/// Remove the per-dataset CSVs and the raw download. Best effort: failures are
/// logged and ignored. Returns how many files were actually removed.
pub fn cleanup(files: &[PathBuf], raw_download: Option<&Path>) -> usize {
    let mut removed = 0;
    for path in files.iter().map(PathBuf::as_path).chain(raw_download) {
        match std::fs::remove_file(path) {
            Ok(()) => {
                debug!("Removed {:?}", path);
                removed += 1;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("{:?} already gone", path);
            }
            Err(e) => warn!("Failed to remove {:?}: {}", path, e),
        }
    }
    info!("Cleaned up {} intermediate files", removed);
    removed
}
