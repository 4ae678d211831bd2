//! Unpacking a level archive into its staging directory.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};
use zip::ZipArchive;

use crate::error::WorkflowError;

/// What an extraction wrote and what it refused to write.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExtractReport {
    /// Files written, relative to the staging directory.
    pub staged: Vec<PathBuf>,
    /// Entry names skipped because they would land outside staging.
    pub skipped: Vec<String>,
}

/// Unpack every entry of `archive` into `staging`, preserving directory structure.
///
/// The whole archive is read before anything is written, so a corrupt archive
/// fails with [`WorkflowError::CorruptArchive`] and leaves staging untouched.
/// Existing staged copies are overwritten.
#[instrument(skip_all, fields(archive = %archive.display()))]
pub fn extract_archive(archive: &Path, staging: &Path) -> Result<ExtractReport> {
    let corrupt = |reason: String| WorkflowError::CorruptArchive {
        path: archive.to_path_buf(),
        reason,
    };
    let file = File::open(archive).with_context(|| format!("open {}", archive.display()))?;
    let mut zip = ZipArchive::new(file).map_err(|e| corrupt(e.to_string()))?;

    let mut report = ExtractReport::default();
    let mut entries: Vec<(PathBuf, Vec<u8>)> = Vec::new();
    for index in 0..zip.len() {
        let mut entry = zip.by_index(index).map_err(|e| corrupt(e.to_string()))?;
        let Some(relative) = entry.enclosed_name() else {
            warn!(name = entry.name(), "skipping entry outside staging");
            report.skipped.push(entry.name().to_string());
            continue;
        };
        if entry.is_dir() {
            continue;
        }
        let mut contents = Vec::new();
        entry
            .read_to_end(&mut contents)
            .map_err(|e| corrupt(format!("{}: {e}", entry.name())))?;
        entries.push((relative, contents));
    }

    fs::create_dir_all(staging).with_context(|| format!("create {}", staging.display()))?;
    for (relative, contents) in entries {
        let dest = staging.join(&relative);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&dest, contents).with_context(|| format!("write {}", dest.display()))?;
        report.staged.push(relative);
    }
    info!(
        staged = report.staged.len(),
        skipped = report.skipped.len(),
        "archive extracted"
    );
    Ok(report)
}
