//! Side-effecting components of the level workflow.

pub mod assistant;
pub mod clean;
pub mod config;
pub mod extract;
pub mod level_state;
pub mod locate;
pub mod organize;
pub mod paths;
pub mod process;
pub mod prompt;
pub mod resume;
pub mod solution;
pub mod statement;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

/// Write `contents` via a sibling temp file and rename, so readers never see a
/// partially written file.
pub(crate) fn write_atomic(path: &Path, contents: impl AsRef<[u8]>) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut tmp_name = path
        .file_name()
        .with_context(|| format!("path missing file name {}", path.display()))?
        .to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = parent.join(tmp_name);
    fs::write(&tmp_path, contents.as_ref())
        .with_context(|| format!("write temp {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

/// Serialize `value` to pretty-printed JSON with trailing newline, atomically.
pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value).context("serialize json")?;
    buf.push('\n');
    write_atomic(path, &buf)
}
