//! Lexical path containment checks guarding every cleanup delete.

use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Paths the cleaner must never delete, plus the root it may delete under.
#[derive(Debug, Clone)]
pub struct DeleteGuard {
    pub staging_root: PathBuf,
    pub protected_dirs: Vec<PathBuf>,
    pub protected_files: Vec<PathBuf>,
}

/// Why a delete was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteRefusal {
    OutsideStaging,
    IsStagingRoot,
    InsideProtectedDir(PathBuf),
    ProtectedFile(PathBuf),
}

impl fmt::Display for DeleteRefusal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeleteRefusal::OutsideStaging => f.write_str("outside the staging directory"),
            DeleteRefusal::IsStagingRoot => f.write_str("is the staging directory itself"),
            DeleteRefusal::InsideProtectedDir(dir) => write!(f, "inside protected {}", dir.display()),
            DeleteRefusal::ProtectedFile(file) => write!(f, "protected file {}", file.display()),
        }
    }
}

impl DeleteGuard {
    /// Check that `path` is strictly inside the staging root and not protected.
    ///
    /// All paths are compared after lexical normalization, so `staging/../Inputs/x`
    /// is treated as `Inputs/x`.
    pub fn check(&self, path: &Path) -> Result<(), DeleteRefusal> {
        let path = normalize(path);
        let staging = normalize(&self.staging_root);
        if path == staging {
            return Err(DeleteRefusal::IsStagingRoot);
        }
        if !is_within(&path, &staging) {
            return Err(DeleteRefusal::OutsideStaging);
        }
        for dir in &self.protected_dirs {
            let dir = normalize(dir);
            if path == dir || is_within(&path, &dir) {
                return Err(DeleteRefusal::InsideProtectedDir(dir));
            }
        }
        for file in &self.protected_files {
            let file = normalize(file);
            if path == file {
                return Err(DeleteRefusal::ProtectedFile(file));
            }
        }
        Ok(())
    }
}

/// True if `path` lies strictly below `root` (component-wise, not string prefix).
pub fn is_within(path: &Path, root: &Path) -> bool {
    path != root && path.starts_with(root)
}

/// Resolve `.` and `..` components without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
