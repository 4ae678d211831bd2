//! Removing a level's staging directory after a successful run.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};
use walkdir::WalkDir;

use crate::core::containment::DeleteGuard;
use crate::error::WorkflowError;
use crate::io::paths::LevelPaths;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanReport {
    pub removed_files: usize,
    pub removed_dirs: usize,
}

/// Guard protecting everything a run produced or relies on.
pub fn delete_guard(paths: &LevelPaths) -> DeleteGuard {
    let mut protected_files = paths.solution_candidates();
    protected_files.extend([
        paths.prompt.clone(),
        paths.workflow_guide.clone(),
        paths.ai_request.clone(),
    ]);
    DeleteGuard {
        staging_root: paths.staging.clone(),
        protected_dirs: vec![
            paths.inputs.clone(),
            paths.outputs.clone(),
            paths.state_dir.clone(),
        ],
        protected_files,
    }
}

/// Delete everything under the level's staging directory, then the directory.
///
/// Every path is checked against [`delete_guard`] before anything is deleted;
/// one refusal fails with [`WorkflowError::CleanupViolation`] and deletes nothing.
/// A missing staging directory is a no-op.
#[instrument(skip_all, fields(staging = %paths.staging.display()))]
pub fn clean_staging(paths: &LevelPaths) -> Result<CleanReport> {
    let mut report = CleanReport::default();
    if !paths.staging.exists() {
        debug!("nothing to clean");
        return Ok(report);
    }
    let guard = delete_guard(paths);

    let mut doomed: Vec<(PathBuf, bool)> = Vec::new();
    for entry in WalkDir::new(&paths.staging).contents_first(true).min_depth(1) {
        let entry = entry.context("walk staging directory")?;
        let path = entry.path().to_path_buf();
        if let Err(refusal) = guard.check(&path) {
            return Err(WorkflowError::CleanupViolation {
                path,
                reason: refusal.to_string(),
            }
            .into());
        }
        doomed.push((path, entry.file_type().is_dir()));
    }

    for (path, is_dir) in doomed {
        if is_dir {
            fs::remove_dir(&path).with_context(|| format!("remove dir {}", path.display()))?;
            report.removed_dirs += 1;
        } else {
            fs::remove_file(&path).with_context(|| format!("remove {}", path.display()))?;
            report.removed_files += 1;
        }
    }
    fs::remove_dir(&paths.staging)
        .with_context(|| format!("remove dir {}", paths.staging.display()))?;
    report.removed_dirs += 1;
    if paths
        .staging_root
        .read_dir()
        .is_ok_and(|mut entries| entries.next().is_none())
    {
        fs::remove_dir(&paths.staging_root)
            .with_context(|| format!("remove dir {}", paths.staging_root.display()))?;
        report.removed_dirs += 1;
    }

    info!(
        files = report.removed_files,
        dirs = report.removed_dirs,
        "staging cleaned"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Level;
    use crate::io::config::PathsConfig;

    fn paths_with(root: &std::path::Path, cfg: &PathsConfig) -> LevelPaths {
        LevelPaths::new(root, Level::new(1).expect("level"), cfg, "py")
    }

    #[test]
    fn removes_staging_and_keeps_everything_else() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = paths_with(temp.path(), &PathsConfig::default());
        fs::create_dir_all(paths.staging.join("nested")).expect("mkdir");
        fs::write(paths.staging.join("Level 1.pdf"), "%PDF").expect("write");
        fs::write(paths.staging.join("nested").join("notes.txt"), "x").expect("write");
        fs::create_dir_all(&paths.inputs).expect("mkdir");
        fs::write(paths.inputs.join("level1_1.in"), "1").expect("write");
        fs::write(paths.default_solution(), "print(1)").expect("write");

        let report = clean_staging(&paths).expect("clean");
        assert_eq!(report.removed_files, 2);
        assert!(!paths.staging.exists());
        assert!(!paths.staging_root.exists());
        assert!(paths.inputs.join("level1_1.in").exists());
        assert!(paths.default_solution().exists());
    }

    #[test]
    fn protected_files_are_byte_identical_after_cleanup() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = paths_with(temp.path(), &PathsConfig::default());
        fs::create_dir_all(&paths.staging).expect("mkdir");
        fs::write(paths.staging.join("Level 1.pdf"), "%PDF").expect("write");
        fs::write(paths.staging.join("level1_1.in"), "staged copy").expect("write");
        fs::create_dir_all(&paths.inputs).expect("mkdir");
        fs::create_dir_all(&paths.outputs).expect("mkdir");
        fs::write(paths.inputs.join("level1_1.in"), "1 2 3\n").expect("write");
        fs::write(paths.outputs.join("level1_example.out"), "6\n\n").expect("write");
        fs::write(paths.outputs.join("level1_1.out"), "6\n").expect("write");
        fs::create_dir_all(paths.root.join("levels")).expect("mkdir");
        fs::write(paths.root.join("levels").join("level1.py"), "print(6)\n").expect("write");

        let before = crate::test_support::snapshot_protected(&paths);
        assert_eq!(before.len(), 4);
        clean_staging(&paths).expect("clean");
        assert_eq!(crate::test_support::snapshot_protected(&paths), before);
        assert!(!paths.staging.exists());
    }

    #[test]
    fn other_levels_staging_is_kept() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = PathsConfig::default();
        let paths = paths_with(temp.path(), &cfg);
        let other = LevelPaths::new(temp.path(), Level::new(2).expect("level"), &cfg, "py");
        fs::create_dir_all(&paths.staging).expect("mkdir");
        fs::create_dir_all(&other.staging).expect("mkdir");
        fs::write(other.staging.join("level2_1.in"), "2").expect("write");

        clean_staging(&paths).expect("clean");
        assert!(other.staging.join("level2_1.in").exists());
        assert!(paths.staging_root.exists());
    }

    #[test]
    fn missing_staging_is_a_no_op() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = paths_with(temp.path(), &PathsConfig::default());
        assert_eq!(clean_staging(&paths).expect("clean"), CleanReport::default());
    }

    #[test]
    fn protected_dir_inside_staging_aborts_without_deleting() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = PathsConfig {
            staging_dir: "work".into(),
            inputs_dir: "work/level1/Inputs".into(),
            ..PathsConfig::default()
        };
        let paths = paths_with(temp.path(), &cfg);
        fs::create_dir_all(&paths.inputs).expect("mkdir");
        fs::write(paths.inputs.join("level1_1.in"), "1").expect("write");
        fs::write(paths.staging.join("scratch.txt"), "x").expect("write");

        let err = clean_staging(&paths).expect_err("violation");
        assert!(matches!(
            err.downcast_ref::<WorkflowError>(),
            Some(WorkflowError::CleanupViolation { .. })
        ));
        assert!(paths.inputs.join("level1_1.in").exists());
        assert!(paths.staging.join("scratch.txt").exists());
    }
}
