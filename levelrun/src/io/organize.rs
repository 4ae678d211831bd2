//! Routing staged `.in`/`.out` files into the shared Inputs/Outputs directories.
//!
//! Organization is planned in full before anything moves: every destination is
//! computed and compared by SHA-256 first, so a conflict leaves the tree as it was.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};
use walkdir::WalkDir;

use crate::core::classify::{classify, routed_name};
use crate::core::types::Bucket;
use crate::error::WorkflowError;
use crate::io::paths::LevelPaths;

/// Result of organizing one level's staging directory.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OrganizeReport {
    /// Routed input file names, sorted.
    pub inputs: Vec<String>,
    /// Routed sample output file names, sorted.
    pub sample_outputs: Vec<String>,
    /// Files actually moved.
    pub moved: usize,
    /// Staged copies dropped because the destination already held identical content.
    pub unchanged: usize,
}

#[derive(Debug)]
enum Action {
    Move,
    /// Destination already holds the same bytes; only the staged copy goes.
    DropStaged,
}

#[derive(Debug)]
struct PlannedMove {
    source: PathBuf,
    dest: PathBuf,
    action: Action,
}

/// Route every classified file under `paths.staging` into Inputs/Outputs.
///
/// Re-running is a no-op for files already routed with identical content. A
/// destination holding different content fails with
/// [`WorkflowError::OrganizeConflict`] before any file is moved.
#[instrument(skip_all, fields(level = %paths.level))]
pub fn organize(paths: &LevelPaths) -> Result<OrganizeReport> {
    let mut planned: BTreeMap<PathBuf, (PathBuf, String)> = BTreeMap::new();
    let mut plan = Vec::new();
    let mut report = OrganizeReport::default();

    for entry in WalkDir::new(&paths.staging).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if !paths.staging.exists() => {
                debug!(err = %err, "no staging directory");
                break;
            }
            Err(err) => return Err(err).context("walk staging directory"),
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(file_name) = entry.file_name().to_str() else {
            continue;
        };
        let Some(bucket) = classify(file_name) else {
            continue;
        };
        let dest_name = routed_name(paths.level, file_name);
        let dest = match bucket {
            Bucket::Inputs => paths.inputs.join(&dest_name),
            Bucket::Outputs => paths.outputs.join(&dest_name),
        };
        let source = entry.into_path();
        let digest = file_sha256(&source)?;

        let action = if let Some((first_source, first_digest)) = planned.get(&dest) {
            if *first_digest != digest {
                return Err(WorkflowError::OrganizeConflict {
                    incoming: source,
                    existing: first_source.clone(),
                }
                .into());
            }
            Action::DropStaged
        } else if dest.exists() {
            if file_sha256(&dest)? != digest {
                return Err(WorkflowError::OrganizeConflict {
                    incoming: source,
                    existing: dest,
                }
                .into());
            }
            Action::DropStaged
        } else {
            Action::Move
        };

        if !planned.contains_key(&dest) {
            match bucket {
                Bucket::Inputs => report.inputs.push(dest_name),
                Bucket::Outputs => report.sample_outputs.push(dest_name),
            }
        }
        planned
            .entry(dest.clone())
            .or_insert_with(|| (source.clone(), digest));
        plan.push(PlannedMove {
            source,
            dest,
            action,
        });
    }

    for step in plan {
        match step.action {
            Action::Move => {
                move_file(&step.source, &step.dest)?;
                report.moved += 1;
            }
            Action::DropStaged => {
                fs::remove_file(&step.source)
                    .with_context(|| format!("remove staged {}", step.source.display()))?;
                report.unchanged += 1;
            }
        }
        debug!(source = %step.source.display(), dest = %step.dest.display(), "routed");
    }

    report.inputs.sort();
    report.sample_outputs.sort();
    info!(
        inputs = report.inputs.len(),
        sample_outputs = report.sample_outputs.len(),
        moved = report.moved,
        unchanged = report.unchanged,
        "files organized"
    );
    Ok(report)
}

/// Rename, falling back to copy-then-rename across filesystems.
fn move_file(source: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    if fs::rename(source, dest).is_ok() {
        return Ok(());
    }
    let mut tmp_name = dest.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = dest.with_file_name(tmp_name);
    fs::copy(source, &tmp)
        .with_context(|| format!("copy {} to {}", source.display(), tmp.display()))?;
    fs::rename(&tmp, dest).with_context(|| format!("replace {}", dest.display()))?;
    fs::remove_file(source).with_context(|| format!("remove staged {}", source.display()))?;
    Ok(())
}

fn file_sha256(path: &Path) -> Result<String> {
    let contents = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(contents);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Level;
    use crate::io::config::PathsConfig;

    fn setup() -> (tempfile::TempDir, LevelPaths) {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = LevelPaths::new(
            temp.path(),
            Level::new(1).expect("level"),
            &PathsConfig::default(),
            "py",
        );
        fs::create_dir_all(paths.staging.join("samples")).expect("mkdir");
        (temp, paths)
    }

    fn stage(paths: &LevelPaths, name: &str, contents: &str) {
        fs::write(paths.staging.join(name), contents).expect("write staged");
    }

    #[test]
    fn routes_by_extension_and_prefixes_names() {
        let (_temp, paths) = setup();
        stage(&paths, "level1_1.in", "1\n");
        stage(&paths, "samples/example.in", "2\n");
        stage(&paths, "samples/example.out", "4\n");
        stage(&paths, "Level 1.pdf", "%PDF");

        let report = organize(&paths).expect("organize");
        assert_eq!(report.inputs, vec!["level1_1.in", "level1_example.in"]);
        assert_eq!(report.sample_outputs, vec!["level1_example.out"]);
        assert_eq!(report.moved, 3);
        assert_eq!(
            fs::read_to_string(paths.inputs.join("level1_example.in")).expect("read"),
            "2\n"
        );
        assert!(paths.staging.join("Level 1.pdf").exists());
        assert!(!paths.staging.join("level1_1.in").exists());
    }

    #[test]
    fn uppercase_extensions_land_lowercased() {
        let (_temp, paths) = setup();
        stage(&paths, "X.IN", "5\n");
        stage(&paths, "samples/X.OUT", "25\n");

        let report = organize(&paths).expect("organize");
        assert_eq!(report.inputs, vec!["level1_X.in"]);
        assert_eq!(report.sample_outputs, vec!["level1_X.out"]);
        assert!(paths.inputs.join("level1_X.in").exists());
        assert!(paths.outputs.join("level1_X.out").exists());
    }

    #[test]
    fn identical_rerun_is_a_no_op() {
        let (_temp, paths) = setup();
        stage(&paths, "level1_1.in", "1\n");
        organize(&paths).expect("first");
        stage(&paths, "level1_1.in", "1\n");
        let report = organize(&paths).expect("second");
        assert_eq!(report.moved, 0);
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.inputs, vec!["level1_1.in"]);
        assert!(!paths.staging.join("level1_1.in").exists());
    }

    #[test]
    fn differing_existing_file_conflicts_and_moves_nothing() {
        let (_temp, paths) = setup();
        fs::create_dir_all(&paths.inputs).expect("mkdir");
        fs::write(paths.inputs.join("level1_2.in"), "old\n").expect("write");
        stage(&paths, "level1_1.in", "1\n");
        stage(&paths, "level1_2.in", "new\n");

        let err = organize(&paths).expect_err("conflict");
        assert!(matches!(
            err.downcast_ref::<WorkflowError>(),
            Some(WorkflowError::OrganizeConflict { .. })
        ));
        assert!(paths.staging.join("level1_1.in").exists());
        assert!(!paths.inputs.join("level1_1.in").exists());
        assert_eq!(
            fs::read_to_string(paths.inputs.join("level1_2.in")).expect("read"),
            "old\n"
        );
    }

    #[test]
    fn two_staged_files_with_one_destination_must_agree() {
        let (_temp, paths) = setup();
        stage(&paths, "a.in", "1\n");
        stage(&paths, "level1_a.in", "2\n");
        let err = organize(&paths).expect_err("conflict");
        assert!(matches!(
            err.downcast_ref::<WorkflowError>(),
            Some(WorkflowError::OrganizeConflict { .. })
        ));

        let (_temp, paths) = setup();
        stage(&paths, "a.in", "1\n");
        stage(&paths, "samples/a.in", "1\n");
        let report = organize(&paths).expect("organize");
        assert_eq!(report.inputs, vec!["level1_a.in"]);
        assert_eq!(report.moved, 1);
        assert_eq!(report.unchanged, 1);
    }

    #[test]
    fn missing_staging_is_empty() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = LevelPaths::new(
            temp.path(),
            Level::new(1).expect("level"),
            &PathsConfig::default(),
            "py",
        );
        assert_eq!(organize(&paths).expect("organize"), OrganizeReport::default());
    }
}
