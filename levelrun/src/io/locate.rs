//! Finding a level's archive and statement document on disk.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::core::types::Level;
use crate::error::{Artifact, WorkflowError};
use crate::io::config::PathsConfig;
use crate::io::paths::LevelPaths;

/// The user's download directory: config override, else the platform default,
/// else `~/Downloads`.
pub fn download_dir(root: &Path, cfg: &PathsConfig) -> Option<PathBuf> {
    if let Some(dir) = &cfg.download_dir {
        return Some(root.join(dir));
    }
    dirs::download_dir().or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
}

/// Directories searched for `level{N}.zip`, in order.
pub fn archive_search_dirs(paths: &LevelPaths, cfg: &PathsConfig) -> Vec<PathBuf> {
    let mut dirs = vec![paths.root.clone()];
    dirs.extend(download_dir(&paths.root, cfg));
    dirs.extend(cfg.archive_dirs.iter().map(|dir| paths.root.join(dir)));
    dirs.dedup();
    dirs
}

/// First `level{N}.zip` found in the search directories.
///
/// Fails with [`WorkflowError::NotFound`] listing every directory searched.
pub fn locate_archive(paths: &LevelPaths, cfg: &PathsConfig) -> Result<PathBuf> {
    let searched = archive_search_dirs(paths, cfg);
    for dir in &searched {
        let candidate = dir.join(&paths.archive_name);
        debug!(path = %candidate.display(), "checking archive candidate");
        if candidate.is_file() {
            info!(path = %candidate.display(), "archive found");
            return Ok(candidate);
        }
    }
    Err(WorkflowError::NotFound {
        artifact: Artifact::Archive,
        name: paths.archive_name.clone(),
        searched,
    }
    .into())
}

/// Matches `Level 3.pdf`, `level3.pdf`, `Level3.pdf` and `level 3.pdf`.
fn statement_pattern(level: Level) -> Result<Regex> {
    let pattern = format!(r"(?i)^level ?{}\.pdf$", level.number());
    Regex::new(&pattern).with_context(|| format!("compile statement pattern {pattern}"))
}

/// Find the statement document for the level.
///
/// Looks for a canonically named statement in staging (recursively), the project
/// root and the download directory, then falls back to the first PDF in staging.
/// `Ok(None)` when nothing is found; callers treat that as a warning.
pub fn locate_statement(paths: &LevelPaths, cfg: &PathsConfig) -> Result<Option<PathBuf>> {
    let pattern = statement_pattern(paths.level)?;
    let matches_name = |path: &Path| {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| pattern.is_match(n))
    };

    if let Some(found) = staged_files(&paths.staging).find(|p| matches_name(p)) {
        return Ok(Some(found));
    }
    let flat_dirs = std::iter::once(paths.root.clone()).chain(download_dir(&paths.root, cfg));
    for dir in flat_dirs {
        if let Some(found) = flat_files(&dir)?.into_iter().find(|p| matches_name(p)) {
            return Ok(Some(found));
        }
    }
    let any_pdf = staged_files(&paths.staging).find(|p| {
        p.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
    });
    if let Some(found) = &any_pdf {
        debug!(path = %found.display(), "using first staged pdf as statement");
    }
    Ok(any_pdf)
}

/// Files under `dir`, recursively, in lexicographic order. Missing dir yields nothing.
fn staged_files(dir: &Path) -> impl Iterator<Item = PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
}

/// Regular files directly inside `dir`, sorted. Missing dir yields nothing.
fn flat_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))? {
        let entry = entry.with_context(|| format!("read dir entry in {}", dir.display()))?;
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn setup(level: u32) -> (tempfile::TempDir, LevelPaths, PathsConfig) {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = PathsConfig {
            download_dir: Some(PathBuf::from("downloads")),
            ..PathsConfig::default()
        };
        let paths = LevelPaths::new(temp.path(), Level::new(level).expect("level"), &cfg, "py");
        (temp, paths, cfg)
    }

    #[test]
    fn archive_prefers_project_root_over_downloads() {
        let (temp, paths, cfg) = setup(2);
        let downloads = temp.path().join("downloads");
        fs::create_dir_all(&downloads).expect("mkdir");
        fs::write(downloads.join("level2.zip"), b"d").expect("write");
        assert_eq!(
            locate_archive(&paths, &cfg).expect("locate"),
            downloads.join("level2.zip")
        );

        fs::write(temp.path().join("level2.zip"), b"r").expect("write");
        assert_eq!(
            locate_archive(&paths, &cfg).expect("locate"),
            temp.path().join("level2.zip")
        );
    }

    #[test]
    fn missing_archive_is_not_found_with_searched_dirs() {
        let (temp, paths, cfg) = setup(2);
        let err = locate_archive(&paths, &cfg).expect_err("missing");
        match err.downcast_ref::<WorkflowError>() {
            Some(WorkflowError::NotFound {
                artifact: Artifact::Archive,
                name,
                searched,
            }) => {
                assert_eq!(name, "level2.zip");
                assert_eq!(
                    searched,
                    &vec![temp.path().to_path_buf(), temp.path().join("downloads")]
                );
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn statement_name_variants_match_exact_level_only() {
        let pattern = statement_pattern(Level::new(3).expect("level")).expect("regex");
        for name in ["Level 3.pdf", "level3.pdf", "Level3.pdf", "level 3.pdf", "LEVEL 3.PDF"] {
            assert!(pattern.is_match(name), "{name}");
        }
        for name in ["Level 13.pdf", "Level 30.pdf", "Level 3.pdf.bak", "Level  3.pdf"] {
            assert!(!pattern.is_match(name), "{name}");
        }
    }

    #[test]
    fn statement_found_in_staging_then_falls_back_to_any_pdf() {
        let (_temp, paths, cfg) = setup(1);
        fs::create_dir_all(paths.staging.join("docs")).expect("mkdir");
        fs::write(paths.staging.join("docs").join("zz.pdf"), b"pdf").expect("write");
        fs::write(paths.staging.join("aa.pdf"), b"pdf").expect("write");
        assert_eq!(
            locate_statement(&paths, &cfg).expect("locate"),
            Some(paths.staging.join("aa.pdf"))
        );

        fs::write(paths.staging.join("docs").join("Level 1.pdf"), b"pdf").expect("write");
        assert_eq!(
            locate_statement(&paths, &cfg).expect("locate"),
            Some(paths.staging.join("docs").join("Level 1.pdf"))
        );
    }

    #[test]
    fn statement_missing_everywhere_is_none() {
        let (_temp, paths, cfg) = setup(1);
        assert_eq!(locate_statement(&paths, &cfg).expect("locate"), None);
    }
}
