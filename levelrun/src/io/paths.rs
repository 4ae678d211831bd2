//! Canonical filesystem locations for one level.

use std::path::{Path, PathBuf};

use crate::core::containment::normalize;
use crate::core::types::Level;
use crate::io::config::PathsConfig;

/// Directory under the project root holding levelrun's own state.
pub const STATE_DIR: &str = ".levelrun";

/// Default config location for a project root.
pub fn default_config_path(root: &Path) -> PathBuf {
    root.join(STATE_DIR).join("config.toml")
}

/// All canonical paths for a level within a project root.
///
/// A level number fully determines these locations; files shared between
/// levels (Inputs/Outputs) are disambiguated by the `level{N}_` name prefix.
#[derive(Debug, Clone)]
pub struct LevelPaths {
    pub level: Level,
    pub root: PathBuf,
    pub staging_root: PathBuf,
    pub staging: PathBuf,
    pub inputs: PathBuf,
    pub outputs: PathBuf,
    pub prompt: PathBuf,
    pub workflow_guide: PathBuf,
    pub ai_request: PathBuf,
    pub state_dir: PathBuf,
    pub checkpoint: PathBuf,
    pub last_run: PathBuf,
    pub logs_dir: PathBuf,
    pub archive_name: String,
    pub solution_name: String,
    solution_dirs: Vec<PathBuf>,
}

impl LevelPaths {
    pub fn new(root: impl Into<PathBuf>, level: Level, paths: &PathsConfig, extension: &str) -> Self {
        let root = root.into();
        let staging_root = root.join(&paths.staging_dir);
        let state_dir = root.join(STATE_DIR).join(level.to_string());
        Self {
            level,
            staging: staging_root.join(level.to_string()),
            staging_root,
            inputs: root.join(&paths.inputs_dir),
            outputs: root.join(&paths.outputs_dir),
            prompt: root.join(format!("{level}_prompt.txt")),
            workflow_guide: root.join(format!("{level}_workflow.md")),
            ai_request: root.join(format!("{level}_ai_request.md")),
            checkpoint: state_dir.join("state.json"),
            last_run: state_dir.join("last_run.json"),
            logs_dir: state_dir.join("logs"),
            state_dir,
            archive_name: format!("{level}.zip"),
            solution_name: format!("{level}.{extension}"),
            solution_dirs: paths
                .solution_dirs
                .iter()
                .map(|dir| normalize(&root.join(dir)))
                .collect(),
            root,
        }
    }

    /// Every location the solution file may live, in search order.
    pub fn solution_candidates(&self) -> Vec<PathBuf> {
        self.solution_dirs
            .iter()
            .map(|dir| dir.join(&self.solution_name))
            .collect()
    }

    /// First existing solution file, if any.
    pub fn existing_solution(&self) -> Option<PathBuf> {
        self.solution_candidates().into_iter().find(|p| p.is_file())
    }

    /// Where a new solution file (template or assistant output) is written.
    pub fn default_solution(&self) -> PathBuf {
        self.solution_dirs
            .first()
            .unwrap_or(&self.root)
            .join(&self.solution_name)
    }
}
