//! Persisted per-level checkpoint and last run report.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::types::{Level, Warning, WorkflowRun, WorkflowState};

/// Checkpoint written after every completed transition (`.levelrun/level{N}/state.json`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LevelState {
    pub level: Level,
    /// Last durable state reached. Transient states (paused, AI invoking) are never stored.
    pub checkpoint: WorkflowState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement: Option<PathBuf>,
    /// Organized input file names, sorted.
    #[serde(default)]
    pub inputs: Vec<String>,
    /// Organized sample output file names, sorted.
    #[serde(default)]
    pub sample_outputs: Vec<String>,
    /// Warnings raised while preparing the level, replayed when preparation is skipped.
    #[serde(default)]
    pub warnings: Vec<Warning>,
}

impl LevelState {
    pub fn new(level: Level) -> Self {
        Self {
            level,
            checkpoint: WorkflowState::Init,
            archive: None,
            statement: None,
            inputs: Vec::new(),
            sample_outputs: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

/// Load the checkpoint, or `None` if the level has never been run.
pub fn load_level_state(path: &Path) -> Result<Option<LevelState>> {
    if !path.exists() {
        return Ok(None);
    }
    debug!(path = %path.display(), "loading level state");
    let contents =
        fs::read_to_string(path).with_context(|| format!("read level state {}", path.display()))?;
    let state: LevelState = serde_json::from_str(&contents)
        .with_context(|| format!("parse level state {}", path.display()))?;
    Ok(Some(state))
}

/// Atomically write the checkpoint.
pub fn write_level_state(path: &Path, state: &LevelState) -> Result<()> {
    debug!(path = %path.display(), checkpoint = %state.checkpoint, "writing level state");
    super::write_json(path, state).with_context(|| format!("write level state {}", path.display()))
}

/// Atomically write the report of the run that just finished.
pub fn write_run_report(path: &Path, run: &WorkflowRun) -> Result<()> {
    debug!(path = %path.display(), status = run.status.as_str(), "writing run report");
    super::write_json(path, run).with_context(|| format!("write run report {}", path.display()))
}

pub fn load_run_report(path: &Path) -> Result<WorkflowRun> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read run report {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse run report {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_state_is_none() {
        let temp = tempfile::tempdir().expect("tempdir");
        let loaded = load_level_state(&temp.path().join("state.json")).expect("load");
        assert_eq!(loaded, None);
    }

    #[test]
    fn level_state_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(".levelrun").join("level2").join("state.json");
        let state = LevelState {
            checkpoint: WorkflowState::PromptReady,
            archive: Some(temp.path().join("level2.zip")),
            inputs: vec!["level2_1.in".to_string(), "level2_2.in".to_string()],
            sample_outputs: vec!["level2_1.out".to_string()],
            warnings: vec![Warning::TextExtraction {
                message: "no statement".to_string(),
            }],
            ..LevelState::new(Level::new(2).expect("level"))
        };
        write_level_state(&path, &state).expect("write");

        let raw = fs::read_to_string(&path).expect("read");
        assert!(raw.ends_with('\n'));
        assert!(raw.contains("\"checkpoint\": \"prompt_ready\""));
        assert!(!path.with_file_name("state.json.tmp").exists());

        let loaded = load_level_state(&path).expect("load");
        assert_eq!(loaded, Some(state));
    }
}
