//! Configuration stored under `.levelrun/config.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Workflow configuration (TOML).
///
/// Every field has a default, so a missing file or a partial file is valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LevelrunConfig {
    pub paths: PathsConfig,
    pub solution: SolutionConfig,
    pub assistant: AssistantConfig,
    pub statement: StatementConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    /// Staging root under the project root; each level stages into `<staging_dir>/level{N}`.
    pub staging_dir: PathBuf,
    pub inputs_dir: PathBuf,
    pub outputs_dir: PathBuf,
    /// Overrides the platform download directory searched for archives and statements.
    pub download_dir: Option<PathBuf>,
    /// Extra directories searched for archives after the project root and downloads.
    pub archive_dirs: Vec<PathBuf>,
    /// Directories (relative to the project root) searched for the solution file, in order.
    /// The first entry is where generated solutions are written.
    pub solution_dirs: Vec<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            staging_dir: PathBuf::from("infos"),
            inputs_dir: PathBuf::from("Inputs"),
            outputs_dir: PathBuf::from("Outputs"),
            download_dir: None,
            archive_dirs: Vec::new(),
            solution_dirs: vec![PathBuf::from("."), PathBuf::from("levels")],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SolutionConfig {
    /// Solution file extension: the solution for level N is `level{N}.<extension>`.
    pub extension: String,
    /// Per-input wall-clock limit.
    pub timeout_secs: u64,
    /// Parallel solution invocations; 0 picks available parallelism (at most 4).
    pub workers: usize,
    /// Captured stdout beyond this many bytes fails the input.
    pub output_limit_bytes: usize,
    /// Interpreter command per extension. Extensions without an entry run directly.
    pub interpreters: BTreeMap<String, Vec<String>>,
}

impl Default for SolutionConfig {
    fn default() -> Self {
        let mut interpreters = BTreeMap::new();
        interpreters.insert("py".to_string(), vec!["python3".to_string()]);
        interpreters.insert("sh".to_string(), vec!["sh".to_string()]);
        Self {
            extension: "py".to_string(),
            timeout_secs: 10,
            workers: 0,
            output_limit_bytes: 64 * 1024 * 1024,
            interpreters,
        }
    }
}

impl SolutionConfig {
    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get().min(4))
            .unwrap_or(1)
    }
}

/// AI backends, tried in configured order when available.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// `codex exec`, prompt on stdin, final message to a file.
    Codex,
    /// `assistant.command`, prompt on stdin, reply on stdout.
    Command,
    /// Writes a request file for a human to paste into any assistant.
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AssistantConfig {
    pub backends: Vec<BackendKind>,
    /// Command for the `command` backend (e.g. `["claude", "-p"]`).
    pub command: Vec<String>,
    /// Total budget for one AI invocation across all backends.
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            backends: vec![BackendKind::Codex, BackendKind::Command, BackendKind::Manual],
            command: vec!["claude".to_string(), "-p".to_string()],
            timeout_secs: 5 * 60,
            output_limit_bytes: 1_000_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StatementConfig {
    /// Text extraction command; the document path is appended, then `-` (stdout).
    pub command: Vec<String>,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
}

impl Default for StatementConfig {
    fn default() -> Self {
        Self {
            command: vec!["pdftotext".to_string(), "-layout".to_string()],
            timeout_secs: 60,
            output_limit_bytes: 1_000_000,
        }
    }
}

impl LevelrunConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, dir) in [
            ("paths.staging_dir", &self.paths.staging_dir),
            ("paths.inputs_dir", &self.paths.inputs_dir),
            ("paths.outputs_dir", &self.paths.outputs_dir),
        ] {
            if dir.as_os_str().is_empty() || dir.is_absolute() {
                return Err(anyhow!("{name} must be a non-empty relative path"));
            }
        }
        if self.paths.staging_dir == self.paths.inputs_dir
            || self.paths.staging_dir == self.paths.outputs_dir
            || self.paths.inputs_dir == self.paths.outputs_dir
        {
            return Err(anyhow!(
                "paths.staging_dir, paths.inputs_dir and paths.outputs_dir must differ"
            ));
        }
        if self.paths.solution_dirs.is_empty() {
            return Err(anyhow!("paths.solution_dirs must not be empty"));
        }
        let extension = self.solution.extension.trim();
        if extension.is_empty() || extension.contains(['.', '/', '\\']) {
            return Err(anyhow!(
                "solution.extension must be a bare extension like \"py\""
            ));
        }
        if self.solution.timeout_secs == 0 {
            return Err(anyhow!("solution.timeout_secs must be > 0"));
        }
        if self.solution.output_limit_bytes == 0 {
            return Err(anyhow!("solution.output_limit_bytes must be > 0"));
        }
        if self.assistant.timeout_secs == 0 {
            return Err(anyhow!("assistant.timeout_secs must be > 0"));
        }
        if self.assistant.backends.contains(&BackendKind::Command)
            && self
                .assistant
                .command
                .first()
                .is_none_or(|program| program.trim().is_empty())
        {
            return Err(anyhow!(
                "assistant.command must be a non-empty array when the command backend is enabled"
            ));
        }
        if self.statement.command.is_empty() || self.statement.command[0].trim().is_empty() {
            return Err(anyhow!("statement.command must be a non-empty array"));
        }
        if self.statement.timeout_secs == 0 {
            return Err(anyhow!("statement.timeout_secs must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `LevelrunConfig::default()`.
pub fn load_config(path: &Path) -> Result<LevelrunConfig> {
    if !path.exists() {
        let cfg = LevelrunConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: LevelrunConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &LevelrunConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    super::write_atomic(path, &buf)
}
