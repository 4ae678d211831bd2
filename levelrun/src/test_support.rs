//! Test-only helpers: a throwaway contest project and scripted collaborators.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

use crate::core::types::{Level, Mode};
use crate::io::assistant::{Assistant, AssistantRequest};
use crate::io::config::{LevelrunConfig, write_config};
use crate::io::paths::{LevelPaths, default_config_path};
use crate::io::resume::{ResumeEvent, ResumeSignal};
use crate::io::statement::TextExtractor;
use crate::workflow::{RunOptions, WorkflowContext};

pub fn level(number: u32) -> Level {
    Level::new(number).expect("level")
}

/// Write a zip archive with the given `(name, contents)` entries.
pub fn write_zip(path: &Path, entries: &[(&str, &str)]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create archive dir");
    }
    let file = File::create(path).expect("create zip");
    let mut zip = zip::ZipWriter::new(file);
    for (name, contents) in entries {
        zip.start_file(*name, SimpleFileOptions::default())
            .expect("start file");
        zip.write_all(contents.as_bytes()).expect("write entry");
    }
    zip.finish().expect("finish zip");
}

/// A project root in a temp dir, configured for `sh` solutions and a
/// project-local downloads directory.
pub struct TestProject {
    dir: TempDir,
    pub config: LevelrunConfig,
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

impl TestProject {
    pub fn new() -> Self {
        let mut config = LevelrunConfig::default();
        config.paths.download_dir = Some(PathBuf::from("downloads"));
        config.solution.extension = "sh".to_string();
        config.solution.timeout_secs = 5;
        config.solution.workers = 2;
        config.assistant.timeout_secs = 5;
        Self {
            dir: tempfile::tempdir().expect("tempdir"),
            config,
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn paths(&self, number: u32) -> LevelPaths {
        LevelPaths::new(
            self.root(),
            level(number),
            &self.config.paths,
            &self.config.solution.extension,
        )
    }

    /// Write `level{N}.zip` at the project root.
    pub fn write_archive(&self, number: u32, entries: &[(&str, &str)]) -> PathBuf {
        let path = self.root().join(format!("level{number}.zip"));
        write_zip(&path, entries);
        path
    }

    /// Write the level's solution at its default location.
    pub fn write_solution(&self, number: u32, source: &str) -> PathBuf {
        let path = self.paths(number).default_solution();
        write_solution_file(&path, source);
        path
    }

    pub fn context(&self, number: u32, mode: Mode, options: RunOptions) -> WorkflowContext {
        WorkflowContext::new(self.root(), level(number), mode, options, self.config.clone())
    }

    /// Persist the config where the CLI looks for it.
    pub fn save_config(&self) -> PathBuf {
        let path = default_config_path(self.root());
        write_config(&path, &self.config).expect("write config");
        path
    }

    /// Relative file names under `dir`, sorted. Missing dir reads as empty.
    pub fn list(&self, dir: &Path) -> Vec<String> {
        let Ok(entries) = fs::read_dir(dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .map(|entry| {
                entry
                    .expect("dir entry")
                    .file_name()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        names.sort();
        names
    }
}

/// Bytes of every file under Inputs and Outputs plus every solution candidate,
/// keyed by path relative to the project root.
pub fn snapshot_protected(paths: &LevelPaths) -> BTreeMap<PathBuf, Vec<u8>> {
    let mut files: Vec<PathBuf> = paths.solution_candidates();
    for dir in [&paths.inputs, &paths.outputs] {
        files.extend(
            walkdir::WalkDir::new(dir)
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_file())
                .map(walkdir::DirEntry::into_path),
        );
    }
    files
        .into_iter()
        .filter(|path| path.is_file())
        .map(|path| {
            let bytes = fs::read(&path).expect("read protected file");
            let relative = path
                .strip_prefix(&paths.root)
                .map(Path::to_path_buf)
                .unwrap_or(path);
            (relative, bytes)
        })
        .collect()
}

/// Write a solution script, creating parent directories.
pub fn write_solution_file(path: &Path, source: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create solution dir");
    }
    fs::write(path, source).expect("write solution");
}

/// Assistant returning a fixed reply (or failure) and counting calls.
pub struct ScriptedAssistant {
    reply: Result<String, String>,
    calls: Cell<usize>,
    last_prompt: RefCell<Option<String>>,
}

impl ScriptedAssistant {
    pub fn replying(reply: &str) -> Self {
        Self::with(Ok(reply.to_string()))
    }

    pub fn failing(message: &str) -> Self {
        Self::with(Err(message.to_string()))
    }

    fn with(reply: Result<String, String>) -> Self {
        Self {
            reply,
            calls: Cell::new(0),
            last_prompt: RefCell::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.borrow().clone()
    }
}

impl Assistant for ScriptedAssistant {
    fn name(&self) -> &str {
        "scripted"
    }

    fn complete(&self, request: &AssistantRequest) -> Result<String> {
        self.calls.set(self.calls.get() + 1);
        *self.last_prompt.borrow_mut() = Some(request.prompt.clone());
        self.reply.clone().map_err(|message| anyhow!(message))
    }
}

type ResumeAction = Box<dyn FnMut(usize)>;

/// Resume source replaying a fixed list of events, then `Closed`.
///
/// An optional action runs before each `Resume` is delivered, receiving the
/// zero-based index of that resume (e.g. to save the solution on the second).
pub struct ScriptedResume {
    events: VecDeque<ResumeEvent>,
    action: Option<ResumeAction>,
    resumes: usize,
    waits: usize,
}

impl ScriptedResume {
    pub fn new(events: impl IntoIterator<Item = ResumeEvent>) -> Self {
        Self {
            events: events.into_iter().collect(),
            action: None,
            resumes: 0,
            waits: 0,
        }
    }

    /// Closes immediately, leaving the run paused.
    pub fn closed() -> Self {
        Self::new([])
    }

    pub fn on_resume(mut self, action: impl FnMut(usize) + 'static) -> Self {
        self.action = Some(Box::new(action));
        self
    }

    pub fn waits(&self) -> usize {
        self.waits
    }
}

impl ResumeSignal for ScriptedResume {
    fn wait(&mut self, _solution_hint: &str) -> Result<ResumeEvent> {
        self.waits += 1;
        let event = self.events.pop_front().unwrap_or(ResumeEvent::Closed);
        if event == ResumeEvent::Resume {
            if let Some(action) = self.action.as_mut() {
                action(self.resumes);
            }
            self.resumes += 1;
        }
        Ok(event)
    }
}

/// Text extractor with a canned result.
pub struct StaticTextExtractor {
    result: Result<String, String>,
}

impl StaticTextExtractor {
    pub fn text(text: &str) -> Self {
        Self {
            result: Ok(text.to_string()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
        }
    }
}

impl TextExtractor for StaticTextExtractor {
    fn extract(&self, _document: &Path) -> Result<String> {
        self.result.clone().map_err(|message| anyhow!(message))
    }
}
