//! Shared deterministic types for the level workflow.
//!
//! These types define stable contracts between the orchestrator and its
//! components. They do not touch the filesystem and serialize to a stable
//! shape for the persisted checkpoint and run report.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A contest round, identified by a positive round number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Level(u32);

impl Level {
    pub fn new(number: u32) -> Result<Self, InvalidLevel> {
        if number == 0 {
            return Err(InvalidLevel);
        }
        Ok(Self(number))
    }

    pub fn number(self) -> u32 {
        self.0
    }

    /// File-name prefix shared by every routed input/output of this round (`level5_`).
    pub fn file_prefix(self) -> String {
        format!("level{}_", self.0)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "level{}", self.0)
    }
}

impl TryFrom<u32> for Level {
    type Error = InvalidLevel;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Level> for u32 {
    fn from(level: Level) -> Self {
        level.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidLevel;

impl fmt::Display for InvalidLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("level number must be a positive integer")
    }
}

impl std::error::Error for InvalidLevel {}

/// How a run proceeds once the prompt is ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Pause until a human confirms the solution exists.
    Interactive,
    /// Ask an AI assistant for a solution, pausing if that fails.
    Auto,
    /// Stop once inputs are organized and the prompt is written.
    ProcessOnly,
    /// Write a placeholder solution if none exists.
    Template,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Interactive => "interactive",
            Mode::Auto => "auto",
            Mode::ProcessOnly => "process-only",
            Mode::Template => "template",
        }
    }
}

/// Workflow state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Init,
    Extracted,
    PromptReady,
    Paused,
    AiInvoking,
    SolutionReady,
    Executed,
    Cleaned,
    Aborted,
}

impl WorkflowState {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowState::Init => "init",
            WorkflowState::Extracted => "extracted",
            WorkflowState::PromptReady => "prompt_ready",
            WorkflowState::Paused => "paused",
            WorkflowState::AiInvoking => "ai_invoking",
            WorkflowState::SolutionReady => "solution_ready",
            WorkflowState::Executed => "executed",
            WorkflowState::Cleaned => "cleaned",
            WorkflowState::Aborted => "aborted",
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final status of one workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    Success,
    PartialSuccess,
    /// Suspended waiting for a solution; re-running resumes.
    Paused,
    Aborted,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::PartialSuccess => "partial-success",
            RunStatus::Paused => "paused",
            RunStatus::Aborted => "aborted",
        }
    }
}

/// Canonical destination for an organized file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    Inputs,
    Outputs,
}

/// One recorded transition of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub from: WorkflowState,
    pub to: WorkflowState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Non-fatal problems recorded during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// Statement text unavailable; the prompt carries a placeholder.
    TextExtraction { message: String },
    /// The AI assistant did not produce a solution; the run paused instead.
    Assistant { message: String },
    /// An archive entry was not extracted.
    SkippedEntry { name: String },
    /// Resumed but the solution file was still missing.
    SolutionStillMissing { path: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::TextExtraction { message } => write!(f, "statement text unavailable: {message}"),
            Warning::Assistant { message } => write!(f, "assistant failed: {message}"),
            Warning::SkippedEntry { name } => write!(f, "skipped archive entry {name}"),
            Warning::SolutionStillMissing { path } => {
                write!(f, "resumed but {path} does not exist yet")
            }
        }
    }
}

/// Why one solution invocation failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    NonZeroExit { code: Option<i32> },
    TimedOut { secs: u64 },
    SpawnFailed { message: String },
    Io { message: String },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::NonZeroExit { code: Some(code) } => write!(f, "exit code {code}"),
            FailureReason::NonZeroExit { code: None } => f.write_str("terminated by signal"),
            FailureReason::TimedOut { secs } => write!(f, "timed out after {secs}s"),
            FailureReason::SpawnFailed { message } => write!(f, "failed to start: {message}"),
            FailureReason::Io { message } => write!(f, "i/o error: {message}"),
        }
    }
}

/// Outcome of running the solution on one input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Succeeded {
        /// File name written under the Outputs directory.
        output: String,
        /// Whether the output matches the shipped sample, when one exists.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sample_match: Option<bool>,
    },
    Failed {
        reason: FailureReason,
    },
}

/// Per-input result, attributed by input file name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputResult {
    pub input: String,
    #[serde(flatten)]
    pub outcome: ExecutionOutcome,
}

impl InputResult {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, ExecutionOutcome::Succeeded { .. })
    }
}

/// Results for every input of a run, ordered by input name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub results: Vec<InputResult>,
}

impl ExecutionSummary {
    /// `Success` when every input succeeded (including zero inputs),
    /// `PartialSuccess` otherwise.
    pub fn status(&self) -> RunStatus {
        if self.results.iter().all(InputResult::succeeded) {
            RunStatus::Success
        } else {
            RunStatus::PartialSuccess
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &FailureReason)> {
        self.results.iter().filter_map(|r| match &r.outcome {
            ExecutionOutcome::Failed { reason } => Some((r.input.as_str(), reason)),
            ExecutionOutcome::Succeeded { .. } => None,
        })
    }

    pub fn produced_count(&self) -> usize {
        self.results.iter().filter(|r| r.succeeded()).count()
    }
}

/// Fatal error that ended a run, as recorded in the run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbortInfo {
    /// Stable identifier (`not_found`, `organize_conflict`, ..., or `unexpected`).
    pub kind: String,
    pub message: String,
}

/// One execution attempt for a level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub level: Level,
    pub mode: Mode,
    /// Preparation was skipped because a checkpoint already covered it.
    #[serde(default)]
    pub resumed: bool,
    pub steps: Vec<StepRecord>,
    /// State the run stopped in.
    pub state: WorkflowState,
    pub status: RunStatus,
    #[serde(default)]
    pub warnings: Vec<Warning>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort: Option<AbortInfo>,
    pub duration_ms: u64,
}
