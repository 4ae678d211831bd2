//! AI assistant backends asked for a solution in `auto` mode.
//!
//! The [`Assistant`] trait decouples the workflow from the actual backend. The
//! CLI builds an [`AssistantChain`] from config; tests use scripted assistants
//! that never spawn processes.

use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::io::config::{AssistantConfig, BackendKind};
use crate::io::paths::LevelPaths;
use crate::io::process::{
    CommandOutput, program_available, run_command_with_timeout, write_process_log,
};
use crate::io::prompt::{render_ai_request, write_document};

/// One request for a solution.
#[derive(Debug, Clone)]
pub struct AssistantRequest {
    pub prompt: String,
    /// Working directory for assistant processes (the project root).
    pub workdir: PathBuf,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
    /// Where backends write their stdout/stderr.
    pub log_dir: PathBuf,
}

/// A backend that turns a prompt into a free-form reply containing a solution.
pub trait Assistant {
    fn name(&self) -> &str;

    /// Return the assistant's reply. Errors (including timeouts) are non-fatal
    /// to the workflow, which pauses instead.
    fn complete(&self, request: &AssistantRequest) -> Result<String>;

    /// Whether the backend spends time waiting on an external process. Ones
    /// that don't still run once the chain's time budget is spent.
    fn waits(&self) -> bool {
        true
    }
}

/// `codex exec`, prompt on stdin, final message written to a file.
pub struct CodexAssistant;

impl Assistant for CodexAssistant {
    fn name(&self) -> &str {
        "codex"
    }

    #[instrument(skip_all, fields(timeout_secs = request.timeout.as_secs()))]
    fn complete(&self, request: &AssistantRequest) -> Result<String> {
        fs::create_dir_all(&request.log_dir)
            .with_context(|| format!("create {}", request.log_dir.display()))?;
        let reply_path = request.log_dir.join("codex-last-message.md");
        if reply_path.exists() {
            fs::remove_file(&reply_path)
                .with_context(|| format!("remove stale {}", reply_path.display()))?;
        }

        let mut cmd = Command::new("codex");
        cmd.arg("exec")
            .arg("--skip-git-repo-check")
            .arg("--output-last-message")
            .arg(&reply_path)
            .arg("-")
            .current_dir(&request.workdir);
        let output = run_command_with_timeout(
            cmd,
            Some(request.prompt.as_bytes()),
            request.timeout,
            request.output_limit_bytes,
        )
        .context("run codex exec")?;
        write_process_log(&request.log_dir.join("codex.log"), "codex exec", &output)?;
        check_exit("codex exec", &output, request.timeout)?;

        let reply = fs::read_to_string(&reply_path)
            .with_context(|| format!("read codex reply {}", reply_path.display()))?;
        debug!(bytes = reply.len(), "codex reply read");
        Ok(reply)
    }
}

/// Any CLI that reads a prompt on stdin and prints the reply (`claude -p`).
pub struct CommandAssistant {
    command: Vec<String>,
}

impl CommandAssistant {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl Assistant for CommandAssistant {
    fn name(&self) -> &str {
        self.command.first().map_or("command", String::as_str)
    }

    #[instrument(skip_all, fields(program = self.name(), timeout_secs = request.timeout.as_secs()))]
    fn complete(&self, request: &AssistantRequest) -> Result<String> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("assistant command is empty"))?;
        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(&request.workdir);
        let output = run_command_with_timeout(
            cmd,
            Some(request.prompt.as_bytes()),
            request.timeout,
            request.output_limit_bytes,
        )
        .with_context(|| format!("run {program}"))?;
        write_process_log(&request.log_dir.join("assistant.log"), program, &output)?;
        check_exit(program, &output, request.timeout)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Writes `level{N}_ai_request.md` for a human and reports failure, so the run
/// pauses until the solution file appears.
pub struct ManualAssistant {
    paths: LevelPaths,
    extension: String,
}

impl ManualAssistant {
    pub fn new(paths: LevelPaths, extension: impl Into<String>) -> Self {
        Self {
            paths,
            extension: extension.into(),
        }
    }
}

impl Assistant for ManualAssistant {
    fn name(&self) -> &str {
        "manual"
    }

    fn complete(&self, request: &AssistantRequest) -> Result<String> {
        let body = render_ai_request(&self.paths, &request.prompt, &self.extension)?;
        write_document(&self.paths.ai_request, &body)?;
        info!(path = %self.paths.ai_request.display(), "manual ai request written");
        Err(anyhow!(
            "no assistant CLI available; paste {} into an assistant",
            self.paths.ai_request.display()
        ))
    }

    fn waits(&self) -> bool {
        false
    }
}

/// Backends tried in order under one shared time budget.
pub struct AssistantChain {
    backends: Vec<Box<dyn Assistant>>,
}

impl AssistantChain {
    pub fn new(backends: Vec<Box<dyn Assistant>>) -> Self {
        Self { backends }
    }

    /// Build the configured backends that are installed; `manual` is always usable.
    pub fn from_config(cfg: &AssistantConfig, paths: &LevelPaths, extension: &str) -> Self {
        let mut backends: Vec<Box<dyn Assistant>> = Vec::new();
        for kind in &cfg.backends {
            match kind {
                BackendKind::Codex => {
                    if program_available("codex") {
                        backends.push(Box::new(CodexAssistant));
                    } else {
                        debug!("codex not available");
                    }
                }
                BackendKind::Command => match cfg.command.first() {
                    Some(program) if program_available(program) => {
                        backends.push(Box::new(CommandAssistant::new(cfg.command.clone())));
                    }
                    _ => debug!(command = ?cfg.command, "assistant command not available"),
                },
                BackendKind::Manual => {
                    backends.push(Box::new(ManualAssistant::new(paths.clone(), extension)));
                }
            }
        }
        info!(
            backends = ?backends.iter().map(|b| b.name()).collect::<Vec<_>>(),
            "assistant backends selected"
        );
        Self { backends }
    }
}

impl Assistant for AssistantChain {
    fn name(&self) -> &str {
        "chain"
    }

    fn complete(&self, request: &AssistantRequest) -> Result<String> {
        let deadline = Instant::now() + request.timeout;
        let mut failures = Vec::new();
        for backend in &self.backends {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() && backend.waits() {
                failures.push(format!("{}: time budget exhausted", backend.name()));
                continue;
            }
            let attempt = AssistantRequest {
                timeout: remaining,
                ..request.clone()
            };
            match backend.complete(&attempt) {
                Ok(reply) => {
                    info!(backend = backend.name(), "assistant replied");
                    return Ok(reply);
                }
                Err(err) => {
                    warn!(backend = backend.name(), err = %format!("{err:#}"), "assistant failed");
                    failures.push(format!("{}: {err:#}", backend.name()));
                }
            }
        }
        if failures.is_empty() {
            return Err(anyhow!("no assistant backend configured"));
        }
        Err(anyhow!(failures.join("; ")))
    }
}

fn check_exit(label: &str, output: &CommandOutput, timeout: Duration) -> Result<()> {
    if output.timed_out {
        return Err(anyhow!("{label} timed out after {}s", timeout.as_secs()));
    }
    if !output.status.success() {
        return Err(anyhow!(
            "{label} exited with {:?}: {}",
            output.status.code(),
            output.stderr_tail(3)
        ));
    }
    Ok(())
}
