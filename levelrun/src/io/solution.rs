//! Running the solution program once per organized input.

use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::core::classify::{actual_output_name, output_name_for_input, stem};
use crate::core::types::{ExecutionOutcome, ExecutionSummary, FailureReason, InputResult};
use crate::io::config::SolutionConfig;
use crate::io::paths::LevelPaths;
use crate::io::process::{run_command_with_timeout, write_process_log};

/// Solution invocation settings resolved from config.
#[derive(Debug, Clone)]
pub struct SolutionRunner {
    /// Program and leading arguments; the input path is appended per run.
    command: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
    workers: usize,
}

impl SolutionRunner {
    /// `<interpreter...> <solution>` when the extension has an interpreter,
    /// otherwise the solution itself.
    pub fn new(solution: &Path, cfg: &SolutionConfig) -> Self {
        let extension = solution
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        let mut command = cfg.interpreters.get(extension).cloned().unwrap_or_default();
        command.push(solution.display().to_string());
        Self {
            command,
            timeout: Duration::from_secs(cfg.timeout_secs),
            output_limit_bytes: cfg.output_limit_bytes,
            workers: cfg.worker_count(),
        }
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// Run every input and write produced outputs.
    ///
    /// Per-input failures are recorded and never stop the other inputs; `Err` is
    /// reserved for failures of the run itself (e.g. Outputs cannot be created).
    /// Results are ordered by input name.
    #[instrument(skip_all, fields(level = %paths.level, inputs = inputs.len(), workers = self.workers))]
    pub fn run(
        &self,
        paths: &LevelPaths,
        inputs: &[String],
        sample_outputs: &[String],
    ) -> Result<ExecutionSummary> {
        let mut ordered: Vec<&String> = inputs.iter().collect();
        ordered.sort();
        if ordered.is_empty() {
            info!("no inputs to run");
            return Ok(ExecutionSummary::default());
        }
        fs::create_dir_all(&paths.outputs)
            .with_context(|| format!("create {}", paths.outputs.display()))?;
        fs::create_dir_all(&paths.logs_dir)
            .with_context(|| format!("create {}", paths.logs_dir.display()))?;

        let next = AtomicUsize::new(0);
        let workers = self.workers.clamp(1, ordered.len());
        let (next, ordered) = (&next, &ordered);
        let mut collected: Vec<(usize, InputResult)> = thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    scope.spawn(move || {
                        let mut done = Vec::new();
                        loop {
                            let index = next.fetch_add(1, Ordering::Relaxed);
                            let Some(input) = ordered.get(index) else {
                                break;
                            };
                            done.push((index, self.run_one(paths, input, sample_outputs)));
                        }
                        done
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().map_err(|_| anyhow!("solution worker panicked")))
                .collect::<Result<Vec<_>>>()
        })?
        .into_iter()
        .flatten()
        .collect();
        collected.sort_by_key(|(index, _)| *index);

        let summary = ExecutionSummary {
            results: collected.into_iter().map(|(_, result)| result).collect(),
        };
        info!(
            produced = summary.produced_count(),
            failed = summary.failures().count(),
            "solution run finished"
        );
        Ok(summary)
    }

    fn run_one(&self, paths: &LevelPaths, input: &str, sample_outputs: &[String]) -> InputResult {
        let outcome = match self.execute(paths, input, sample_outputs) {
            Ok(outcome) => outcome,
            Err(reason) => ExecutionOutcome::Failed { reason },
        };
        if let ExecutionOutcome::Failed { reason } = &outcome {
            warn!(input, %reason, "input failed");
        }
        InputResult {
            input: input.to_string(),
            outcome,
        }
    }

    fn execute(
        &self,
        paths: &LevelPaths,
        input: &str,
        sample_outputs: &[String],
    ) -> Result<ExecutionOutcome, FailureReason> {
        let input_path = paths.inputs.join(input);
        let contents = fs::read(&input_path).map_err(|e| FailureReason::Io {
            message: format!("read {}: {e}", input_path.display()),
        })?;

        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| FailureReason::SpawnFailed {
                message: "empty solution command".to_string(),
            })?;
        let mut cmd = Command::new(program);
        cmd.args(args).arg(&input_path).current_dir(&paths.root);
        let output = run_command_with_timeout(
            cmd,
            Some(contents.as_slice()),
            self.timeout,
            self.output_limit_bytes,
        )
        .map_err(|e| FailureReason::SpawnFailed {
            message: format!("{e:#}"),
        })?;

        let log_path = paths.logs_dir.join(format!("{}.log", stem(input)));
        if let Err(err) = write_process_log(&log_path, input, &output) {
            warn!(input, err = %format!("{err:#}"), "failed to write solution log");
        }

        if output.timed_out {
            return Err(FailureReason::TimedOut {
                secs: self.timeout.as_secs(),
            });
        }
        if !output.status.success() {
            return Err(FailureReason::NonZeroExit {
                code: output.status.code(),
            });
        }
        if output.stdout_truncated > 0 {
            return Err(FailureReason::Io {
                message: format!(
                    "output exceeded {} bytes",
                    self.output_limit_bytes
                ),
            });
        }

        let expected_name = output_name_for_input(input);
        let (output_name, sample) = if sample_outputs.contains(&expected_name) {
            (actual_output_name(input), Some(paths.outputs.join(&expected_name)))
        } else {
            (expected_name, None)
        };
        let output_path = paths.outputs.join(&output_name);
        super::write_atomic(&output_path, &output.stdout).map_err(|e| FailureReason::Io {
            message: format!("{e:#}"),
        })?;
        debug!(input, output = %output_name, "output written");

        let sample_match = sample.map(|sample| matches_sample(&sample, &output.stdout));
        Ok(ExecutionOutcome::Succeeded {
            output: output_name,
            sample_match,
        })
    }
}

/// Compare produced output to a sample, ignoring trailing whitespace per line and at the end.
fn matches_sample(sample: &Path, produced: &[u8]) -> bool {
    let Ok(expected) = fs::read(sample) else {
        return false;
    };
    normalized(&expected) == normalized(produced)
}

fn normalized(bytes: &[u8]) -> Vec<String> {
    let text = String::from_utf8_lossy(bytes);
    let mut lines: Vec<String> = text.lines().map(|l| l.trim_end().to_string()).collect();
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines
}
