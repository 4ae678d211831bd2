//! Orchestration of one `levelrun <LEVEL>` invocation.
//!
//! The workflow is a small state machine (see [`crate::core::transitions`]).
//! Every completed durable transition is checkpointed, so a re-run after an
//! interruption or a solution fix resumes instead of starting over.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{info, instrument, warn};

use crate::core::response::{extract_solution_source, fence_tags};
use crate::core::transitions::{can_transition, checkpoint_rank, preparation_done};
use crate::core::types::{
    AbortInfo, ExecutionSummary, Level, Mode, RunStatus, StepRecord, Warning, WorkflowRun,
    WorkflowState,
};
use crate::error::{Artifact, WorkflowError};
use crate::io::assistant::{Assistant, AssistantRequest};
use crate::io::clean::clean_staging;
use crate::io::config::LevelrunConfig;
use crate::io::extract::extract_archive;
use crate::io::level_state::{LevelState, load_level_state, write_level_state, write_run_report};
use crate::io::locate::{locate_archive, locate_statement};
use crate::io::organize::{OrganizeReport, organize};
use crate::io::paths::LevelPaths;
use crate::io::prompt::{
    PromptInputs, build_prompt, collect_samples, render_solution_template, render_workflow_guide,
    write_document,
};
use crate::io::resume::{ResumeEvent, ResumeSignal};
use crate::io::solution::SolutionRunner;
use crate::io::statement::{StatementText, TextExtractor, read_statement};

/// Flags that refine a mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Template mode continues to execution after writing the template.
    pub run_template: bool,
    /// Pause for a missing solution; when false a missing solution aborts.
    pub wait: bool,
    /// Ignore the checkpoint and prepare from scratch.
    pub fresh: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            run_template: false,
            wait: true,
            fresh: false,
        }
    }
}

/// Everything one run needs, resolved up front.
#[derive(Debug, Clone)]
pub struct WorkflowContext {
    pub paths: LevelPaths,
    pub mode: Mode,
    pub options: RunOptions,
    pub config: LevelrunConfig,
}

impl WorkflowContext {
    pub fn new(
        root: impl Into<PathBuf>,
        level: Level,
        mode: Mode,
        options: RunOptions,
        config: LevelrunConfig,
    ) -> Self {
        let paths = LevelPaths::new(root, level, &config.paths, &config.solution.extension);
        Self {
            paths,
            mode,
            options,
            config,
        }
    }

    fn extension(&self) -> &str {
        &self.config.solution.extension
    }
}

/// How a run ended when no fatal error occurred.
struct Finish {
    status: RunStatus,
}

struct Machine<'a> {
    ctx: &'a WorkflowContext,
    state: WorkflowState,
    steps: Vec<StepRecord>,
    warnings: Vec<Warning>,
    level_state: LevelState,
    execution: Option<ExecutionSummary>,
    resumed: bool,
}

/// Run the workflow for one level and persist its report.
///
/// Workflow failures end the run as [`RunStatus::Aborted`] with the error kind
/// recorded; `Err` is returned only when the run report itself cannot be written.
#[instrument(skip_all, fields(level = %ctx.paths.level, mode = ctx.mode.as_str()))]
pub fn run_workflow<T, A, R>(
    ctx: &WorkflowContext,
    extractor: &T,
    assistant: &A,
    resume: &mut R,
) -> Result<WorkflowRun>
where
    T: TextExtractor + ?Sized,
    A: Assistant + ?Sized,
    R: ResumeSignal + ?Sized,
{
    let start = Instant::now();
    let mut machine = Machine {
        ctx,
        state: WorkflowState::Init,
        steps: Vec::new(),
        warnings: Vec::new(),
        level_state: LevelState::new(ctx.paths.level),
        execution: None,
        resumed: false,
    };

    let outcome = machine.drive(extractor, assistant, resume);
    let (status, abort) = match outcome {
        Ok(finish) => (finish.status, None),
        Err(err) => {
            let kind = err
                .downcast_ref::<WorkflowError>()
                .map_or("unexpected", WorkflowError::kind);
            warn!(kind, err = %format!("{err:#}"), "workflow aborted");
            let abort = AbortInfo {
                kind: kind.to_string(),
                message: format!("{err:#}"),
            };
            if can_transition(machine.state, WorkflowState::Aborted) {
                machine.record(WorkflowState::Aborted, Some(abort.kind.clone()));
            }
            (RunStatus::Aborted, Some(abort))
        }
    };

    let run = WorkflowRun {
        level: ctx.paths.level,
        mode: ctx.mode,
        resumed: machine.resumed,
        steps: machine.steps,
        state: machine.state,
        status,
        warnings: machine.warnings,
        execution: machine.execution,
        abort,
        duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
    };
    write_run_report(&ctx.paths.last_run, &run)?;
    info!(status = run.status.as_str(), state = %run.state, "run finished");
    Ok(run)
}

impl Machine<'_> {
    fn paths(&self) -> &LevelPaths {
        &self.ctx.paths
    }

    fn record(&mut self, to: WorkflowState, note: Option<String>) {
        info!(from = %self.state, to = %to, note = note.as_deref().unwrap_or(""), "transition");
        self.steps.push(StepRecord {
            from: self.state,
            to,
            note,
        });
        self.state = to;
    }

    /// Move to `to`, checkpointing durable states.
    fn advance(&mut self, to: WorkflowState, note: Option<String>) -> Result<()> {
        if !can_transition(self.state, to) {
            return Err(WorkflowError::InvalidTransition {
                from: self.state,
                to,
            }
            .into());
        }
        self.record(to, note);
        if checkpoint_rank(to).is_some() {
            self.level_state.checkpoint = to;
            write_level_state(&self.ctx.paths.checkpoint, &self.level_state)?;
        }
        Ok(())
    }

    fn drive<T, A, R>(&mut self, extractor: &T, assistant: &A, resume: &mut R) -> Result<Finish>
    where
        T: TextExtractor + ?Sized,
        A: Assistant + ?Sized,
        R: ResumeSignal + ?Sized,
    {
        if !self.try_resume()? {
            self.prepare(extractor)?;
        }

        let solution = match self.ctx.mode {
            Mode::ProcessOnly => {
                return Ok(Finish {
                    status: RunStatus::Success,
                });
            }
            Mode::Template => {
                self.write_template_if_missing()?;
                if !self.ctx.options.run_template {
                    return Ok(Finish {
                        status: RunStatus::Success,
                    });
                }
                self.require_solution()?
            }
            Mode::Interactive => match self.paths().existing_solution() {
                Some(path) => path,
                None => match self.pause_for_solution(resume)? {
                    Some(path) => path,
                    None => return Ok(Finish { status: RunStatus::Paused }),
                },
            },
            Mode::Auto => match self.paths().existing_solution() {
                Some(path) => {
                    info!(path = %path.display(), "existing solution kept, assistant skipped");
                    path
                }
                None => match self.ask_assistant(assistant)? {
                    Some(path) => path,
                    None => match self.pause_for_solution(resume)? {
                        Some(path) => path,
                        None => return Ok(Finish { status: RunStatus::Paused }),
                    },
                },
            },
        };
        self.advance(
            WorkflowState::SolutionReady,
            Some(solution.display().to_string()),
        )?;

        let runner = SolutionRunner::new(&solution, &self.ctx.config.solution);
        let summary = runner.run(
            self.paths(),
            &self.level_state.inputs,
            &self.level_state.sample_outputs,
        )?;
        let status = summary.status();
        let note = format!(
            "{} of {} inputs produced output",
            summary.produced_count(),
            summary.results.len()
        );
        self.execution = Some(summary);
        self.advance(WorkflowState::Executed, Some(note))?;

        let cleaned = clean_staging(self.paths())?;
        self.advance(
            WorkflowState::Cleaned,
            Some(format!("removed {} staged files", cleaned.removed_files)),
        )?;
        Ok(Finish { status })
    }

    /// Adopt a checkpoint that already covers preparation. Returns whether it did.
    fn try_resume(&mut self) -> Result<bool> {
        if self.ctx.options.fresh {
            info!("fresh run requested, ignoring checkpoint");
            return Ok(false);
        }
        let Some(saved) = load_level_state(&self.ctx.paths.checkpoint)? else {
            return Ok(false);
        };
        if !preparation_done(saved.checkpoint) || !self.ctx.paths.prompt.is_file() {
            return Ok(false);
        }
        info!(checkpoint = %saved.checkpoint, "resuming from checkpoint");
        self.warnings.extend(saved.warnings.iter().cloned());
        self.level_state = saved;
        self.level_state.checkpoint = WorkflowState::PromptReady;
        self.state = WorkflowState::PromptReady;
        self.resumed = true;
        Ok(true)
    }

    /// Init -> Extracted -> PromptReady.
    fn prepare<T: TextExtractor + ?Sized>(&mut self, extractor: &T) -> Result<()> {
        let paths = self.ctx.paths.clone();
        let archive = locate_archive(&paths, &self.ctx.config.paths)?;
        let extracted = extract_archive(&archive, &paths.staging)?;
        for name in extracted.skipped {
            self.warnings.push(Warning::SkippedEntry { name });
        }
        self.level_state.archive = Some(archive.clone());
        self.advance(
            WorkflowState::Extracted,
            Some(format!(
                "{} files from {}",
                extracted.staged.len(),
                archive.display()
            )),
        )?;

        let ctx = self.ctx;
        let paths_cfg = &ctx.config.paths;
        let (statement, organized) = thread::scope(|scope| {
            let text = scope.spawn(|| {
                let located = match locate_statement(&paths, paths_cfg) {
                    Ok(located) => located,
                    Err(err) => {
                        warn!(err = %format!("{err:#}"), "statement lookup failed");
                        None
                    }
                };
                read_statement(extractor, located.as_deref())
            });
            let organized = organize(&paths);
            let statement = text
                .join()
                .map_err(|_| anyhow!("statement extraction thread panicked"));
            (statement, organized)
        });
        let (statement, statement_warning) = statement?;
        let organized: OrganizeReport = organized?;
        self.warnings.extend(statement_warning);

        let prompt = self.render_prompt(&statement, &organized)?;
        write_document(&paths.prompt, &prompt)?;

        self.level_state.statement = statement.source().map(Path::to_path_buf);
        self.level_state.inputs = organized.inputs;
        self.level_state.sample_outputs = organized.sample_outputs;
        self.level_state.warnings = self.warnings.clone();
        self.advance(
            WorkflowState::PromptReady,
            Some(format!(
                "{} inputs, {} sample outputs",
                self.level_state.inputs.len(),
                self.level_state.sample_outputs.len()
            )),
        )
    }

    fn render_prompt(&self, statement: &StatementText, organized: &OrganizeReport) -> Result<String> {
        let (samples, other_inputs) =
            collect_samples(self.paths(), &organized.inputs, &organized.sample_outputs)?;
        build_prompt(&PromptInputs {
            paths: self.paths(),
            statement,
            samples: &samples,
            other_inputs: &other_inputs,
            extension: self.ctx.extension(),
        })
    }

    fn write_template_if_missing(&mut self) -> Result<()> {
        if let Some(existing) = self.paths().existing_solution() {
            info!(path = %existing.display(), "solution exists, template not written");
            return Ok(());
        }
        let target = self.paths().default_solution();
        let template = render_solution_template(self.paths(), self.ctx.extension())?;
        write_document(&target, &template)?;
        info!(path = %target.display(), "solution template written");
        Ok(())
    }

    fn require_solution(&self) -> Result<PathBuf> {
        self.paths()
            .existing_solution()
            .ok_or_else(|| self.solution_not_found().into())
    }

    fn solution_not_found(&self) -> WorkflowError {
        WorkflowError::NotFound {
            artifact: Artifact::Solution,
            name: self.paths().solution_name.clone(),
            searched: self.paths().solution_candidates(),
        }
    }

    /// PromptReady -> AiInvoking -> SolutionReady, or `None` after degrading to Paused.
    fn ask_assistant<A: Assistant + ?Sized>(&mut self, assistant: &A) -> Result<Option<PathBuf>> {
        self.advance(WorkflowState::AiInvoking, Some(assistant.name().to_string()))?;
        let paths = self.ctx.paths.clone();
        let prompt = fs::read_to_string(&paths.prompt)
            .with_context(|| format!("read prompt {}", paths.prompt.display()))?;
        let cfg = &self.ctx.config.assistant;
        let request = AssistantRequest {
            prompt,
            workdir: paths.root.clone(),
            timeout: Duration::from_secs(cfg.timeout_secs),
            output_limit_bytes: cfg.output_limit_bytes,
            log_dir: paths.logs_dir.clone(),
        };

        let failure = match assistant.complete(&request) {
            Ok(reply) => match extract_solution_source(&reply, fence_tags(self.ctx.extension())) {
                Some(source) => {
                    let target = paths.default_solution();
                    write_document(&target, &source)?;
                    info!(path = %target.display(), "assistant solution written");
                    return Ok(Some(target));
                }
                None => "assistant reply contained no solution".to_string(),
            },
            Err(err) => format!("{err:#}"),
        };
        warn!(reason = %failure, "assistant failed, pausing");
        self.warnings.push(Warning::Assistant { message: failure });
        if self.ctx.options.wait {
            self.write_workflow_guide()?;
            self.advance(WorkflowState::Paused, Some("assistant failed".to_string()))?;
        }
        Ok(None)
    }

    /// Block on the resume signal until the solution exists.
    ///
    /// `None` when the signal source closes first. Fails with `NotFound` when
    /// waiting is disabled.
    fn pause_for_solution<R: ResumeSignal + ?Sized>(
        &mut self,
        resume: &mut R,
    ) -> Result<Option<PathBuf>> {
        if !self.ctx.options.wait {
            return Err(self.solution_not_found().into());
        }
        if self.state != WorkflowState::Paused {
            self.write_workflow_guide()?;
            self.advance(WorkflowState::Paused, Some("waiting for solution".to_string()))?;
        }
        let hint = self.paths().default_solution().display().to_string();
        loop {
            match resume.wait(&hint)? {
                ResumeEvent::Closed => {
                    info!("resume signal closed, run paused");
                    return Ok(None);
                }
                ResumeEvent::Resume => {
                    if let Some(path) = self.paths().existing_solution() {
                        return Ok(Some(path));
                    }
                    warn!(path = %hint, "resumed but solution still missing");
                    self.warnings.push(Warning::SolutionStillMissing { path: hint.clone() });
                    self.advance(WorkflowState::Paused, Some("solution still missing".to_string()))?;
                }
            }
        }
    }

    fn write_workflow_guide(&self) -> Result<()> {
        let interpreter = self
            .ctx
            .config
            .solution
            .interpreters
            .get(self.ctx.extension())
            .cloned()
            .unwrap_or_default();
        let guide = render_workflow_guide(self.paths(), &interpreter)?;
        write_document(&self.paths().workflow_guide, &guide)
    }
}
