//! Terminal summary of a finished run and its exit code.

use std::fmt::Write as _;
use std::path::Path;

use crate::core::types::{ExecutionOutcome, RunStatus, WorkflowRun};
use crate::exit_codes;
use crate::io::paths::LevelPaths;

/// Map a run to the process exit code.
pub fn exit_code(run: &WorkflowRun) -> i32 {
    match run.status {
        RunStatus::Success => exit_codes::OK,
        RunStatus::PartialSuccess => {
            let produced = run.execution.as_ref().map_or(0, |e| e.produced_count());
            if produced > 0 {
                exit_codes::OK
            } else {
                exit_codes::NO_OUTPUT
            }
        }
        RunStatus::Paused => exit_codes::PAUSED,
        RunStatus::Aborted => exit_codes::ABORTED,
    }
}

/// Human-readable summary: status line, then failing inputs, warnings and next steps.
pub fn render_summary(run: &WorkflowRun, paths: &LevelPaths) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} [{}]: {} (state: {})",
        run.level,
        run.mode.as_str(),
        run.status.as_str(),
        run.state
    );
    if run.resumed {
        let _ = writeln!(out, "  resumed from checkpoint");
    }
    if paths.prompt.is_file() {
        let _ = writeln!(out, "  prompt: {}", relative(paths, &paths.prompt));
    }

    if let Some(execution) = &run.execution {
        let _ = writeln!(
            out,
            "  outputs: {} of {} inputs produced output in {}",
            execution.produced_count(),
            execution.results.len(),
            relative(paths, &paths.outputs)
        );
        for (input, reason) in execution.failures() {
            let _ = writeln!(out, "  failed: {input} ({reason})");
        }
        for result in &execution.results {
            if let ExecutionOutcome::Succeeded {
                output,
                sample_match: Some(matched),
            } = &result.outcome
            {
                let verdict = if *matched { "matches" } else { "differs from" };
                let _ = writeln!(out, "  sample: {output} {verdict} the shipped output");
            }
        }
    }

    for warning in &run.warnings {
        let _ = writeln!(out, "  warning: {warning}");
    }
    if let Some(abort) = &run.abort {
        let _ = writeln!(out, "  aborted ({}): {}", abort.kind, abort.message);
    }
    if run.status == RunStatus::Paused {
        let _ = writeln!(
            out,
            "  next: save {} (see {}), then run `levelrun {}` again",
            relative(paths, &paths.default_solution()),
            relative(paths, &paths.workflow_guide),
            run.level.number()
        );
    }
    out
}

fn relative(paths: &LevelPaths, path: &Path) -> String {
    path.strip_prefix(&paths.root)
        .unwrap_or(path)
        .display()
        .to_string()
}
