//! End-to-end workflow runs against a temp project with scripted collaborators.
//!
//! Solutions are small `sh` scripts so runs spawn real child processes.

use std::fs;

use levelrun::core::types::{
    ExecutionOutcome, FailureReason, Mode, RunStatus, Warning, WorkflowRun, WorkflowState,
};
use levelrun::io::clean::clean_staging;
use levelrun::io::level_state::{load_level_state, load_run_report};
use levelrun::io::resume::ResumeEvent;
use levelrun::io::statement::UNAVAILABLE_MARKER;
use levelrun::test_support::{
    ScriptedAssistant, ScriptedResume, StaticTextExtractor, TestProject, snapshot_protected,
    write_solution_file,
};
use levelrun::workflow::{RunOptions, run_workflow};

const STATEMENT: &str = "Count the things. The first line holds the answer.";

const FIRST_LINE: &str = "#!/bin/sh\nread first\necho \"$first\"\n";

const FAILS_ON_BAD: &str = "#!/bin/sh\nread first\nif [ \"$first\" = \"bad\" ]; then exit 3; fi\necho \"$first\"\n";

fn standard_archive(project: &TestProject) {
    project.write_archive(
        1,
        &[
            ("Level 1.pdf", "%PDF-1.4 fake"),
            ("level1_example.in", "3\n1 2 3\n"),
            ("level1_example.out", "3\n"),
            ("level1_1.in", "7\nx\n"),
            ("data/level1_2.in", "bad\n"),
        ],
    );
}

fn run(
    project: &TestProject,
    mode: Mode,
    options: RunOptions,
    assistant: &ScriptedAssistant,
    resume: &mut ScriptedResume,
) -> WorkflowRun {
    let ctx = project.context(1, mode, options);
    run_workflow(
        &ctx,
        &StaticTextExtractor::text(STATEMENT),
        assistant,
        resume,
    )
    .expect("run workflow")
}

fn transitions(run: &WorkflowRun) -> Vec<(WorkflowState, WorkflowState)> {
    run.steps.iter().map(|s| (s.from, s.to)).collect()
}

#[test]
fn process_only_organizes_inputs_and_writes_prompt() {
    let project = TestProject::new();
    standard_archive(&project);
    let paths = project.paths(1);

    let result = run(
        &project,
        Mode::ProcessOnly,
        RunOptions::default(),
        &ScriptedAssistant::failing("unused"),
        &mut ScriptedResume::closed(),
    );

    assert_eq!(result.status, RunStatus::Success);
    assert_eq!(result.state, WorkflowState::PromptReady);
    assert_eq!(
        project.list(&paths.inputs),
        vec!["level1_1.in", "level1_2.in", "level1_example.in"]
    );
    assert_eq!(project.list(&paths.outputs), vec!["level1_example.out"]);
    assert!(paths.staging.join("Level 1.pdf").exists());

    let prompt = fs::read_to_string(&paths.prompt).expect("prompt");
    assert!(prompt.starts_with("# Coding Challenge - Level 1\n"));
    assert!(prompt.contains(STATEMENT));
    assert!(prompt.contains("level1_example.in"));
    assert!(prompt.contains("`level1_1.in`"));

    let saved = load_level_state(&paths.checkpoint)
        .expect("load state")
        .expect("state exists");
    assert_eq!(saved.checkpoint, WorkflowState::PromptReady);
    assert_eq!(saved.sample_outputs, vec!["level1_example.out"]);
    assert_eq!(load_run_report(&paths.last_run).expect("report"), result);
}

#[test]
fn rerun_resumes_and_fresh_rerun_is_idempotent() {
    let project = TestProject::new();
    standard_archive(&project);
    let paths = project.paths(1);
    let assistant = ScriptedAssistant::failing("unused");

    let first = run(
        &project,
        Mode::ProcessOnly,
        RunOptions::default(),
        &assistant,
        &mut ScriptedResume::closed(),
    );
    let inputs = project.list(&paths.inputs);
    let prompt = fs::read_to_string(&paths.prompt).expect("prompt");

    let second = run(
        &project,
        Mode::ProcessOnly,
        RunOptions::default(),
        &assistant,
        &mut ScriptedResume::closed(),
    );
    assert!(!first.resumed);
    assert!(second.resumed);
    assert!(second.steps.is_empty());

    let fresh = run(
        &project,
        Mode::ProcessOnly,
        RunOptions {
            fresh: true,
            ..RunOptions::default()
        },
        &assistant,
        &mut ScriptedResume::closed(),
    );
    assert_eq!(fresh.status, RunStatus::Success);
    assert!(!fresh.resumed);
    assert_eq!(project.list(&paths.inputs), inputs);
    assert_eq!(fs::read_to_string(&paths.prompt).expect("prompt"), prompt);
}

#[test]
fn existing_solution_runs_every_input_and_cleans_staging() {
    let project = TestProject::new();
    standard_archive(&project);
    let solution = project.write_solution(1, FIRST_LINE);
    let paths = project.paths(1);
    let mut resume = ScriptedResume::closed();

    let result = run(
        &project,
        Mode::Interactive,
        RunOptions::default(),
        &ScriptedAssistant::failing("unused"),
        &mut resume,
    );

    assert_eq!(result.status, RunStatus::Success);
    assert_eq!(result.state, WorkflowState::Cleaned);
    assert_eq!(resume.waits(), 0);
    assert_eq!(
        project.list(&paths.outputs),
        vec![
            "level1_1.out",
            "level1_2.out",
            "level1_example.actual.out",
            "level1_example.out"
        ]
    );
    assert_eq!(
        fs::read_to_string(paths.outputs.join("level1_1.out")).expect("output"),
        "7\n"
    );
    let execution = result.execution.as_ref().expect("execution");
    let example = execution
        .results
        .iter()
        .find(|r| r.input == "level1_example.in")
        .expect("example result");
    assert_eq!(
        example.outcome,
        ExecutionOutcome::Succeeded {
            output: "level1_example.actual.out".to_string(),
            sample_match: Some(true),
        }
    );

    assert!(!paths.staging.exists());
    assert!(!paths.staging_root.exists());
    assert!(solution.exists());
    assert!(paths.prompt.exists());
    assert!(project.root().join("level1.zip").exists());
    assert_eq!(project.list(&paths.inputs).len(), 3);
}

#[test]
fn cleanup_leaves_organized_data_and_solution_untouched() {
    let project = TestProject::new();
    standard_archive(&project);
    project.write_solution(1, FIRST_LINE);
    let paths = project.paths(1);
    run(
        &project,
        Mode::ProcessOnly,
        RunOptions::default(),
        &ScriptedAssistant::failing("unused"),
        &mut ScriptedResume::closed(),
    );
    assert!(paths.staging.exists());

    let before = snapshot_protected(&paths);
    assert_eq!(before.len(), 5);
    clean_staging(&paths).expect("clean");

    assert_eq!(snapshot_protected(&paths), before);
    assert!(!paths.staging.exists());
}

#[test]
fn failing_input_yields_partial_success() {
    let project = TestProject::new();
    standard_archive(&project);
    project.write_solution(1, FAILS_ON_BAD);
    let paths = project.paths(1);

    let result = run(
        &project,
        Mode::Interactive,
        RunOptions::default(),
        &ScriptedAssistant::failing("unused"),
        &mut ScriptedResume::closed(),
    );

    assert_eq!(result.status, RunStatus::PartialSuccess);
    assert_eq!(result.state, WorkflowState::Cleaned);
    let execution = result.execution.as_ref().expect("execution");
    assert_eq!(execution.produced_count(), 2);
    let failures: Vec<_> = execution.failures().collect();
    assert_eq!(
        failures,
        vec![("level1_2.in", &FailureReason::NonZeroExit { code: Some(3) })]
    );
    assert!(!paths.outputs.join("level1_2.out").exists());
    assert!(paths.logs_dir.join("level1_2.log").exists());
}

#[test]
fn missing_archive_aborts_without_touching_the_project() {
    let project = TestProject::new();
    let paths = project.paths(1);

    let result = run(
        &project,
        Mode::Interactive,
        RunOptions::default(),
        &ScriptedAssistant::failing("unused"),
        &mut ScriptedResume::closed(),
    );

    assert_eq!(result.status, RunStatus::Aborted);
    assert_eq!(result.state, WorkflowState::Aborted);
    let abort = result.abort.as_ref().expect("abort info");
    assert_eq!(abort.kind, "not_found");
    assert!(abort.message.contains("level1.zip"));
    assert!(!paths.staging_root.exists());
    assert!(!paths.inputs.exists());
    assert!(paths.last_run.exists());
}

#[test]
fn missing_statement_degrades_to_placeholder() {
    let project = TestProject::new();
    project.write_archive(1, &[("level1_1.in", "1\n")]);
    let paths = project.paths(1);

    let result = run(
        &project,
        Mode::ProcessOnly,
        RunOptions::default(),
        &ScriptedAssistant::failing("unused"),
        &mut ScriptedResume::closed(),
    );

    assert_eq!(result.status, RunStatus::Success);
    assert!(
        result
            .warnings
            .iter()
            .any(|w| matches!(w, Warning::TextExtraction { .. }))
    );
    let prompt = fs::read_to_string(&paths.prompt).expect("prompt");
    assert!(prompt.contains(UNAVAILABLE_MARKER));
    assert!(prompt.contains("No sample outputs were shipped with this level."));
}

#[test]
fn failing_text_extraction_still_writes_prompt() {
    let project = TestProject::new();
    standard_archive(&project);
    let paths = project.paths(1);
    let ctx = project.context(1, Mode::ProcessOnly, RunOptions::default());

    let result = run_workflow(
        &ctx,
        &StaticTextExtractor::failing("pdftotext exploded"),
        &ScriptedAssistant::failing("unused"),
        &mut ScriptedResume::closed(),
    )
    .expect("run workflow");

    assert_eq!(result.status, RunStatus::Success);
    let prompt = fs::read_to_string(&paths.prompt).expect("prompt");
    assert!(prompt.contains(UNAVAILABLE_MARKER));
    assert!(prompt.contains("pdftotext exploded"));
    assert_eq!(project.list(&paths.inputs).len(), 3);
}

#[test]
fn organize_conflict_aborts_and_keeps_existing_files() {
    let project = TestProject::new();
    standard_archive(&project);
    let paths = project.paths(1);
    fs::create_dir_all(&paths.inputs).expect("mkdir");
    fs::write(paths.inputs.join("level1_1.in"), "something else\n").expect("write");

    let result = run(
        &project,
        Mode::ProcessOnly,
        RunOptions::default(),
        &ScriptedAssistant::failing("unused"),
        &mut ScriptedResume::closed(),
    );

    assert_eq!(result.status, RunStatus::Aborted);
    assert_eq!(result.abort.as_ref().expect("abort").kind, "organize_conflict");
    assert_eq!(
        fs::read_to_string(paths.inputs.join("level1_1.in")).expect("read"),
        "something else\n"
    );
    assert_eq!(project.list(&paths.inputs), vec!["level1_1.in"]);
    assert!(!paths.prompt.exists());
}

#[test]
fn auto_mode_writes_the_assistant_solution_and_runs_it() {
    let project = TestProject::new();
    standard_archive(&project);
    let paths = project.paths(1);
    let assistant = ScriptedAssistant::replying(&format!(
        "Here you go:\n\n```sh\n{FIRST_LINE}```\n"
    ));

    let result = run(
        &project,
        Mode::Auto,
        RunOptions::default(),
        &assistant,
        &mut ScriptedResume::closed(),
    );

    assert_eq!(result.status, RunStatus::Success);
    assert_eq!(assistant.calls(), 1);
    assert!(assistant.last_prompt().expect("prompt").contains(STATEMENT));
    assert!(
        fs::read_to_string(paths.default_solution())
            .expect("solution")
            .contains("read first")
    );
    assert!(
        transitions(&result).contains(&(WorkflowState::AiInvoking, WorkflowState::SolutionReady))
    );
}

#[test]
fn auto_mode_keeps_an_existing_solution() {
    let project = TestProject::new();
    standard_archive(&project);
    project.write_solution(1, FIRST_LINE);
    let assistant = ScriptedAssistant::replying("```sh\nexit 1\n```");

    let result = run(
        &project,
        Mode::Auto,
        RunOptions::default(),
        &assistant,
        &mut ScriptedResume::closed(),
    );

    assert_eq!(result.status, RunStatus::Success);
    assert_eq!(assistant.calls(), 0);
}

#[test]
fn assistant_failure_pauses_until_the_solution_appears() {
    let project = TestProject::new();
    standard_archive(&project);
    let paths = project.paths(1);
    let solution = paths.default_solution();
    let mut resume = ScriptedResume::new([ResumeEvent::Resume, ResumeEvent::Resume]).on_resume(
        move |index| {
            if index == 1 {
                write_solution_file(&solution, FIRST_LINE);
            }
        },
    );

    let result = run(
        &project,
        Mode::Auto,
        RunOptions::default(),
        &ScriptedAssistant::failing("backend offline"),
        &mut resume,
    );

    assert_eq!(result.status, RunStatus::Success);
    assert_eq!(result.state, WorkflowState::Cleaned);
    assert_eq!(resume.waits(), 2);
    assert!(paths.workflow_guide.exists());
    assert!(result.warnings.iter().any(
        |w| matches!(w, Warning::Assistant { message } if message.contains("backend offline"))
    ));
    assert!(
        result
            .warnings
            .iter()
            .any(|w| matches!(w, Warning::SolutionStillMissing { .. }))
    );
    let steps = transitions(&result);
    assert!(steps.contains(&(WorkflowState::AiInvoking, WorkflowState::Paused)));
    assert!(steps.contains(&(WorkflowState::Paused, WorkflowState::Paused)));
    assert!(steps.contains(&(WorkflowState::Paused, WorkflowState::SolutionReady)));
}

#[test]
fn paused_run_resumes_from_checkpoint_on_the_next_invocation() {
    let project = TestProject::new();
    standard_archive(&project);
    let paths = project.paths(1);
    let assistant = ScriptedAssistant::failing("unused");

    let paused = run(
        &project,
        Mode::Interactive,
        RunOptions::default(),
        &assistant,
        &mut ScriptedResume::closed(),
    );
    assert_eq!(paused.status, RunStatus::Paused);
    assert_eq!(paused.state, WorkflowState::Paused);
    let guide = fs::read_to_string(&paths.workflow_guide).expect("guide");
    assert!(guide.contains("level1.sh"));
    assert!(guide.contains("`levelrun 1`"));

    // Replace the archive so a re-extraction would be visible.
    project.write_archive(1, &[("level1_9.in", "9\n")]);
    project.write_solution(1, FIRST_LINE);

    let resumed = run(
        &project,
        Mode::Interactive,
        RunOptions::default(),
        &assistant,
        &mut ScriptedResume::closed(),
    );
    assert!(resumed.resumed);
    assert_eq!(resumed.status, RunStatus::Success);
    assert_eq!(
        resumed.steps.first().map(|s| (s.from, s.to)),
        Some((WorkflowState::PromptReady, WorkflowState::SolutionReady))
    );
    assert!(!paths.inputs.join("level1_9.in").exists());
    assert_eq!(resumed.execution.as_ref().expect("execution").results.len(), 3);
}

#[test]
fn no_wait_without_solution_aborts() {
    let project = TestProject::new();
    standard_archive(&project);
    let mut resume = ScriptedResume::new([ResumeEvent::Resume]);

    let result = run(
        &project,
        Mode::Interactive,
        RunOptions {
            wait: false,
            ..RunOptions::default()
        },
        &ScriptedAssistant::failing("unused"),
        &mut resume,
    );

    assert_eq!(result.status, RunStatus::Aborted);
    assert_eq!(result.abort.as_ref().expect("abort").kind, "not_found");
    assert_eq!(resume.waits(), 0);
}

#[test]
fn template_mode_writes_placeholder_and_runs_only_when_asked() {
    let project = TestProject::new();
    standard_archive(&project);
    let paths = project.paths(1);
    let assistant = ScriptedAssistant::failing("unused");

    let written = run(
        &project,
        Mode::Template,
        RunOptions::default(),
        &assistant,
        &mut ScriptedResume::closed(),
    );
    assert_eq!(written.status, RunStatus::Success);
    assert_eq!(written.state, WorkflowState::PromptReady);
    let template = fs::read_to_string(paths.default_solution()).expect("template");
    assert!(template.starts_with("#!/bin/sh"));
    assert!(!paths.outputs.join("level1_1.out").exists());

    let executed = run(
        &project,
        Mode::Template,
        RunOptions {
            run_template: true,
            ..RunOptions::default()
        },
        &assistant,
        &mut ScriptedResume::closed(),
    );
    assert_eq!(executed.status, RunStatus::Success);
    assert_eq!(executed.state, WorkflowState::Cleaned);
    assert_eq!(
        fs::read_to_string(paths.default_solution()).expect("template"),
        template
    );
    assert!(paths.outputs.join("level1_1.out").exists());
}

#[test]
fn levels_do_not_interfere() {
    let project = TestProject::new();
    standard_archive(&project);
    project.write_archive(2, &[("example.in", "2\n"), ("example.out", "2\n")]);
    let assistant = ScriptedAssistant::failing("unused");

    run(
        &project,
        Mode::ProcessOnly,
        RunOptions::default(),
        &assistant,
        &mut ScriptedResume::closed(),
    );
    let ctx = project.context(2, Mode::ProcessOnly, RunOptions::default());
    let second = run_workflow(
        &ctx,
        &StaticTextExtractor::text(STATEMENT),
        &assistant,
        &mut ScriptedResume::closed(),
    )
    .expect("run workflow");

    assert_eq!(second.status, RunStatus::Success);
    let inputs = project.list(&project.paths(1).inputs);
    assert!(inputs.contains(&"level2_example.in".to_string()));
    assert!(inputs.contains(&"level1_example.in".to_string()));
    assert!(project.paths(1).staging.exists());
    assert!(project.paths(2).staging.exists());
}
