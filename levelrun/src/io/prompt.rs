//! Prompt, solution template and workflow guide rendering.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::debug;

use crate::core::classify::{output_name_for_input, stem};
use crate::io::paths::LevelPaths;
use crate::io::statement::StatementText;

const LEVEL_PROMPT_TEMPLATE: &str = include_str!("prompts/level_prompt.md");
const WORKFLOW_TEMPLATE: &str = include_str!("prompts/workflow.md");
const AI_REQUEST_TEMPLATE: &str = include_str!("prompts/ai_request.md");
const SOLUTION_PY_TEMPLATE: &str = include_str!("prompts/solution.py");
const SOLUTION_SH_TEMPLATE: &str = include_str!("prompts/solution.sh");

/// A shipped sample output with its input, when the input exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sample {
    /// Shared stem (`level1_example`).
    pub name: String,
    pub input_file: String,
    pub input: Option<String>,
    pub output_file: String,
    pub output: String,
}

/// Pair organized inputs and sample outputs by stem.
///
/// Returns the samples ordered by stem plus the names of inputs without a sample output.
pub fn collect_samples(
    paths: &LevelPaths,
    inputs: &[String],
    sample_outputs: &[String],
) -> Result<(Vec<Sample>, Vec<String>)> {
    let mut samples = Vec::new();
    for output_file in sample_outputs {
        let name = stem(output_file).to_string();
        let input_file = format!("{name}.in");
        let input = if inputs.contains(&input_file) {
            Some(read_sample(&paths.inputs.join(&input_file))?)
        } else {
            None
        };
        samples.push(Sample {
            output: read_sample(&paths.outputs.join(output_file))?,
            name,
            input_file,
            input,
            output_file: output_file.clone(),
        });
    }
    samples.sort_by(|a, b| a.name.cmp(&b.name));

    let mut other_inputs: Vec<String> = inputs
        .iter()
        .filter(|input| !sample_outputs.contains(&output_name_for_input(input)))
        .cloned()
        .collect();
    other_inputs.sort();
    Ok((samples, other_inputs))
}

/// Sample contents as shipped; trailing newlines are significant.
fn read_sample(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("read sample {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Human-readable language for a solution extension.
pub fn language_name(extension: &str) -> &str {
    match extension {
        "py" => "Python 3",
        "sh" => "POSIX shell",
        "rs" => "Rust",
        "js" => "JavaScript",
        other => other,
    }
}

/// Everything the level prompt is rendered from.
#[derive(Debug, Clone)]
pub struct PromptInputs<'a> {
    pub paths: &'a LevelPaths,
    pub statement: &'a StatementText,
    pub samples: &'a [Sample],
    pub other_inputs: &'a [String],
    pub extension: &'a str,
}

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.add_template("level_prompt", LEVEL_PROMPT_TEMPLATE)
            .expect("level prompt template should be valid");
        env.add_template("workflow", WORKFLOW_TEMPLATE)
            .expect("workflow template should be valid");
        env.add_template("ai_request", AI_REQUEST_TEMPLATE)
            .expect("ai request template should be valid");
        env.add_template("solution_py", SOLUTION_PY_TEMPLATE)
            .expect("python solution template should be valid");
        env.add_template("solution_sh", SOLUTION_SH_TEMPLATE)
            .expect("shell solution template should be valid");
        Self { env }
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String> {
        let template = self.env.get_template(name)?;
        let mut rendered = template
            .render(ctx)
            .with_context(|| format!("render {name} template"))?;
        if !rendered.ends_with('\n') {
            rendered.push('\n');
        }
        Ok(rendered)
    }
}

/// Render the assistant prompt. Same inputs always give the same bytes.
pub fn build_prompt(input: &PromptInputs<'_>) -> Result<String> {
    let paths = input.paths;
    let prompt = PromptEngine::new().render(
        "level_prompt",
        context! {
            level => paths.level.number(),
            statement => input.statement.prompt_body(),
            language => language_name(input.extension),
            solution_file => paths.solution_name.as_str(),
            inputs_dir => root_relative(paths, &paths.inputs),
            outputs_dir => root_relative(paths, &paths.outputs),
            prefix => paths.level.file_prefix(),
            samples => input.samples,
            other_inputs => input.other_inputs,
        },
    )?;
    debug!(bytes = prompt.len(), samples = input.samples.len(), "prompt rendered");
    Ok(prompt)
}

/// Render the placeholder solution for `extension`.
pub fn render_solution_template(paths: &LevelPaths, extension: &str) -> Result<String> {
    let name = match extension {
        "py" => "solution_py",
        "sh" => "solution_sh",
        other => return Err(anyhow!("no solution template for .{other} files")),
    };
    PromptEngine::new().render(name, context! { level => paths.level.number() })
}

/// Render the manual workflow guide written when a run pauses.
pub fn render_workflow_guide(paths: &LevelPaths, interpreter: &[String]) -> Result<String> {
    let mut try_command: Vec<String> = interpreter.to_vec();
    try_command.push(paths.solution_name.clone());
    let sample_input = format!(
        "{}/{}example.in",
        root_relative(paths, &paths.inputs),
        paths.level.file_prefix()
    );
    let try_command = format!("{} < {sample_input}", try_command.join(" "));
    PromptEngine::new().render(
        "workflow",
        context! {
            level => paths.level.number(),
            number => paths.level.number(),
            prompt_file => root_relative(paths, &paths.prompt),
            solution_file => paths.solution_name.as_str(),
            try_command => try_command,
        },
    )
}

/// Render the request file handed to a human when no assistant CLI is usable.
pub fn render_ai_request(paths: &LevelPaths, prompt: &str, extension: &str) -> Result<String> {
    PromptEngine::new().render(
        "ai_request",
        context! {
            level => paths.level.number(),
            language => language_name(extension),
            prompt => prompt.trim_end(),
            solution_file => paths.solution_name.as_str(),
        },
    )
}

/// Write a rendered document atomically.
pub fn write_document(path: &Path, contents: &str) -> Result<()> {
    super::write_atomic(path, contents)
}

fn root_relative(paths: &LevelPaths, dir: &Path) -> String {
    dir.strip_prefix(&paths.root)
        .unwrap_or(dir)
        .display()
        .to_string()
}
