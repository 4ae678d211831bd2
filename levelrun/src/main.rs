//! `levelrun` command-line entry point.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use levelrun::core::types::{Level, Mode};
use levelrun::exit_codes;
use levelrun::io::assistant::AssistantChain;
use levelrun::io::config::load_config;
use levelrun::io::paths::default_config_path;
use levelrun::io::resume::LineResume;
use levelrun::io::statement::CommandTextExtractor;
use levelrun::logging;
use levelrun::report::{exit_code, render_summary};
use levelrun::workflow::{RunOptions, WorkflowContext, run_workflow};

#[derive(Parser)]
#[command(
    name = "levelrun",
    version,
    about = "Unpack a contest level, build its prompt, run the solution on every input"
)]
struct Cli {
    /// Level number (positive integer).
    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    level: u32,

    /// How the solution is obtained once the prompt is ready.
    #[arg(long, value_enum, default_value_t = ModeArg::Interactive)]
    mode: ModeArg,

    /// In template mode, run the solution after writing the template.
    #[arg(long)]
    run: bool,

    /// Abort instead of pausing when no solution exists.
    #[arg(long)]
    no_wait: bool,

    /// Ignore the saved checkpoint and prepare the level from scratch.
    #[arg(long)]
    fresh: bool,

    /// Project root (defaults to the current directory).
    #[arg(long)]
    root: Option<PathBuf>,

    /// Config file (defaults to `<root>/.levelrun/config.toml`).
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Interactive,
    Auto,
    ProcessOnly,
    Template,
}

impl From<ModeArg> for Mode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Interactive => Mode::Interactive,
            ModeArg::Auto => Mode::Auto,
            ModeArg::ProcessOnly => Mode::ProcessOnly,
            ModeArg::Template => Mode::Template,
        }
    }
}

fn main() {
    logging::init();
    match run(Cli::parse()) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::ABORTED);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let level = Level::new(cli.level)?;
    let mode = Mode::from(cli.mode);
    let root = match cli.root {
        Some(root) => root,
        None => std::env::current_dir().context("resolve current directory")?,
    };
    let root = root
        .canonicalize()
        .with_context(|| format!("resolve project root {}", root.display()))?;
    let config_path = cli.config.unwrap_or_else(|| default_config_path(&root));
    let config = load_config(&config_path)?;

    let options = RunOptions {
        run_template: cli.run,
        wait: !cli.no_wait,
        fresh: cli.fresh,
    };
    let ctx = WorkflowContext::new(root, level, mode, options, config);
    let extractor = CommandTextExtractor::from_config(&ctx.config.statement);
    let assistant = if mode == Mode::Auto {
        AssistantChain::from_config(
            &ctx.config.assistant,
            &ctx.paths,
            &ctx.config.solution.extension,
        )
    } else {
        AssistantChain::new(Vec::new())
    };
    let mut resume = LineResume::stdin();

    let run = run_workflow(&ctx, &extractor, &assistant, &mut resume)?;
    print!("{}", render_summary(&run, &ctx.paths));
    Ok(exit_code(&run))
}
