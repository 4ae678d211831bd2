//! The explicit resume signal an interactive pause blocks on.

use std::io::BufRead;

use anyhow::{Context, Result};

/// What the resume source reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeEvent {
    /// The user says the solution is ready.
    Resume,
    /// The source closed (EOF); no further resume will arrive in this process.
    Closed,
}

/// Source of resume signals for [`Mode::Interactive`](crate::core::types::Mode).
pub trait ResumeSignal {
    /// Block until the next signal. No timeout.
    fn wait(&mut self, solution_hint: &str) -> Result<ResumeEvent>;
}

/// Waits for a line on a reader, normally stdin.
pub struct LineResume<R> {
    reader: R,
}

impl<R: BufRead> LineResume<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl LineResume<std::io::StdinLock<'static>> {
    pub fn stdin() -> Self {
        Self::new(std::io::stdin().lock())
    }
}

impl<R: BufRead> ResumeSignal for LineResume<R> {
    fn wait(&mut self, solution_hint: &str) -> Result<ResumeEvent> {
        eprintln!("Press Enter once {solution_hint} is saved...");
        let mut line = String::new();
        let read = self
            .reader
            .read_line(&mut line)
            .context("read resume signal")?;
        Ok(if read == 0 {
            ResumeEvent::Closed
        } else {
            ResumeEvent::Resume
        })
    }
}
