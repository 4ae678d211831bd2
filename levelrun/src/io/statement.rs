//! Statement document to plain text.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{info, warn};

use crate::core::types::Warning;
use crate::io::config::StatementConfig;
use crate::io::process::run_command_with_timeout;

/// Marker rendered into the prompt when no statement text is available.
pub const UNAVAILABLE_MARKER: &str = "[STATEMENT UNAVAILABLE]";

/// Turns a statement document into text, preserving page order.
///
/// Runs on a worker thread alongside file organization, hence `Sync`.
pub trait TextExtractor: Sync {
    fn extract(&self, document: &Path) -> Result<String>;
}

/// Default extractor: plain-text documents are read as-is, anything else goes
/// through an external command (`pdftotext -layout <file> -`).
#[derive(Debug, Clone)]
pub struct CommandTextExtractor {
    command: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandTextExtractor {
    pub fn from_config(cfg: &StatementConfig) -> Self {
        Self {
            command: cfg.command.clone(),
            timeout: Duration::from_secs(cfg.timeout_secs),
            output_limit_bytes: cfg.output_limit_bytes,
        }
    }
}

impl TextExtractor for CommandTextExtractor {
    fn extract(&self, document: &Path) -> Result<String> {
        let is_plain_text = document
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("txt") || e.eq_ignore_ascii_case("md"));
        if is_plain_text {
            return fs::read_to_string(document)
                .with_context(|| format!("read {}", document.display()));
        }

        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("statement command is empty"))?;
        let mut cmd = Command::new(program);
        cmd.args(args).arg(document).arg("-");
        let output = run_command_with_timeout(cmd, None, self.timeout, self.output_limit_bytes)
            .with_context(|| format!("run {program}"))?;
        if output.timed_out {
            return Err(anyhow!("{program} timed out after {}s", self.timeout.as_secs()));
        }
        if !output.status.success() {
            return Err(anyhow!(
                "{program} exited with {:?}: {}",
                output.status.code(),
                output.stderr_tail(3)
            ));
        }
        Ok(render_pages(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Render form-feed separated pages as `--- Page K ---` blocks.
pub fn render_pages(raw: &str) -> String {
    let pages: Vec<&str> = raw.split('\x0c').collect();
    // pdftotext terminates the last page with a form feed too.
    let count = match pages.last() {
        Some(last) if pages.len() > 1 && last.trim().is_empty() => pages.len() - 1,
        _ => pages.len(),
    };
    let mut out = String::new();
    for (index, page) in pages.iter().take(count).enumerate() {
        if index > 0 {
            out.push('\n');
        }
        out.push_str(&format!("--- Page {} ---\n", index + 1));
        out.push_str(page.trim_end());
        out.push('\n');
    }
    out
}

/// Statement text for the prompt, or the reason it is missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementText {
    Text { source: PathBuf, text: String },
    Unavailable { reason: String },
}

impl StatementText {
    /// Body placed in the prompt: the text, or the marker followed by the reason.
    pub fn prompt_body(&self) -> String {
        match self {
            StatementText::Text { text, .. } => text.trim_end().to_string(),
            StatementText::Unavailable { reason } => format!("{UNAVAILABLE_MARKER} {reason}"),
        }
    }

    pub fn source(&self) -> Option<&Path> {
        match self {
            StatementText::Text { source, .. } => Some(source),
            StatementText::Unavailable { .. } => None,
        }
    }
}

/// Extract the located statement, degrading every failure to a placeholder and a warning.
pub fn read_statement<T: TextExtractor + ?Sized>(
    extractor: &T,
    located: Option<&Path>,
) -> (StatementText, Option<Warning>) {
    let Some(document) = located else {
        let reason = "no statement document found".to_string();
        warn!("{reason}");
        return (
            StatementText::Unavailable {
                reason: reason.clone(),
            },
            Some(Warning::TextExtraction { message: reason }),
        );
    };
    let failure = match extractor.extract(document) {
        Ok(text) if !text.trim().is_empty() => {
            info!(path = %document.display(), chars = text.chars().count(), "statement text extracted");
            return (
                StatementText::Text {
                    source: document.to_path_buf(),
                    text,
                },
                None,
            );
        }
        Ok(_) => format!("{} contains no text", document.display()),
        Err(err) => format!("{}: {err:#}", document.display()),
    };
    warn!(reason = %failure, "statement text unavailable");
    (
        StatementText::Unavailable {
            reason: failure.clone(),
        },
        Some(Warning::TextExtraction { message: failure }),
    )
}
