//! Child processes with a wall-clock limit and bounded captured output.
//!
//! Used for the solution program, the statement text extractor and the AI
//! assistant CLIs. Every pipe is drained on its own thread so a chatty child can
//! never block on a full pipe while we wait for it.

use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

/// How long an availability check (`<tool> --version`) may take.
const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Extra time for pipes to close once the process group has been killed.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.status.success()
    }

    /// Last few stderr lines, for one-line failure messages.
    pub fn stderr_tail(&self, max_lines: usize) -> String {
        let text = String::from_utf8_lossy(&self.stderr);
        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        let start = lines.len().saturating_sub(max_lines);
        lines[start..].join(" | ")
    }
}

/// Run `cmd`, feeding `stdin` if given, killing it after `timeout`.
///
/// At most `output_limit_bytes` of stdout and of stderr are kept; the rest is
/// drained and counted in `*_truncated`. On unix the child leads its own process
/// group and a timeout kills the whole group. A descendant still holding the
/// output pipes at the deadline counts as a timeout too. Spawn failures are
/// returned as `Err` with the underlying `io::Error` in the chain.
#[instrument(skip_all, fields(program = ?cmd.get_program(), timeout_secs = timeout.as_secs()))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    debug!("spawning child process");
    let deadline = Instant::now() + timeout;
    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawn {}", cmd.get_program().to_string_lossy()))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;
    let (tx, rx) = mpsc::channel();
    spawn_reader(stdout, output_limit_bytes, tx.clone(), Drained::Stdout);
    spawn_reader(stderr, output_limit_bytes, tx.clone(), Drained::Stderr);

    let expect_stdin = match stdin {
        Some(input) => {
            let mut child_stdin = child
                .stdin
                .take()
                .ok_or_else(|| anyhow!("stdin was not piped"))?;
            let input = input.to_vec();
            let tx = tx.clone();
            thread::spawn(move || {
                let written = match child_stdin.write_all(&input) {
                    // The child may exit without reading all of its input.
                    Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
                    other => other,
                };
                let _ = tx.send(Drained::Stdin(written));
            });
            true
        }
        None => false,
    };
    drop(tx);

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(timeout_secs = timeout.as_secs(), "command timed out, killing");
            timed_out = true;
            kill_process_group(child.id());
            if let Err(err) = child.kill() {
                debug!(err = %err, "child already gone");
            }
            child.wait().context("wait command after kill")?
        }
    };

    // Pipes stay open while any descendant of the child still holds them.
    let mut pipes = PipeResults::default();
    if !pipes.collect(&rx, expect_stdin, deadline)? {
        if !timed_out {
            warn!("descendant outlived the command, killing its process group");
            timed_out = true;
            kill_process_group(child.id());
        }
        if !pipes.collect(&rx, expect_stdin, Instant::now() + DRAIN_GRACE)? {
            warn!("pipes still held open after kill, abandoning their output");
        }
    }

    match pipes.stdin {
        Some(Err(e)) if timed_out => debug!(err = %e, "stdin write interrupted by kill"),
        Some(Err(e)) => return Err(e).context("write stdin"),
        _ => {}
    }
    let (stdout, stdout_truncated) = pipes.stdout.unwrap_or_else(|| Ok((Vec::new(), 0)))?;
    let (stderr, stderr_truncated) = pipes.stderr.unwrap_or_else(|| Ok((Vec::new(), 0)))?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

/// True if `program --version` starts and exits successfully.
pub fn program_available(program: &str) -> bool {
    let mut cmd = Command::new(program);
    cmd.arg("--version");
    match run_command_with_timeout(cmd, None, VERSION_CHECK_TIMEOUT, 4096) {
        Ok(output) => output.success(),
        Err(err) => {
            debug!(program, err = %err, "version check failed");
            false
        }
    }
}

/// Write captured stdout/stderr of one invocation to a log file.
pub fn write_process_log(path: &Path, label: &str, output: &CommandOutput) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create log dir {}", parent.display()))?;
    }
    let mut buf = format!("=== {label} ===\nexit: {:?}\n", output.status.code());
    if output.timed_out {
        buf.push_str("[timed out]\n");
    }
    buf.push_str("=== stdout ===\n");
    buf.push_str(&String::from_utf8_lossy(&output.stdout));
    if output.stdout_truncated > 0 {
        buf.push_str(&format!("\n[stdout truncated {} bytes]\n", output.stdout_truncated));
    }
    buf.push_str("\n=== stderr ===\n");
    buf.push_str(&String::from_utf8_lossy(&output.stderr));
    if output.stderr_truncated > 0 {
        buf.push_str(&format!("\n[stderr truncated {} bytes]\n", output.stderr_truncated));
    }
    fs::write(path, buf).with_context(|| format!("write log {}", path.display()))
}

type Captured = Result<(Vec<u8>, usize)>;

/// Completion message from one pipe helper thread.
enum Drained {
    Stdin(io::Result<()>),
    Stdout(Captured),
    Stderr(Captured),
}

#[derive(Default)]
struct PipeResults {
    stdin: Option<io::Result<()>>,
    stdout: Option<Captured>,
    stderr: Option<Captured>,
}

impl PipeResults {
    fn complete(&self, expect_stdin: bool) -> bool {
        self.stdout.is_some()
            && self.stderr.is_some()
            && (!expect_stdin || self.stdin.is_some())
    }

    /// Receive helper results until all are in (`true`) or `deadline` passes (`false`).
    fn collect(
        &mut self,
        rx: &Receiver<Drained>,
        expect_stdin: bool,
        deadline: Instant,
    ) -> Result<bool> {
        while !self.complete(expect_stdin) {
            match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                Ok(Drained::Stdin(result)) => self.stdin = Some(result),
                Ok(Drained::Stdout(result)) => self.stdout = Some(result),
                Ok(Drained::Stderr(result)) => self.stderr = Some(result),
                Err(RecvTimeoutError::Timeout) => return Ok(false),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(anyhow!("pipe helper thread panicked"));
                }
            }
        }
        Ok(true)
    }
}

fn spawn_reader<R: Read + Send + 'static>(
    reader: R,
    limit: usize,
    tx: Sender<Drained>,
    wrap: fn(Captured) -> Drained,
) {
    thread::spawn(move || {
        let _ = tx.send(wrap(read_stream_limited(reader, limit)));
    });
}

/// SIGKILL the child's process group so descendants die with it.
#[cfg(unix)]
fn kill_process_group(pid: u32) {
    let group = format!("-{pid}");
    let killed = Command::new("kill")
        .args(["-KILL", "--", &group])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    match killed {
        Ok(status) if status.success() => debug!(pid, "process group killed"),
        Ok(status) => debug!(pid, code = ?status.code(), "process group already gone"),
        Err(err) => warn!(pid, err = %err, "failed to run kill for process group"),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        let keep = n.min(remaining);
        buf.extend_from_slice(&chunk[..keep]);
        truncated += n - keep;
    }

    Ok((buf, truncated))
}
