//! External tool invocation (ffmpeg).
//!
//! The pipeline only needs one narrow capability: run the tool with arguments,
//! wait for it, and get its exit status plus captured output. Keeping that behind
//! [`ExternalTool`] lets tests record invocations and leaves room for an
//! in-process codec later.

use std::ffi::OsString;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::opts::DEFAULT_TOOL_TIMEOUT;
use crate::{Error, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Result of one finished invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Last `n` non-empty lines of stderr, which is where ffmpeg puts its diagnosis.
    pub fn stderr_tail(&self, n: usize) -> String {
        let lines: Vec<&str> = self
            .stderr
            .lines()
            .filter(|l| !l.trim().is_empty())
            .collect();
        lines[lines.len().saturating_sub(n)..].join("\n")
    }
}

/// A synchronous, blocking external program.
pub trait ExternalTool: Send + Sync {
    fn run(&self, args: &[OsString]) -> Result<ToolOutput>;
}

/// Runs a real executable (by default `ffmpeg` from `PATH`).
#[derive(Debug, Clone)]
pub struct FfmpegTool {
    program: PathBuf,
    timeout: Option<Duration>,
}

impl Default for FfmpegTool {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            timeout: Some(DEFAULT_TOOL_TIMEOUT),
        }
    }
}

impl FfmpegTool {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn program_name(&self) -> String {
        self.program.display().to_string()
    }
}

impl ExternalTool for FfmpegTool {
    fn run(&self, args: &[OsString]) -> Result<ToolOutput> {
        tracing::debug!(program = %self.program.display(), ?args, "running external tool");

        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::msg(format!("failed to spawn '{}': {e}", self.program_name())))?;

        // Drain both pipes concurrently so a chatty child never blocks on a full pipe.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let Some(status) = wait_with_timeout(&mut child, self.timeout)? else {
            let _ = child.kill();
            let _ = child.wait();
            // A grandchild may still hold the pipes open; detach the readers.
            drop((stdout, stderr));
            tracing::warn!(program = %self.program.display(), "external tool timed out; killed");
            return Err(Error::ToolTimeout {
                program: self.program_name(),
                secs: self.timeout.map(|t| t.as_secs()).unwrap_or_default(),
            });
        };

        Ok(ToolOutput {
            exit_code: status.code(),
            stdout: join_drain(stdout),
            stderr: join_drain(stderr),
        })
    }
}

/// `Ok(None)` means the deadline passed with the child still running.
fn wait_with_timeout(child: &mut Child, timeout: Option<Duration>) -> Result<Option<ExitStatus>> {
    let Some(timeout) = timeout else {
        return Ok(Some(child.wait()?));
    };

    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut r| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = r.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn join_drain(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}
