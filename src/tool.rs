//! External tool invocation.
//!
//! Both the tiling step (`makepano`) and the viewer protection step
//! (`protect`) are subcommands of the same krpano tools binary. The
//! [`ToolRunner`] trait is the seam between pipeline logic and the real
//! process: production code uses [`ProcessRunner`], tests use the recording
//! `MockRunner` in this module's tests.
//!
//! A run produces a structured [`ToolOutput`] (`exit_code` + output lines);
//! mapping that to success or failure is the pure [`ToolOutput::into_result`],
//! so the failure protocol is testable without spawning anything.
//!
//! ## Timeouts and cancellation
//!
//! Tiling tools can hang on malformed input. [`ProcessRunner`] polls the
//! child and kills it when the context's timeout elapses or its cancellation
//! flag is raised.

use crate::context::{BuildContext, BuildEvent};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

/// How often a running child is polled for exit, timeout and cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("cannot run {}: {source}", .program.display())]
    Io {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Non-zero exit. The message is the tool's own diagnostic text.
    #[error("{message}")]
    Failed {
        exit_code: Option<i32>,
        message: String,
    },
    #[error("{subcommand} timed out after {}s", .after.as_secs())]
    TimedOut { subcommand: String, after: Duration },
    #[error("{subcommand} cancelled")]
    Cancelled { subcommand: String },
}

/// One subcommand call: `<tools> <subcommand> <args...>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub subcommand: String,
    pub args: Vec<String>,
}

impl ToolInvocation {
    pub fn new(subcommand: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            subcommand: subcommand.into(),
            args,
        }
    }
}

/// Captured result of a finished tool run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub lines: Vec<String>,
}

impl ToolOutput {
    /// Build from raw captured output, splitting into lines.
    pub fn from_text(exit_code: Option<i32>, text: &str) -> Self {
        Self {
            exit_code,
            lines: text.lines().map(|l| l.to_string()).collect(),
        }
    }

    /// Output lines with empty ones dropped.
    pub fn non_empty_lines(&self) -> impl Iterator<Item = &str> {
        self.lines
            .iter()
            .map(|l| l.trim_end_matches('\r'))
            .filter(|l| !l.is_empty())
    }

    /// Map to success (the non-empty lines) or [`ToolError::Failed`], whose
    /// message is the non-empty lines joined by a single space.
    pub fn into_result(self) -> Result<Vec<String>, ToolError> {
        let lines: Vec<String> = self.non_empty_lines().map(|l| l.to_string()).collect();
        match self.exit_code {
            Some(0) => Ok(lines),
            exit_code => Err(ToolError::Failed {
                exit_code,
                message: lines.join(" "),
            }),
        }
    }
}

/// Runs krpano tool subcommands.
///
/// `Sync` so one runner can serve a parallel batch build.
pub trait ToolRunner: Sync {
    fn run(&self, invocation: &ToolInvocation, ctx: &BuildContext) -> Result<ToolOutput, ToolError>;
}

/// Run an invocation and apply the failure protocol. Successful output is
/// forwarded to the context as `ToolOutput` events.
pub fn run_checked(
    runner: &impl ToolRunner,
    invocation: &ToolInvocation,
    ctx: &BuildContext,
) -> Result<(), ToolError> {
    ctx.emit(BuildEvent::ToolInvoked {
        subcommand: invocation.subcommand.clone(),
        args: invocation.args.clone(),
    });
    let lines = runner.run(invocation, ctx)?.into_result()?;
    for line in lines {
        ctx.emit(BuildEvent::ToolOutput { line });
    }
    Ok(())
}

/// Spawns the real krpano tools binary as a blocking child process.
pub struct ProcessRunner {
    program: PathBuf,
}

impl ProcessRunner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn io_error(&self, source: io::Error) -> ToolError {
        ToolError::Io {
            program: self.program.clone(),
            source,
        }
    }
}

impl ToolRunner for ProcessRunner {
    fn run(&self, invocation: &ToolInvocation, ctx: &BuildContext) -> Result<ToolOutput, ToolError> {
        let mut child = Command::new(&self.program)
            .arg(&invocation.subcommand)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.io_error(e))?;

        // Drain both pipes concurrently so a chatty tool never blocks on a
        // full pipe while we wait for it.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let deadline = Instant::now() + ctx.tool_timeout();
        let status = loop {
            if let Some(status) = child.try_wait().map_err(|e| self.io_error(e))? {
                break status;
            }
            if ctx.is_cancelled() {
                terminate(&mut child);
                return Err(ToolError::Cancelled {
                    subcommand: invocation.subcommand.clone(),
                });
            }
            if Instant::now() >= deadline {
                terminate(&mut child);
                return Err(ToolError::TimedOut {
                    subcommand: invocation.subcommand.clone(),
                    after: ctx.tool_timeout(),
                });
            }
            thread::sleep(POLL_INTERVAL);
        };

        let mut text = collect(stdout);
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&collect(stderr));
        Ok(ToolOutput::from_text(status.code(), &text))
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

fn terminate(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}
