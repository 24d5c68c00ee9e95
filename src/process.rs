//! External process runner shared by the mirror manager and the analyzer
//!
//! Every git and cloc invocation goes through [`run_tool`]:
//! 1. Spawn with `tokio::process::Command` (stdin closed, `kill_on_drop`)
//! 2. Race completion against the timeout and the cancellation token
//! 3. Map spawn/exit failures onto [`PipelineError`]
//!
//! Dropping the child on timeout or cancellation kills it, so an abandoned
//! process never outlives the task that started it.

use crate::error::{PipelineError, PipelineResult};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Captured output of a process that exited successfully
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// A fully described process invocation
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    /// 0 disables the timeout
    pub timeout_secs: u64,
    /// Secret substrings and their stand-ins, applied to logs and errors
    masks: Vec<(String, String)>,
}

impl ToolInvocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            timeout_secs: 0,
            masks: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Show `shown` wherever `raw` would appear in logs or error messages
    pub fn mask(mut self, raw: impl Into<String>, shown: impl Into<String>) -> Self {
        let raw = raw.into();
        if !raw.is_empty() {
            self.masks.push((raw, shown.into()));
        }
        self
    }

    fn masked(&self, text: &str) -> String {
        self.masks
            .iter()
            .fold(text.to_string(), |acc, (raw, shown)| acc.replace(raw, shown))
    }

    /// Command line as it may be logged
    pub fn display(&self) -> String {
        self.masked(&format!("{} {}", self.program, self.args.join(" ")))
    }
}

/// A git invocation that never blocks on a credential prompt
pub fn git(program: &str) -> ToolInvocation {
    ToolInvocation::new(program).env("GIT_TERMINAL_PROMPT", "0")
}

/// Run an external tool to completion.
///
/// A non-zero exit becomes [`PipelineError::Command`] carrying the trimmed
/// stderr; a missing executable becomes [`PipelineError::ToolMissing`].
pub async fn run_tool(
    invocation: &ToolInvocation,
    cancel: &CancellationToken,
) -> PipelineResult<ToolOutput> {
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }

    let program = &invocation.program;
    debug!("Running {}", invocation.display());

    let mut command = Command::new(program);
    command
        .args(&invocation.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(dir) = &invocation.cwd {
        command.current_dir(dir);
    }
    for (key, value) in &invocation.env {
        command.env(key, value);
    }

    let child = command.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            PipelineError::ToolMissing(program.clone())
        } else {
            PipelineError::Io(e)
        }
    })?;

    let wait = child.wait_with_output();
    let output = if invocation.timeout_secs > 0 {
        let limit = Duration::from_secs(invocation.timeout_secs);
        tokio::select! {
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            res = tokio::time::timeout(limit, wait) => match res {
                Ok(out) => out?,
                Err(_) => {
                    warn!("{} timed out after {}s", program, invocation.timeout_secs);
                    return Err(PipelineError::Timeout {
                        program: program.clone(),
                        secs: invocation.timeout_secs,
                    });
                }
            },
        }
    } else {
        tokio::select! {
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            out = wait => out?,
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        return Err(PipelineError::Command {
            program: program.clone(),
            code: output.status.code(),
            stderr: invocation.masked(stderr.trim()),
        });
    }

    Ok(ToolOutput { stdout, stderr })
}
