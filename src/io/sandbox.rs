//! Sandbox abstraction for script execution.
//!
//! The [`Sandbox`] trait decouples retry orchestration from the actual
//! interpreter invocation. Tests use scripted sandboxes that return
//! predetermined results without spawning processes.

use std::path::Path;
use std::process::Command;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::core::record::RawFailure;
use crate::io::process::run_command_with_timeout;

/// Terminal state of one script execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecStatus {
    /// Exit code zero.
    Success,
    /// Nonzero exit; stderr and exit code captured for classification.
    Failed(RawFailure),
    /// The wall-clock limit elapsed and the process was killed.
    TimedOut,
}

/// Outcome of one script execution.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub status: ExecStatus,
    pub duration: Duration,
}

/// Abstraction over script execution backends.
pub trait Sandbox {
    /// Run the script to completion or timeout.
    fn run(&self, script: &Path, timeout: Duration) -> Result<ExecutionResult>;
}

/// Sandbox that spawns a Python interpreter on the script.
///
/// The child runs with the script's directory as working directory so that
/// relative paths inside the script resolve next to it. Stdin is closed.
pub struct PythonSandbox {
    interpreter: String,
    output_limit_bytes: usize,
}

impl PythonSandbox {
    pub fn new(interpreter: impl Into<String>, output_limit_bytes: usize) -> Self {
        Self {
            interpreter: interpreter.into(),
            output_limit_bytes,
        }
    }
}

impl Sandbox for PythonSandbox {
    #[instrument(skip_all, fields(script = %script.display(), timeout_secs = timeout.as_secs()))]
    fn run(&self, script: &Path, timeout: Duration) -> Result<ExecutionResult> {
        if !script.exists() {
            return Err(anyhow!("missing script {}", script.display()));
        }
        let workdir = script
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        info!(interpreter = %self.interpreter, "running script");
        let mut cmd = Command::new(&self.interpreter);
        cmd.arg(script).current_dir(workdir);

        let started = Instant::now();
        let output = run_command_with_timeout(cmd, timeout, self.output_limit_bytes)
            .with_context(|| format!("run {}", script.display()))?;
        let duration = started.elapsed();

        if output.timed_out {
            warn!(timeout_secs = timeout.as_secs(), "script timed out");
            return Ok(ExecutionResult {
                status: ExecStatus::TimedOut,
                duration,
            });
        }

        if output.status.success() {
            debug!(duration_ms = duration.as_millis() as u64, "script succeeded");
            return Ok(ExecutionResult {
                status: ExecStatus::Success,
                duration,
            });
        }

        let exit_code = output.status.code();
        debug!(?exit_code, "script failed");
        Ok(ExecutionResult {
            status: ExecStatus::Failed(RawFailure {
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                exit_code,
            }),
            duration,
        })
    }
}
