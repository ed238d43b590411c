//! Package installation abstraction.
//!
//! Installing a distribution is the one fix side effect that reaches outside
//! the script's directory, so it sits behind its own trait and an explicit
//! opt-in flag. Tests use scripted installers that never touch pip.

use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::io::process::run_command_with_timeout;

/// Abstraction over package installation backends.
pub trait Installer {
    /// Install a distribution. `Ok(false)` means pip ran and failed (wrong
    /// name, no network); the caller decides whether to keep going.
    fn install(&self, package: &str) -> Result<bool>;
}

/// Installer that shells out to `python -m pip install`.
pub struct PipInstaller {
    python: String,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl PipInstaller {
    pub fn new(python: impl Into<String>, timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            python: python.into(),
            timeout,
            output_limit_bytes,
        }
    }
}

impl Installer for PipInstaller {
    #[instrument(skip_all, fields(package))]
    fn install(&self, package: &str) -> Result<bool> {
        info!(package, "installing distribution");
        let mut cmd = Command::new(&self.python);
        cmd.arg("-m").arg("pip").arg("install").arg(package);

        let output = run_command_with_timeout(cmd, self.timeout, self.output_limit_bytes)
            .with_context(|| format!("pip install {package}"))?;

        if output.timed_out {
            warn!(package, timeout_secs = self.timeout.as_secs(), "pip install timed out");
            return Ok(false);
        }
        if !output.status.success() {
            warn!(
                package,
                exit_code = ?output.status.code(),
                stderr = %String::from_utf8_lossy(&output.stderr),
                "pip install failed"
            );
            return Ok(false);
        }
        info!(package, "installed");
        Ok(true)
    }
}
