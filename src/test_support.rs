//! Test-only scripted doubles and fixture helpers.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, anyhow};

use crate::core::record::{ErrorKind, ErrorRecord, RawFailure};
use crate::fallback::Fallback;
use crate::handlers::FixProposal;
use crate::io::installer::Installer;
use crate::io::sandbox::{ExecStatus, ExecutionResult, Sandbox};
use crate::metrics::{MetricsSink, SessionEvent};

/// Sandbox that replays a queue of predetermined results.
pub struct ScriptedSandbox {
    results: RefCell<VecDeque<ExecutionResult>>,
    pub runs: RefCell<u32>,
}

impl ScriptedSandbox {
    pub fn new(results: Vec<ExecutionResult>) -> Self {
        Self {
            results: RefCell::new(results.into()),
            runs: RefCell::new(0),
        }
    }
}

impl Sandbox for ScriptedSandbox {
    fn run(&self, _script: &Path, _timeout: Duration) -> Result<ExecutionResult> {
        *self.runs.borrow_mut() += 1;
        self.results
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted sandbox ran out of results"))
    }
}

/// Installer that records requests and answers from a queue (default: accept).
pub struct ScriptedInstaller {
    outcomes: RefCell<VecDeque<bool>>,
    pub requested: RefCell<Vec<String>>,
}

impl ScriptedInstaller {
    pub fn new(outcomes: Vec<bool>) -> Self {
        Self {
            outcomes: RefCell::new(outcomes.into()),
            requested: RefCell::new(Vec::new()),
        }
    }

    pub fn accepting() -> Self {
        Self::new(Vec::new())
    }
}

impl Installer for ScriptedInstaller {
    fn install(&self, package: &str) -> Result<bool> {
        self.requested.borrow_mut().push(package.to_string());
        Ok(self.outcomes.borrow_mut().pop_front().unwrap_or(true))
    }
}

/// Fallback that yields each queued proposal once.
pub struct ScriptedFallback {
    proposals: RefCell<VecDeque<FixProposal>>,
}

impl ScriptedFallback {
    pub fn new(proposals: Vec<FixProposal>) -> Self {
        Self {
            proposals: RefCell::new(proposals.into()),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

impl Fallback for ScriptedFallback {
    fn propose(&self, _record: &ErrorRecord, _source: &str) -> Result<Option<FixProposal>> {
        Ok(self.proposals.borrow_mut().pop_front())
    }
}

/// Metrics sink that collects events in memory.
#[derive(Default)]
pub struct CollectingSink {
    pub events: RefCell<Vec<SessionEvent>>,
}

impl MetricsSink for CollectingSink {
    fn record(&self, event: &SessionEvent) -> Result<()> {
        self.events.borrow_mut().push(event.clone());
        Ok(())
    }
}

/// A successful execution taking a nominal amount of time.
pub fn success() -> ExecutionResult {
    ExecutionResult {
        status: ExecStatus::Success,
        duration: Duration::from_millis(5),
    }
}

/// A timed-out execution.
pub fn timed_out() -> ExecutionResult {
    ExecutionResult {
        status: ExecStatus::TimedOut,
        duration: Duration::from_secs(10),
    }
}

/// A failed execution with the given stderr and exit code 1.
pub fn failure(stderr: &str) -> ExecutionResult {
    ExecutionResult {
        status: ExecStatus::Failed(RawFailure {
            stderr: stderr.to_string(),
            exit_code: Some(1),
        }),
        duration: Duration::from_millis(5),
    }
}

/// A minimal runtime traceback for `script` ending in `exception_line`
/// (e.g. `NameError: name 'x' is not defined`).
pub fn traceback(script: &Path, line: u32, exception_line: &str) -> String {
    format!(
        "Traceback (most recent call last):\n  File \"{}\", line {}, in <module>\n{}\n",
        script.display(),
        line,
        exception_line
    )
}

/// A syntax-style report for `script` (no traceback frames).
pub fn syntax_failure(script: &Path, line: u32, code: &str, exception_line: &str) -> String {
    format!(
        "  File \"{}\", line {}\n    {}\n        ^\n{}\n",
        script.display(),
        line,
        code,
        exception_line
    )
}

/// Deterministic error record for handler tests.
pub fn record(kind: ErrorKind, message: &str, line: Option<u32>, symbols: &[&str]) -> ErrorRecord {
    ErrorRecord {
        kind,
        message: message.to_string(),
        line,
        column: None,
        extracted_symbols: symbols.iter().map(|s| s.to_string()).collect(),
        confidence: 0.9,
    }
}

/// Write a script fixture and return its path.
pub fn write_script(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).expect("write script fixture");
    path
}
