//! Session bookkeeping: the append-only history of fix attempts and the
//! terminal outcome of one run.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::record::{ErrorRecord, Signature};

/// What rerunning the script after a fix showed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verification {
    /// The script now exits zero.
    Success,
    /// Same failure signature as before the fix.
    StillFailing,
    /// The script still fails, but with a new signature. Progress.
    DifferentError,
}

/// Why a session stopped without success and without exhausting retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FatalReason {
    /// No registered handler accepted the failure.
    NoHandler,
    /// An applied fix reproduced the exact same failure signature.
    FixIneffectiveRepeat,
    /// The script exceeded its wall-clock budget.
    Timeout,
    /// The fixed source could not be written to disk.
    WriteFailure,
}

/// Terminal state of a session. `Running` is the in-flight state and never
/// the final answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    Running,
    Success,
    Exhausted,
    Fatal(FatalReason),
}

/// One entry in the attempt history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixAttempt {
    /// The classified failure that triggered this attempt.
    pub record: ErrorRecord,
    pub handler_id: String,
    pub description: String,
    /// The proposing handler's confidence in its edit.
    pub confidence: f32,
    /// False when the proposal was suggest-only and never written.
    pub applied: bool,
    /// Missing when the attempt never reached verification.
    pub verification: Option<Verification>,
    pub timestamp_ms: u64,
}

impl FixAttempt {
    pub fn new(
        record: ErrorRecord,
        handler_id: &str,
        description: String,
        confidence: f32,
        applied: bool,
    ) -> Self {
        Self {
            record,
            handler_id: handler_id.to_string(),
            description,
            confidence,
            applied,
            verification: None,
            timestamp_ms: now_ms(),
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// The full record of one run: script, attempts in order, terminal outcome.
///
/// The outcome starts `Running` and moves exactly once, via
/// [`Session::finalize`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    script: PathBuf,
    max_retries: u32,
    attempts: Vec<FixAttempt>,
    outcome: SessionOutcome,
}

impl Session {
    pub fn new(script: &Path, max_retries: u32) -> Self {
        Self {
            script: script.to_path_buf(),
            max_retries,
            attempts: Vec::new(),
            outcome: SessionOutcome::Running,
        }
    }

    pub fn script(&self) -> &Path {
        &self.script
    }

    /// The retry budget this session runs under. The attempt history never
    /// exceeds `max_retries + 1` entries.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn attempts(&self) -> &[FixAttempt] {
        &self.attempts
    }

    pub fn outcome(&self) -> SessionOutcome {
        self.outcome
    }

    /// Signature of the most recent attempt's failure, for the
    /// ineffective-fix check.
    pub fn last_signature(&self) -> Option<Signature> {
        self.attempts.last().map(|a| a.record.signature())
    }

    pub fn push_attempt(&mut self, attempt: FixAttempt) {
        self.attempts.push(attempt);
    }

    /// Record the verification result on the most recent attempt.
    pub fn verify_last(&mut self, verification: Verification) {
        if let Some(attempt) = self.attempts.last_mut() {
            attempt.verification = Some(verification);
        }
    }

    /// Move the session to a terminal outcome. Rejects a second transition
    /// and rejects `Running` as a target.
    pub fn finalize(&mut self, outcome: SessionOutcome) -> Result<()> {
        if self.outcome != SessionOutcome::Running {
            return Err(anyhow!("session already finalized as {:?}", self.outcome));
        }
        if outcome == SessionOutcome::Running {
            return Err(anyhow!("cannot finalize a session as Running"));
        }
        self.outcome = outcome;
        Ok(())
    }
}
