//! The bounded execute/classify/fix/verify loop.
//!
//! One [`run_session`] call drives a script from its first execution to a
//! terminal [`SessionOutcome`]. Every fix application is bracketed by a
//! backup transaction; a fix survives only if the rerun exits zero.

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::parser;
use crate::core::record::{ErrorKind, ErrorRecord, RawFailure, Signature};
use crate::fallback::Fallback;
use crate::handlers::{Capability, FixProposal, HandlerRegistry, SideEffect};
use crate::io::backup::{BackupHandle, BackupManager, write_atomic};
use crate::io::config::MendConfig;
use crate::io::installer::Installer;
use crate::io::sandbox::{ExecStatus, Sandbox};
use crate::metrics::{MetricsSink, SessionEvent, emit};
use crate::session::{FatalReason, FixAttempt, Session, SessionOutcome, Verification};

/// Loop state. `Finished` is the only exit.
enum State {
    Run,
    Failed(RawFailure),
    Fix(ErrorRecord),
    Verify {
        signature: Signature,
        handle: BackupHandle,
    },
    Finished(SessionOutcome),
}

/// What to do after a fix was applied and the rerun still failed.
#[derive(Debug, PartialEq, Eq)]
enum VerifyFailureDecision {
    FatalRepeat,
    Exhausted,
    Retry,
}

fn decide_after_verify_failure(
    before: &Signature,
    observed: &Signature,
    attempts: usize,
    max_retries: u32,
) -> VerifyFailureDecision {
    if observed == before {
        VerifyFailureDecision::FatalRepeat
    } else if attempts >= max_retries as usize {
        VerifyFailureDecision::Exhausted
    } else {
        VerifyFailureDecision::Retry
    }
}

/// Drive one script to a terminal outcome.
///
/// The sandbox, installer and fallback are trait objects the caller supplies;
/// tests pass scripted doubles. The returned session carries the full attempt
/// history and the final outcome.
#[instrument(skip_all, fields(script = %script.display(), max_retries = cfg.max_retries))]
pub fn run_session<S: Sandbox, I: Installer, F: Fallback>(
    script: &Path,
    sandbox: &S,
    installer: &I,
    fallback: &F,
    registry: &HandlerRegistry,
    metrics: &dyn MetricsSink,
    cfg: &MendConfig,
) -> Result<Session> {
    let started = Instant::now();
    let timeout = Duration::from_secs(cfg.exec_timeout_secs);
    let backup = BackupManager::new();
    let mut session = Session::new(script, cfg.max_retries);
    let mut kinds_seen: Vec<ErrorKind> = Vec::new();

    let mut state = State::Run;
    let final_outcome = loop {
        state = match state {
            State::Run => {
                let result = sandbox.run(script, timeout)?;
                match result.status {
                    ExecStatus::Success => {
                        info!("script succeeded on first run");
                        State::Finished(SessionOutcome::Success)
                    }
                    ExecStatus::TimedOut => {
                        State::Finished(SessionOutcome::Fatal(FatalReason::Timeout))
                    }
                    ExecStatus::Failed(raw) => State::Failed(raw),
                }
            }
            State::Failed(raw) => {
                let record = classify(&raw, script);
                note_kind(&mut kinds_seen, record.kind);
                debug!(kind = %record.kind, line = ?record.line, "failure classified");
                State::Fix(record)
            }
            State::Fix(record) => {
                let source = fs::read_to_string(script)
                    .with_context(|| format!("read {}", script.display()))?;
                match select_proposal(registry, fallback, &mut session, &record, &source)? {
                    None => {
                        warn!(kind = %record.kind, "no fix available");
                        State::Finished(SessionOutcome::Fatal(FatalReason::NoHandler))
                    }
                    Some(proposal) => {
                        let mut handle = backup.snapshot(script)?;
                        let signature = record.signature();
                        if let Err(e) =
                            apply_side_effects(&proposal, script, installer, &mut handle)
                        {
                            warn!(err = %e, "could not apply side effects");
                            handle.rollback()?;
                            session.push_attempt(FixAttempt::new(
                                record,
                                proposal.handler_id,
                                proposal.description,
                                proposal.confidence,
                                false,
                            ));
                            State::Finished(SessionOutcome::Fatal(FatalReason::WriteFailure))
                        } else {
                            match write_atomic(script, &proposal.new_source_text) {
                                Ok(()) => {
                                    info!(
                                        handler = proposal.handler_id,
                                        fix = %proposal.description,
                                        "fix applied"
                                    );
                                    session.push_attempt(FixAttempt::new(
                                        record,
                                        proposal.handler_id,
                                        proposal.description,
                                        proposal.confidence,
                                        true,
                                    ));
                                    State::Verify { signature, handle }
                                }
                                Err(e) => {
                                    warn!(err = %e, "could not write fixed source");
                                    handle.rollback()?;
                                    session.push_attempt(FixAttempt::new(
                                        record,
                                        proposal.handler_id,
                                        proposal.description,
                                        proposal.confidence,
                                        false,
                                    ));
                                    State::Finished(SessionOutcome::Fatal(
                                        FatalReason::WriteFailure,
                                    ))
                                }
                            }
                        }
                    }
                }
            }
            State::Verify { signature, handle } => {
                let result = sandbox.run(script, timeout)?;
                match result.status {
                    ExecStatus::Success => {
                        info!("fix verified");
                        session.verify_last(Verification::Success);
                        handle.commit();
                        State::Finished(SessionOutcome::Success)
                    }
                    ExecStatus::TimedOut => {
                        warn!("fixed script timed out, rolling back");
                        session.verify_last(Verification::DifferentError);
                        handle.rollback()?;
                        State::Finished(SessionOutcome::Fatal(FatalReason::Timeout))
                    }
                    ExecStatus::Failed(raw) => {
                        let observed = classify(&raw, script);
                        note_kind(&mut kinds_seen, observed.kind);
                        let decision = decide_after_verify_failure(
                            &signature,
                            &observed.signature(),
                            session.attempts().len(),
                            cfg.max_retries,
                        );
                        session.verify_last(if decision == VerifyFailureDecision::FatalRepeat {
                            Verification::StillFailing
                        } else {
                            Verification::DifferentError
                        });
                        handle.rollback()?;
                        match decision {
                            VerifyFailureDecision::FatalRepeat => {
                                warn!(kind = %observed.kind, "fix reproduced the same failure");
                                State::Finished(SessionOutcome::Fatal(
                                    FatalReason::FixIneffectiveRepeat,
                                ))
                            }
                            VerifyFailureDecision::Exhausted => {
                                warn!(attempts = session.attempts().len(), "retries exhausted");
                                State::Finished(SessionOutcome::Exhausted)
                            }
                            VerifyFailureDecision::Retry => State::Fix(observed),
                        }
                    }
                }
            }
            State::Finished(outcome) => break outcome,
        };
    };

    session.finalize(final_outcome)?;
    emit(
        metrics,
        &SessionEvent {
            outcome: session.outcome(),
            attempts: session.attempts().len(),
            duration_ms: started.elapsed().as_millis() as u64,
            kinds_seen,
        },
    );
    Ok(session)
}

/// Dry-run report: what the first fix attempt would do.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AnalysisReport {
    pub record: Option<ErrorRecord>,
    pub handler_id: Option<String>,
    pub description: Option<String>,
    pub would_auto_fix: bool,
}

/// Execute once, classify, and report which handler would fire. Mutates
/// nothing.
#[instrument(skip_all, fields(script = %script.display()))]
pub fn analyze<S: Sandbox>(
    script: &Path,
    sandbox: &S,
    registry: &HandlerRegistry,
    cfg: &MendConfig,
) -> Result<AnalysisReport> {
    let timeout = Duration::from_secs(cfg.exec_timeout_secs);
    let result = sandbox.run(script, timeout)?;
    let raw = match result.status {
        ExecStatus::Success => {
            return Ok(AnalysisReport {
                record: None,
                handler_id: None,
                description: None,
                would_auto_fix: false,
            });
        }
        ExecStatus::TimedOut => {
            return Ok(AnalysisReport {
                record: None,
                handler_id: None,
                description: Some("script timed out".to_string()),
                would_auto_fix: false,
            });
        }
        ExecStatus::Failed(raw) => raw,
    };

    let record = classify(&raw, script);
    let source =
        fs::read_to_string(script).with_context(|| format!("read {}", script.display()))?;
    for handler in registry.candidates(record.kind) {
        if !handler.can_handle(&record, &source) {
            continue;
        }
        match handler.propose_fix(&record, &source) {
            Ok(proposal) => {
                let auto = handler.descriptor().capability == Capability::AutoFix;
                return Ok(AnalysisReport {
                    record: Some(record),
                    handler_id: Some(proposal.handler_id.to_string()),
                    description: Some(proposal.description),
                    would_auto_fix: auto,
                });
            }
            Err(unsupported) => {
                debug!(handler = handler.id(), reason = %unsupported, "handler declined");
            }
        }
    }
    Ok(AnalysisReport {
        record: Some(record),
        handler_id: None,
        description: None,
        would_auto_fix: false,
    })
}

/// Parse the failure, degrading to an `Unknown` record when the output has
/// no usable traceback.
fn classify(raw: &RawFailure, script: &Path) -> ErrorRecord {
    match parser::parse(raw, script) {
        Ok(record) => record,
        Err(e) => {
            debug!(err = %e, "classification fell back to Unknown");
            let message = raw
                .stderr
                .lines()
                .rev()
                .find(|line| !line.trim().is_empty())
                .unwrap_or("process failed without output")
                .to_string();
            ErrorRecord {
                kind: ErrorKind::Unknown,
                message,
                line: None,
                column: None,
                extracted_symbols: Vec::new(),
                confidence: 0.0,
            }
        }
    }
}

fn note_kind(kinds_seen: &mut Vec<ErrorKind>, kind: ErrorKind) {
    if !kinds_seen.contains(&kind) {
        kinds_seen.push(kind);
    }
}

/// Walk the candidates for the record's kind and return the first concrete
/// proposal. Suggest-only proposals are recorded unapplied and escalate to
/// the fallback, as does a kind with no willing handler. Recorded
/// suggestions count toward the retry budget like any other attempt, so
/// the attempt history stays within `max_retries + 1` entries.
fn select_proposal<F: Fallback>(
    registry: &HandlerRegistry,
    fallback: &F,
    session: &mut Session,
    record: &ErrorRecord,
    source: &str,
) -> Result<Option<FixProposal>> {
    for handler in registry.candidates(record.kind) {
        if !handler.can_handle(record, source) {
            continue;
        }
        match handler.propose_fix(record, source) {
            Ok(proposal) => {
                if handler.descriptor().capability == Capability::AutoFix {
                    return Ok(Some(proposal));
                }
                info!(
                    handler = proposal.handler_id,
                    suggestion = %proposal.description,
                    "suggestion recorded, escalating"
                );
                session.push_attempt(FixAttempt::new(
                    record.clone(),
                    proposal.handler_id,
                    proposal.description,
                    proposal.confidence,
                    false,
                ));
                break;
            }
            Err(unsupported) => {
                debug!(handler = handler.id(), reason = %unsupported, "handler declined");
            }
        }
    }
    fallback.propose(record, source)
}

/// Apply a proposal's declarative side effects inside the open transaction.
/// Companion paths resolve against the script's directory; files created here
/// are recorded on the handle so rollback removes them.
fn apply_side_effects<I: Installer>(
    proposal: &FixProposal,
    script: &Path,
    installer: &I,
    handle: &mut BackupHandle,
) -> Result<()> {
    let base = script
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    for effect in &proposal.side_effects {
        match effect {
            SideEffect::InstallPackage(package) => {
                if !installer.install(package)? {
                    warn!(package, "install failed, verification will decide");
                }
            }
            SideEffect::WriteCompanionFile { path, contents } => {
                let target = if path.is_absolute() {
                    path.clone()
                } else {
                    base.join(path)
                };
                if target.exists() {
                    debug!(path = %target.display(), "companion file exists, leaving it");
                    continue;
                }
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)
                        .with_context(|| format!("create directory {}", parent.display()))?;
                }
                fs::write(&target, contents)
                    .with_context(|| format!("write companion file {}", target.display()))?;
                debug!(path = %target.display(), "companion file created");
                handle.record_created(target);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signature(kind: ErrorKind, message: &str, line: Option<u32>) -> Signature {
        Signature {
            kind,
            message: message.to_string(),
            line,
        }
    }

    #[test]
    fn identical_signature_is_fatal_before_exhaustion() {
        let before = signature(ErrorKind::NameError, "name 'x' is not defined", Some(3));
        let decision = decide_after_verify_failure(&before, &before, 5, 3);
        assert_eq!(decision, VerifyFailureDecision::FatalRepeat);
    }

    #[test]
    fn different_signature_within_budget_retries() {
        let before = signature(ErrorKind::NameError, "name 'x' is not defined", Some(3));
        let observed = signature(ErrorKind::TypeError, "unsupported operand", Some(4));
        assert_eq!(
            decide_after_verify_failure(&before, &observed, 1, 3),
            VerifyFailureDecision::Retry
        );
    }

    #[test]
    fn different_signature_at_budget_exhausts() {
        let before = signature(ErrorKind::NameError, "name 'x' is not defined", Some(3));
        let observed = signature(ErrorKind::TypeError, "unsupported operand", Some(4));
        assert_eq!(
            decide_after_verify_failure(&before, &observed, 3, 3),
            VerifyFailureDecision::Exhausted
        );
    }

    #[test]
    fn same_message_on_new_line_counts_as_progress() {
        let before = signature(ErrorKind::SyntaxError, "invalid syntax", Some(2));
        let observed = signature(ErrorKind::SyntaxError, "invalid syntax", Some(7));
        assert_eq!(
            decide_after_verify_failure(&before, &observed, 1, 3),
            VerifyFailureDecision::Retry
        );
    }

    #[test]
    fn classify_degrades_to_unknown_on_garbage() {
        let raw = RawFailure {
            stderr: "Segmentation fault (core dumped)\n".to_string(),
            exit_code: Some(139),
        };
        let record = classify(&raw, Path::new("/tmp/app.py"));
        assert_eq!(record.kind, ErrorKind::Unknown);
        assert_eq!(record.message, "Segmentation fault (core dumped)");
        assert_eq!(record.confidence, 0.0);
    }
}
