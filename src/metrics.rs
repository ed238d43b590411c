//! Session-level counters reported once per run.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::record::ErrorKind;
use crate::session::SessionOutcome;

/// Summary of one finished session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub outcome: SessionOutcome,
    pub attempts: usize,
    pub duration_ms: u64,
    /// Error kinds seen across the session, in first-seen order.
    pub kinds_seen: Vec<ErrorKind>,
}

pub trait MetricsSink {
    fn record(&self, event: &SessionEvent) -> Result<()>;
}

/// Sink that discards everything.
pub struct NullSink;

impl MetricsSink for NullSink {
    fn record(&self, _event: &SessionEvent) -> Result<()> {
        Ok(())
    }
}

/// Sink that reports through the tracing subscriber.
pub struct LogSink;

impl MetricsSink for LogSink {
    fn record(&self, event: &SessionEvent) -> Result<()> {
        let kinds: Vec<&str> = event.kinds_seen.iter().map(ErrorKind::as_str).collect();
        info!(
            outcome = ?event.outcome,
            attempts = event.attempts,
            duration_ms = event.duration_ms,
            kinds = ?kinds,
            "session finished"
        );
        Ok(())
    }
}

/// Record the event, swallowing sink errors. Metrics never fail a run.
pub fn emit(sink: &dyn MetricsSink, event: &SessionEvent) {
    if let Err(e) = sink.record(event) {
        warn!(err = %e, "metrics sink failed");
    }
}
