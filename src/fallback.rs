//! Fallback strategy for failures no registered handler accepts.
//!
//! The default build ships [`NoFallback`]; the trait is the seam where an
//! external suggestion source (a human prompt, a model) can be plugged in
//! without touching the retry loop.

use anyhow::Result;

use crate::core::record::ErrorRecord;
use crate::handlers::FixProposal;

pub trait Fallback {
    /// Propose a fix for a failure the registry declined. `Ok(None)` means
    /// the fallback has nothing either and the session ends.
    fn propose(&self, record: &ErrorRecord, source: &str) -> Result<Option<FixProposal>>;
}

/// Fallback that never proposes anything.
pub struct NoFallback;

impl Fallback for NoFallback {
    fn propose(&self, _record: &ErrorRecord, _source: &str) -> Result<Option<FixProposal>> {
        Ok(None)
    }
}
