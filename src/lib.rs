//! Self-healing Python script runner.
//!
//! Executes a target script in a sandboxed child process; when it fails,
//! classifies the traceback into a closed error taxonomy, picks a fix
//! strategy, rewrites the source, and reruns, all under a bounded retry
//! budget with transactional rollback. The architecture enforces a strict
//! separation:
//!
//! - **[`core`]**: Pure, deterministic logic (traceback parsing, source
//!   edits). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (process execution, backups, pip).
//!   Isolated behind traits to enable scripted doubles in tests.
//!
//! [`orchestrator`] coordinates core logic with I/O to implement the
//! execute/classify/fix/verify loop; [`handlers`] hold the fix strategies.

pub mod core;
pub mod exit_codes;
pub mod fallback;
pub mod handlers;
pub mod io;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
