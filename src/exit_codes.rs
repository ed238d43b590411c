//! Stable exit codes for mend CLI commands.

/// The script succeeded, with or without fixes.
pub const OK: i32 = 0;
/// Invalid usage, bad config, or an internal error.
pub const INVALID: i32 = 1;
/// The retry budget ran out before the script succeeded.
pub const EXHAUSTED: i32 = 2;
/// The session stopped on a fatal condition (no handler, repeated failure,
/// timeout, write failure).
pub const FATAL: i32 = 3;
