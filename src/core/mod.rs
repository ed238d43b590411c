//! Deterministic, pure logic: failure classification and source editing.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod edit;
pub mod parser;
pub mod record;
