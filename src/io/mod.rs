//! Side-effecting boundary: process spawning, the filesystem, pip.

pub mod backup;
pub mod config;
pub mod installer;
pub mod process;
pub mod sandbox;
