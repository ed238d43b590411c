//! Tool configuration loaded from a TOML file.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Retry-loop configuration (TOML).
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing fields default to sensible values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MendConfig {
    /// Maximum fix attempts before giving up.
    pub max_retries: u32,

    /// Per-run wall-clock budget for the target script, in seconds.
    pub exec_timeout_secs: u64,

    /// Wall-clock budget for one `pip install`, in seconds.
    pub install_timeout_secs: u64,

    /// Truncate captured stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Interpreter used to run the script (and pip).
    pub python: String,

    /// Allow fixes that install distributions with pip.
    pub allow_install: bool,
}

impl Default for MendConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            exec_timeout_secs: 10,
            install_timeout_secs: 120,
            output_limit_bytes: 100_000,
            python: "python3".to_string(),
            allow_install: false,
        }
    }
}

impl MendConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(anyhow!("max_retries must be > 0"));
        }
        if self.exec_timeout_secs == 0 {
            return Err(anyhow!("exec_timeout_secs must be > 0"));
        }
        if self.install_timeout_secs == 0 {
            return Err(anyhow!("install_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.python.trim().is_empty() {
            return Err(anyhow!("python must be a non-empty command"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `MendConfig::default()`.
pub fn load_config(path: &Path) -> Result<MendConfig> {
    if !path.exists() {
        let cfg = MendConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: MendConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, MendConfig::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("mend.toml");
        fs::write(&path, "max_retries = 5\npython = \"python3.12\"\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.max_retries, 5);
        assert_eq!(cfg.python, "python3.12");
        assert_eq!(cfg.exec_timeout_secs, MendConfig::default().exec_timeout_secs);
    }

    #[test]
    fn zero_retries_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("mend.toml");
        fs::write(&path, "max_retries = 0\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("max_retries"));
    }
}
