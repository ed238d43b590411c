//! Transactional backup of the target script.
//!
//! Every fix attempt is bracketed by a [`BackupManager::snapshot`] call: the
//! handle remembers the pre-fix source and every file the fix created, and
//! either commits (the fix verified) or rolls back (the script and its
//! directory return to the snapshotted state). A dropped, uncommitted handle
//! rolls back on a best-effort basis so panics do not leave a broken script.

use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

/// Atomically replace a file's contents (temp file + rename).
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    // A bare file name has an empty parent; treat it as the current directory.
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("py.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

/// Guards the target script against concurrent edits within a session.
///
/// Only one snapshot may be outstanding at a time; a second call fails until
/// the first handle is committed or rolled back.
pub struct BackupManager {
    open: Rc<Cell<bool>>,
}

impl BackupManager {
    pub fn new() -> Self {
        Self {
            open: Rc::new(Cell::new(false)),
        }
    }

    /// Capture the script's current contents and open a transaction.
    #[instrument(skip_all, fields(script = %script.display()))]
    pub fn snapshot(&self, script: &Path) -> Result<BackupHandle> {
        if self.open.get() {
            return Err(anyhow!(
                "a backup of {} is already outstanding",
                script.display()
            ));
        }
        let original = fs::read_to_string(script)
            .with_context(|| format!("snapshot {}", script.display()))?;
        self.open.set(true);
        debug!(bytes = original.len(), "snapshot taken");
        Ok(BackupHandle {
            script: script.to_path_buf(),
            original,
            created_files: Vec::new(),
            open: Rc::clone(&self.open),
            armed: true,
        })
    }
}

impl Default for BackupManager {
    fn default() -> Self {
        Self::new()
    }
}

/// One open transaction over the target script.
#[derive(Debug)]
pub struct BackupHandle {
    script: PathBuf,
    original: String,
    created_files: Vec<PathBuf>,
    open: Rc<Cell<bool>>,
    armed: bool,
}

impl BackupHandle {
    /// Register a file created while the transaction is open. Rollback
    /// deletes it.
    pub fn record_created(&mut self, path: PathBuf) {
        self.created_files.push(path);
    }

    /// The fix verified; the new state of the script becomes permanent.
    pub fn commit(mut self) {
        self.armed = false;
        self.open.set(false);
        debug!(script = %self.script.display(), "backup committed");
    }

    /// Restore the snapshotted source and remove any files created since.
    #[instrument(skip_all, fields(script = %self.script.display()))]
    pub fn rollback(mut self) -> Result<()> {
        self.armed = false;
        self.open.set(false);
        self.restore()
    }

    fn restore(&self) -> Result<()> {
        write_atomic(&self.script, &self.original)
            .with_context(|| format!("restore {}", self.script.display()))?;
        for path in &self.created_files {
            match fs::remove_file(path) {
                Ok(()) => debug!(path = %path.display(), "removed created file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e).with_context(|| format!("remove {}", path.display()));
                }
            }
        }
        debug!("rollback complete");
        Ok(())
    }
}

impl Drop for BackupHandle {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        // Unwinding past an open transaction. Restore what we can.
        self.open.set(false);
        if let Err(e) = self.restore() {
            warn!(err = %e, script = %self.script.display(), "rollback on drop failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rollback_restores_original_contents() {
        let temp = tempfile::tempdir().expect("tempdir");
        let script = temp.path().join("app.py");
        fs::write(&script, "print('v1')\n").expect("write");

        let manager = BackupManager::new();
        let handle = manager.snapshot(&script).expect("snapshot");
        fs::write(&script, "print('v2')\n").expect("overwrite");
        handle.rollback().expect("rollback");

        assert_eq!(fs::read_to_string(&script).expect("read"), "print('v1')\n");
    }

    #[test]
    fn write_atomic_accepts_a_bare_file_name() {
        // Relative invocations from the script's own directory have no
        // parent component.
        let path = Path::new("bare_name_fixture.py");
        write_atomic(path, "print('ok')\n").expect("write");
        assert_eq!(fs::read_to_string(path).expect("read"), "print('ok')\n");
        fs::remove_file(path).expect("cleanup");
    }

    #[test]
    fn rollback_removes_created_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let script = temp.path().join("app.py");
        fs::write(&script, "import helper\n").expect("write");
        let stub = temp.path().join("helper.py");

        let manager = BackupManager::new();
        let mut handle = manager.snapshot(&script).expect("snapshot");
        fs::write(&stub, "def placeholder_function():\n    return None\n").expect("stub");
        handle.record_created(stub.clone());
        handle.rollback().expect("rollback");

        assert!(!stub.exists());
    }

    #[test]
    fn commit_keeps_changes() {
        let temp = tempfile::tempdir().expect("tempdir");
        let script = temp.path().join("app.py");
        fs::write(&script, "print('v1')\n").expect("write");

        let manager = BackupManager::new();
        let handle = manager.snapshot(&script).expect("snapshot");
        write_atomic(&script, "print('v2')\n").expect("apply");
        handle.commit();

        assert_eq!(fs::read_to_string(&script).expect("read"), "print('v2')\n");
    }

    #[test]
    fn second_snapshot_is_rejected_while_open() {
        let temp = tempfile::tempdir().expect("tempdir");
        let script = temp.path().join("app.py");
        fs::write(&script, "pass\n").expect("write");

        let manager = BackupManager::new();
        let handle = manager.snapshot(&script).expect("snapshot");
        let err = manager.snapshot(&script).unwrap_err();
        assert!(err.to_string().contains("already outstanding"));
        handle.commit();
        manager.snapshot(&script).expect("snapshot after commit");
    }

    #[test]
    fn drop_without_commit_restores() {
        let temp = tempfile::tempdir().expect("tempdir");
        let script = temp.path().join("app.py");
        fs::write(&script, "print('v1')\n").expect("write");

        let manager = BackupManager::new();
        {
            let _handle = manager.snapshot(&script).expect("snapshot");
            fs::write(&script, "print('broken')\n").expect("overwrite");
        }

        assert_eq!(fs::read_to_string(&script).expect("read"), "print('v1')\n");
    }
}
