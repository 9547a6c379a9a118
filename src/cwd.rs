//! Scoped working-directory changes.
//!
//! The process-wide current directory is mutated only through [`CwdGuard`];
//! the captured directory is restored on drop along every exit path, and
//! nested guards unwind in LIFO order.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug)]
pub struct CwdGuard {
    old: PathBuf,
    cwd: PathBuf,
}

impl CwdGuard {
    /// Capture the current directory without changing it.
    pub fn capture() -> Result<Self> {
        let old = std::env::current_dir()
            .map_err(|e| Error::io("read current directory", PathBuf::new(), e))?;
        Ok(CwdGuard {
            cwd: old.clone(),
            old,
        })
    }

    /// Capture the current directory and change into `dir`.
    pub fn change(dir: &Path) -> Result<Self> {
        let mut guard = Self::capture()?;
        if dir.as_os_str().is_empty() {
            return Ok(guard);
        }
        std::env::set_current_dir(dir).map_err(|e| Error::io("change directory to", dir, e))?;
        // Re-read so `cwd` is absolute even when `dir` was relative.
        guard.cwd = std::env::current_dir()
            .map_err(|e| Error::io("read current directory", PathBuf::new(), e))?;
        Ok(guard)
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }
}

impl Drop for CwdGuard {
    fn drop(&mut self) {
        let _ = std::env::set_current_dir(&self.old);
    }
}
