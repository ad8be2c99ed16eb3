//! Single-instance guard for runs that share one status file.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fd_lock::{RwLock, RwLockWriteGuard};
use tracing::debug;

use crate::error::DistupError;

/// Lock file guarding `status_flag_path`, e.g. `status.json.lock`.
pub fn lock_path(status_flag_path: &Path) -> PathBuf {
    let mut name = status_flag_path.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}

/// Exclusive advisory lock held for the whole of a run or revert.
///
/// The lock belongs to the open file, so it is released when the guard from
/// [`RunLock::acquire`] is dropped or the process exits, including on a
/// reboot.
pub struct RunLock {
    path: PathBuf,
    lock: RwLock<File>,
}

impl RunLock {
    pub fn open(status_flag_path: &Path) -> Result<Self> {
        let path = lock_path(status_flag_path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("Failed to open lock file {}", path.display()))?;
        Ok(Self {
            path,
            lock: RwLock::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take the lock without waiting. Fails with
    /// [`DistupError::AlreadyRunning`] while another process holds it.
    pub fn acquire(&mut self) -> Result<RwLockWriteGuard<'_, File>> {
        let mut guard = match self.lock.try_write() {
            Ok(guard) => guard,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                return Err(DistupError::AlreadyRunning(self.path.clone()).into());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to lock {}", self.path.display()));
            }
        };
        guard.set_len(0)?;
        writeln!(&mut *guard, "{}", std::process::id())?;
        debug!("Acquired run lock {}", self.path.display());
        Ok(guard)
    }
}
