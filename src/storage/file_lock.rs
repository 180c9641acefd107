//! Exclusive lock on the data directory.
//!
//! A single running agent owns a data directory: concurrent runs would race
//! on the final snapshot write.

use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::StorageError;

const LOCK_FILE: &str = ".lock";

/// Held for the life of the run; released when dropped.
#[derive(Debug)]
pub struct DataDirLock {
    _file: File,
    path: PathBuf,
}

impl DataDirLock {
    /// Creates `dir` if needed and takes a non-blocking exclusive lock on
    /// `<dir>/.lock`.
    ///
    /// # Errors
    /// - `StorageError::Locked` if another process holds the lock
    /// - `StorageError::Io` if the directory or lock file cannot be opened
    pub fn acquire(dir: &Path) -> Result<Self, StorageError> {
        fs::create_dir_all(dir).map_err(|e| StorageError::io(dir, e))?;
        let path = dir.join(LOCK_FILE);

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| StorageError::io(&path, e))?;

        match try_lock(&file) {
            Ok(()) => Ok(Self { _file: file, path }),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Err(StorageError::Locked { path }),
            Err(e) => Err(StorageError::io(path, e)),
        }
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(unix)]
fn try_lock(file: &File) -> std::io::Result<()> {
    use std::os::unix::io::AsRawFd;

    // SAFETY: the descriptor is owned by `file` and open.
    let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if result != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
            return Err(std::io::Error::new(ErrorKind::WouldBlock, "data directory is locked"));
        }
        return Err(err);
    }
    Ok(())
}

#[cfg(not(unix))]
fn try_lock(_file: &File) -> std::io::Result<()> {
    Err(std::io::Error::new(
        ErrorKind::Unsupported,
        "file locking not supported on this platform",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn lock_is_released_on_drop() {
        let dir = tempdir().unwrap();
        {
            let lock = DataDirLock::acquire(dir.path()).unwrap();
            assert!(lock.path().exists());
        }
        assert!(DataDirLock::acquire(dir.path()).is_ok());
    }

    #[test]
    fn second_acquire_reports_locked() {
        let dir = tempdir().unwrap();
        let _held = DataDirLock::acquire(dir.path()).unwrap();

        let err = DataDirLock::acquire(dir.path()).unwrap_err();
        assert!(matches!(err, StorageError::Locked { .. }));
    }

    #[test]
    fn creates_missing_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("fresh");
        let _lock = DataDirLock::acquire(&nested).unwrap();
        assert!(nested.join(".lock").exists());
    }
}
