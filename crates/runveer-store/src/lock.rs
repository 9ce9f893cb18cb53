use crate::StoreError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Exclusive advisory lock on an environment's sentinel file.
///
/// Only ever acquired non-blockingly: contention is a signal to repair or
/// relocate, never something to wait on. Released on drop.
pub struct EnvLock {
    lock_file: File,
    path: PathBuf,
}

impl EnvLock {
    /// `Ok(None)` when another open file description holds the lock.
    pub fn try_acquire(lock_path: &Path) -> Result<Option<Self>, StoreError> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(lock_path)?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self {
                lock_file: file,
                path: lock_path.to_path_buf(),
            })),
            Err(_) => Ok(None),
        }
    }

    /// Unlock and remove the sentinel so it is absent between runs.
    pub fn release(self) {
        let _ = self.lock_file.unlock();
        let _ = std::fs::remove_file(&self.path);
    }
}

impl Drop for EnvLock {
    fn drop(&mut self) {
        let _ = self.lock_file.unlock();
    }
}
