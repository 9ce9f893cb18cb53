use crate::StoreError;
use std::io;
use std::path::Path;
use std::time::Duration;

/// Platform facility that materialises and probes environments.
///
/// The filesystem and identity hooks have working defaults; backends only
/// override them to observe or simulate failures.
pub trait EnvBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Create a self-contained environment at `root`, copying the
    /// interpreter rather than symlinking it.
    fn create(&self, root: &Path) -> Result<(), StoreError>;

    /// Whether `interpreter` answers a version query successfully within
    /// `timeout`.
    fn probe(&self, interpreter: &Path, timeout: Duration) -> bool;

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_dir_all(path)
    }

    /// Filesystem owner of `path`; `None` where ownership is not tracked.
    fn owner_uid(&self, path: &Path) -> io::Result<Option<u32>> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            Ok(Some(std::fs::metadata(path)?.uid()))
        }
        #[cfg(not(unix))]
        {
            let _ = path;
            Ok(None)
        }
    }

    /// Effective user of this process; `None` where ownership is not tracked.
    fn current_uid(&self) -> Option<u32> {
        effective_uid()
    }
}

/// Safe wrapper around libc::geteuid().
#[cfg(unix)]
#[allow(unsafe_code)]
pub(crate) fn effective_uid() -> Option<u32> {
    // SAFETY: geteuid() takes no arguments, has no side effects and cannot fail.
    Some(unsafe { libc::geteuid() })
}

#[cfg(not(unix))]
pub(crate) fn effective_uid() -> Option<u32> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Plain;

    impl EnvBackend for Plain {
        fn name(&self) -> &str {
            "plain"
        }
        fn create(&self, root: &Path) -> Result<(), StoreError> {
            std::fs::create_dir_all(root)?;
            Ok(())
        }
        fn probe(&self, _interpreter: &Path, _timeout: Duration) -> bool {
            true
        }
    }

    #[test]
    #[cfg(unix)]
    fn default_owner_matches_current_user_for_new_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let b = Plain;
        assert_eq!(b.owner_uid(dir.path()).unwrap(), b.current_uid());
    }

    #[test]
    fn default_removal_hooks_touch_the_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("env");
        let b = Plain;
        b.create(&root).unwrap();
        std::fs::write(root.join("f"), "x").unwrap();
        b.remove_file(&root.join("f")).unwrap();
        b.remove_dir_all(&root).unwrap();
        assert!(!root.exists());
        assert_eq!(b.name(), "plain");
    }

    #[test]
    fn owner_of_missing_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let b = Plain;
        if cfg!(unix) {
            assert!(b.owner_uid(&dir.path().join("missing")).is_err());
        }
    }
}
