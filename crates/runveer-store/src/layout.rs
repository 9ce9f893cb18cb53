use crate::StoreError;
use runveer_schema::Fingerprint;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Fingerprint stamp written into an environment at creation.
pub const FINGERPRINT_FILE: &str = ".project_fingerprint";
/// Transient advisory-lock sentinel.
pub const LOCK_FILE: &str = ".lock";

/// Directory layout of one environment.
///
/// Executables live in `bin/` on unix and `Scripts\` on Windows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvLayout {
    root: PathBuf,
}

impl EnvLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn fingerprint_file(&self) -> PathBuf {
        self.root.join(FINGERPRINT_FILE)
    }

    #[inline]
    pub fn lock_file(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    #[inline]
    pub fn bin_dir(&self) -> PathBuf {
        if cfg!(windows) {
            self.root.join("Scripts")
        } else {
            self.root.join("bin")
        }
    }

    /// Path of an executable installed into the environment.
    pub fn executable(&self, name: &str) -> PathBuf {
        if cfg!(windows) {
            self.bin_dir().join(format!("{name}.exe"))
        } else {
            self.bin_dir().join(name)
        }
    }

    #[inline]
    pub fn interpreter(&self) -> PathBuf {
        self.executable("python")
    }

    #[inline]
    pub fn installer(&self) -> PathBuf {
        self.executable("pip")
    }

    /// The stamped fingerprint, or `None` when absent or unreadable.
    pub fn read_fingerprint(&self) -> Option<Fingerprint> {
        let content = fs::read_to_string(self.fingerprint_file()).ok()?;
        let trimmed = content.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Fingerprint::new(trimmed))
        }
    }

    /// Atomically stamp `fingerprint` into the environment.
    pub fn stamp(&self, fingerprint: &Fingerprint) -> Result<(), StoreError> {
        let mut tmp = NamedTempFile::new_in(&self.root)?;
        tmp.write_all(fingerprint.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.fingerprint_file())
            .map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }
}
