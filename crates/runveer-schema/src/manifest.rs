use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to write manifest '{path}': {reason}")]
    Write { path: String, reason: String },
}

/// Resolved external dependencies: sorted, de-duplicated package names,
/// persisted one per line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    packages: BTreeSet<String>,
}

impl Manifest {
    pub fn new<I, S>(packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            packages: packages
                .into_iter()
                .map(Into::into)
                .map(|p: String| p.trim().to_owned())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Parse the newline-delimited form. Blank lines and `#` comments are
    /// ignored.
    pub fn parse(content: &str) -> Self {
        Self::new(
            content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#')),
        )
    }

    pub fn read_from_file(path: &Path) -> Result<Self, ManifestError> {
        Ok(Self::parse(&fs::read_to_string(path)?))
    }

    /// Canonical text form: one package per line, sorted, trailing newline.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for p in &self.packages {
            out.push_str(p);
            out.push('\n');
        }
        out
    }

    /// Atomically replace `path` with the canonical text form.
    pub fn write_to_file(&self, path: &Path) -> Result<(), ManifestError> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(self.to_text().as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| ManifestError::Write {
            path: path.display().to_string(),
            reason: e.error.to_string(),
        })?;
        Ok(())
    }

    pub fn packages(&self) -> impl Iterator<Item = &str> {
        self.packages.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}
