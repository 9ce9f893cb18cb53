use runveer_store::{EnvBackend, EnvLayout, StoreError};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// Backend that lays out placeholder executables without invoking Python.
#[derive(Default)]
pub struct MockBackend {
    created: Mutex<Vec<PathBuf>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Roots created so far, in order.
    pub fn created(&self) -> Vec<PathBuf> {
        self.created.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl EnvBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn create(&self, root: &Path) -> Result<(), StoreError> {
        let layout = EnvLayout::new(root);
        std::fs::create_dir_all(layout.bin_dir())?;
        std::fs::write(layout.interpreter(), "mock-python\n")?;
        std::fs::write(layout.installer(), "mock-pip\n")?;
        let mut created = self.created.lock().map_err(|e| StoreError::CreationFailed {
            name: root.display().to_string(),
            reason: format!("mutex poisoned: {e}"),
        })?;
        created.push(root.to_path_buf());
        Ok(())
    }

    fn probe(&self, interpreter: &Path, _timeout: Duration) -> bool {
        interpreter.is_file()
    }
}
