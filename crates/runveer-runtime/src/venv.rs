use crate::process::run_captured;
use runveer_store::{EnvBackend, StoreError};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::{debug, warn};

// Interpreters older than 3.10 print nothing and the caller falls back to the
// bundled list.
const STDLIB_QUERY: &str =
    "import sys; print('\\n'.join(sorted(getattr(sys, 'stdlib_module_names', ()))))";

/// Creates environments with `<interpreter> -m venv <root> --copies`.
pub struct VenvBackend {
    interpreter: PathBuf,
}

impl VenvBackend {
    pub fn new(interpreter: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }

    pub fn interpreter(&self) -> &Path {
        &self.interpreter
    }
}

impl EnvBackend for VenvBackend {
    fn name(&self) -> &'static str {
        "venv"
    }

    fn create(&self, root: &Path) -> Result<(), StoreError> {
        let name = root.display().to_string();
        let mut cmd = Command::new(&self.interpreter);
        cmd.args(["-m", "venv"]).arg(root).arg("--copies");

        let out = run_captured(&mut cmd, None).map_err(|e| StoreError::CreationFailed {
            name: name.clone(),
            reason: e.to_string(),
        })?;
        if out.success() {
            return Ok(());
        }
        let reason = match out.stderr.trim() {
            "" => format!("venv exited with {:?}", out.code),
            stderr => stderr.to_owned(),
        };
        warn!("venv creation failed for {name}: {reason}");
        Err(StoreError::CreationFailed { name, reason })
    }

    fn probe(&self, interpreter: &Path, timeout: Duration) -> bool {
        match run_captured(Command::new(interpreter).arg("--version"), Some(timeout)) {
            Ok(out) => out.success(),
            Err(e) => {
                debug!("probe of {} failed: {e}", interpreter.display());
                false
            }
        }
    }
}

/// Standard-library module names reported by `interpreter`, or `None` when it
/// cannot be queried.
pub fn query_stdlib(interpreter: &Path, timeout: Duration) -> Option<Vec<String>> {
    let mut cmd = Command::new(interpreter);
    cmd.args(["-c", STDLIB_QUERY]);
    let out = match run_captured(&mut cmd, Some(timeout)) {
        Ok(out) if out.success() => out,
        Ok(out) => {
            debug!("stdlib query exited with {:?}", out.code);
            return None;
        }
        Err(e) => {
            debug!("stdlib query failed: {e}");
            return None;
        }
    };
    let names: Vec<String> = out
        .stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_owned)
        .collect();
    if names.is_empty() {
        None
    } else {
        Some(names)
    }
}
