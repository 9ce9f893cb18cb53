//! Process-level plumbing for runveer environments.
//!
//! This crate implements everything that shells out: a timeout-bounded
//! subprocess helper with captured, tee'd, or inherited streams, the `venv`
//! creation backend behind the store's `EnvBackend` trait, the package
//! installer driver with its bulk-then-per-package fallback, and the
//! privileged-port probe used before elevated runs.

pub mod installer;
pub mod mock;
pub mod privilege;
pub mod process;
pub mod venv;

pub use installer::{InstallEvent, InstallOutcome, InstallTimeouts, Installer, PackageFailure};
pub use mock::MockBackend;
pub use privilege::{elevated_command, port_in_use};
pub use process::{run_captured, run_with, ProcessOutput, StreamMode};
pub use venv::{query_stdlib, VenvBackend};

use runveer_store::EnvBackend;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("'{program}' timed out after {secs}s")]
    Timeout { program: String, secs: u64 },
    #[error("backend '{0}' is not available on this system")]
    BackendUnavailable(String),
    #[error("execution failed: {0}")]
    ExecFailed(String),
    #[error(transparent)]
    Manifest(#[from] runveer_schema::ManifestError),
}

pub fn select_backend(name: &str, interpreter: &Path) -> Result<Box<dyn EnvBackend>, RuntimeError> {
    match name {
        "venv" => Ok(Box::new(VenvBackend::new(interpreter))),
        "mock" => Ok(Box::new(MockBackend::new())),
        other => Err(RuntimeError::BackendUnavailable(other.to_owned())),
    }
}
