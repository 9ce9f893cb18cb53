//! Orchestration for runveer.
//!
//! This crate ties the import analysis, environment store, and process
//! runtime together into the `Runner` pipeline: profile a script, resolve and
//! write its manifest, fingerprint the project, obtain a ready environment,
//! install into it, and hand the script to the `ExecutionSupervisor`. It also
//! owns the project configuration, the presentation traits the binary
//! implements, script discovery, and Ctrl-C handling.

pub mod config;
pub mod discovery;
pub mod report;
pub mod runner;
pub mod signal;
pub mod supervisor;

pub use config::{AutoFix, ConfigError, Overrides, RunnerConfig, Timeouts, CONFIG_FILE};
pub use discovery::{describe_scripts, discover_scripts};
pub use report::{MenuPresenter, ScriptEntry, Status, StatusReporter};
pub use runner::{CleanReport, Runner, SetupReport};
pub use signal::{install_signal_handler, take_interrupt};
pub use supervisor::{missing_module, ExecutionSupervisor, RunOutcome, RunTarget};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Analysis(#[from] runveer_schema::AnalysisError),
    #[error("manifest error: {0}")]
    Manifest(#[from] runveer_schema::ManifestError),
    #[error("store error: {0}")]
    Store(#[from] runveer_store::StoreError),
    #[error("runtime error: {0}")]
    Runtime(#[from] runveer_runtime::RuntimeError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("script not found: {}", .0.display())]
    ScriptNotFound(PathBuf),
    #[error("no scripts found in {}", .0.display())]
    NoScripts(PathBuf),
    #[error("script '{script}' failed: {reason}")]
    ScriptFailed {
        script: String,
        reason: String,
        stderr: String,
    },
    #[error("port {0} is already in use")]
    PortInUse(u16),
}
