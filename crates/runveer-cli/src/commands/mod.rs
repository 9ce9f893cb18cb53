pub mod clean;
pub mod completions;
pub mod fingerprint;
pub mod list;
pub mod resolve;
pub mod run;
pub mod setup;

use runveer_core::{CoreError, Runner, RunnerConfig, StatusReporter};
use runveer_runtime::RuntimeError;
use std::path::PathBuf;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_STORE_ERROR: u8 = 3;
pub const EXIT_SCRIPT_FAILED: u8 = 4;
pub const EXIT_INTERRUPTED: u8 = 130;

/// Everything a command needs besides the presentation seams.
pub struct Context {
    pub project_dir: PathBuf,
    pub config: RunnerConfig,
    pub json: bool,
}

impl Context {
    pub fn runner<'a>(&'a self, reporter: &'a dyn StatusReporter) -> Result<Runner<'a>, CliError> {
        Ok(Runner::new(&self.project_dir, &self.config, reporter)?)
    }
}

/// A failed command: the message for stderr and the process exit code.
#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
}

impl CliError {
    pub fn new(code: u8, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(e: CoreError) -> Self {
        Self::new(exit_code_for(&e), e.to_string())
    }
}

pub fn exit_code_for(e: &CoreError) -> u8 {
    match e {
        CoreError::Config(_) => EXIT_CONFIG_ERROR,
        CoreError::Store(_) | CoreError::Runtime(RuntimeError::BackendUnavailable(_)) => {
            EXIT_STORE_ERROR
        }
        CoreError::ScriptFailed { .. } | CoreError::PortInUse(_) => EXIT_SCRIPT_FAILED,
        _ => EXIT_FAILURE,
    }
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, CliError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| CliError::new(EXIT_FAILURE, format!("JSON serialization failed: {e}")))
}
