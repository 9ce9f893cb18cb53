//! Presentation seams. The core only talks to these traits; the binary picks
//! a styled or plain implementation once at startup.

use runveer_runtime::InstallEvent;
use runveer_schema::ScriptProfile;
use runveer_store::SetupEvent;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Info,
    Success,
    Warning,
    Error,
    Progress,
}

pub trait StatusReporter {
    fn status(&self, level: Status, message: &str);

    /// A titled block of multi-line text, such as captured script output.
    fn panel(&self, title: &str, body: &str);

    fn confirm(&self, question: &str, default: bool) -> bool;

    /// Begin a long-running step. A second call replaces the current one.
    fn start_task(&self, message: &str) {
        self.status(Status::Progress, message);
    }

    fn finish_task(&self, ok: bool, message: &str) {
        self.status(if ok { Status::Success } else { Status::Error }, message);
    }
}

/// A runnable script as offered to the operator.
#[derive(Debug, Clone)]
pub struct ScriptEntry {
    pub path: PathBuf,
    pub name: String,
    /// `None` when the script could not be read.
    pub profile: Option<ScriptProfile>,
    pub has_dependencies: bool,
}

pub trait MenuPresenter {
    /// `None` when the operator quits.
    fn choose_script(&self, scripts: &[ScriptEntry]) -> Option<PathBuf>;
}

pub(crate) fn report_setup_event(reporter: &dyn StatusReporter, event: &SetupEvent) {
    let message = event.to_string();
    match event {
        SetupEvent::Creating { .. } => reporter.start_task(&message),
        SetupEvent::Created { .. } => reporter.finish_task(true, &message),
        SetupEvent::Removing { .. } => reporter.status(Status::Progress, &message),
        e if e.is_warning() => reporter.status(Status::Warning, &message),
        _ => reporter.status(Status::Success, &message),
    }
}

pub(crate) fn report_install_event(reporter: &dyn StatusReporter, event: &InstallEvent) {
    let message = event.to_string();
    match event {
        InstallEvent::UpgradingInstaller
        | InstallEvent::BulkStarted { .. }
        | InstallEvent::PackageStarted { .. } => reporter.start_task(&message),
        InstallEvent::BulkFailed { .. } => reporter.status(Status::Warning, &message),
        InstallEvent::PackageInstalled { .. } => reporter.finish_task(true, &message),
        InstallEvent::PackageFailed { .. } => reporter.finish_task(false, &message),
    }
}
