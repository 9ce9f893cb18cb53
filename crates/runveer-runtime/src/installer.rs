use crate::process::run_captured;
use crate::RuntimeError;
use runveer_schema::{Manifest, PackageName};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallTimeouts {
    pub bulk: Duration,
    pub package: Duration,
}

impl Default for InstallTimeouts {
    fn default() -> Self {
        Self {
            bulk: Duration::from_secs(300),
            package: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageFailure {
    pub package: PackageName,
    pub reason: String,
}

/// Result of installing a manifest into an environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The bulk install succeeded.
    Bulk,
    /// The bulk install exited non-zero and every line was retried on its own.
    PerPackage {
        bulk_error: String,
        installed: Vec<PackageName>,
        failed: Vec<PackageFailure>,
    },
    /// The bulk install was killed at its deadline; nothing was retried.
    TimedOut { secs: u64 },
}

impl InstallOutcome {
    /// True when every requested package is known to be installed.
    pub fn is_complete(&self) -> bool {
        match self {
            InstallOutcome::Bulk => true,
            InstallOutcome::PerPackage { failed, .. } => failed.is_empty(),
            InstallOutcome::TimedOut { .. } => false,
        }
    }
}

/// Progress of `Installer::install`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallEvent {
    UpgradingInstaller,
    BulkStarted { packages: usize },
    BulkFailed { reason: String },
    PackageStarted { package: PackageName },
    PackageInstalled { package: PackageName },
    PackageFailed { package: PackageName, reason: String },
}

impl fmt::Display for InstallEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallEvent::UpgradingInstaller => f.write_str("upgrading pip"),
            InstallEvent::BulkStarted { packages } => {
                write!(f, "installing {packages} package(s)")
            }
            InstallEvent::BulkFailed { reason } => {
                write!(f, "bulk install failed ({reason}), installing one by one")
            }
            InstallEvent::PackageStarted { package } => write!(f, "installing {package}"),
            InstallEvent::PackageInstalled { package } => write!(f, "installed {package}"),
            InstallEvent::PackageFailed { package, reason } => {
                write!(f, "failed to install {package}: {reason}")
            }
        }
    }
}

/// Drives an environment's `pip`.
pub struct Installer {
    program: PathBuf,
    timeouts: InstallTimeouts,
}

impl Installer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeouts: InstallTimeouts::default(),
        }
    }

    #[must_use]
    pub fn with_timeouts(mut self, timeouts: InstallTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// `pip install --upgrade pip`; failure is logged and otherwise ignored.
    pub fn upgrade_self(&self) -> bool {
        let mut cmd = self.command();
        cmd.args(["install", "--upgrade", "pip"]);
        match run_captured(&mut cmd, Some(self.timeouts.package)) {
            Ok(out) if out.success() => true,
            Ok(out) => {
                warn!("pip self-upgrade exited with {:?}", out.code);
                false
            }
            Err(e) => {
                warn!("pip self-upgrade failed: {e}");
                false
            }
        }
    }

    /// Install the manifest at `manifest_path`: self-upgrade, then a bulk
    /// `-r` install, then one package at a time if the bulk run fails.
    ///
    /// Only failing to start the installer at all is an error; partial
    /// failures are reported in the outcome.
    pub fn install(
        &self,
        manifest_path: &Path,
        observer: &mut dyn FnMut(InstallEvent),
    ) -> Result<InstallOutcome, RuntimeError> {
        let manifest = Manifest::read_from_file(manifest_path)?;

        observer(InstallEvent::UpgradingInstaller);
        self.upgrade_self();

        observer(InstallEvent::BulkStarted {
            packages: manifest.len(),
        });
        let mut cmd = self.command();
        cmd.args(["install", "-r"]).arg(manifest_path);
        let bulk_error = match run_captured(&mut cmd, Some(self.timeouts.bulk)) {
            Ok(out) if out.success() => {
                info!("installed {} package(s)", manifest.len());
                return Ok(InstallOutcome::Bulk);
            }
            Ok(out) => failure_reason(out.code, &out.stderr),
            Err(RuntimeError::Timeout { secs, .. }) => {
                warn!("bulk install timed out after {secs}s");
                return Ok(InstallOutcome::TimedOut { secs });
            }
            Err(e) => return Err(e),
        };

        warn!("bulk install failed: {bulk_error}");
        observer(InstallEvent::BulkFailed {
            reason: bulk_error.clone(),
        });

        let mut installed = Vec::new();
        let mut failed = Vec::new();
        for package in manifest.packages() {
            let package = PackageName::new(package);
            observer(InstallEvent::PackageStarted {
                package: package.clone(),
            });
            match self.install_package(&package) {
                Ok(()) => {
                    observer(InstallEvent::PackageInstalled {
                        package: package.clone(),
                    });
                    installed.push(package);
                }
                Err(e) => {
                    let reason = e.to_string();
                    observer(InstallEvent::PackageFailed {
                        package: package.clone(),
                        reason: reason.clone(),
                    });
                    failed.push(PackageFailure { package, reason });
                }
            }
        }

        Ok(InstallOutcome::PerPackage {
            bulk_error,
            installed,
            failed,
        })
    }

    /// `pip install <package>` with the per-package timeout.
    pub fn install_package(&self, package: &str) -> Result<(), RuntimeError> {
        debug!("installing {package}");
        let mut cmd = self.command();
        cmd.arg("install").arg(package);
        let out = run_captured(&mut cmd, Some(self.timeouts.package))?;
        if out.success() {
            Ok(())
        } else {
            Err(RuntimeError::ExecFailed(failure_reason(out.code, &out.stderr)))
        }
    }

    fn command(&self) -> Command {
        Command::new(&self.program)
    }
}

/// Last non-empty stderr line, or the exit code when stderr is empty.
fn failure_reason(code: Option<i32>, stderr: &str) -> String {
    stderr
        .lines()
        .map(str::trim)
        .rfind(|l| !l.is_empty())
        .map_or_else(
            || match code {
                Some(c) => format!("exit code {c}"),
                None => "terminated by signal".to_owned(),
            },
            str::to_owned,
        )
}
