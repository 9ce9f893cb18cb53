use crate::config::{AutoFix, RunnerConfig};
use crate::report::{Status, StatusReporter};
use crate::signal::take_interrupt;
use crate::CoreError;
use regex::Regex;
use runveer_runtime::{
    elevated_command, port_in_use, run_with, Installer, ProcessOutput, StreamMode,
};
use runveer_schema::{PackageMap, ScriptProfile};
use runveer_store::Environment;
use std::path::Path;
use std::process::Command;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

static MISSING_MODULE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"No module named '([^']+)'").expect("valid missing-module pattern")
});

/// First module reported missing in a Python traceback.
pub fn missing_module(stderr: &str) -> Option<&str> {
    MISSING_MODULE
        .captures(stderr)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Where a script runs.
#[derive(Debug, Clone, Copy)]
pub enum RunTarget<'a> {
    Isolated(&'a Environment),
    /// The base interpreter, without isolation and without repair.
    System(&'a Path),
}

impl RunTarget<'_> {
    fn interpreter(&self) -> std::path::PathBuf {
        match self {
            RunTarget::Isolated(env) => env.interpreter(),
            RunTarget::System(interpreter) => interpreter.to_path_buf(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// Ctrl-C arrived while the script ran.
    Interrupted,
}

/// Runs one script and recovers once from a missing module.
pub struct ExecutionSupervisor<'a> {
    project_dir: &'a Path,
    config: &'a RunnerConfig,
    packages: &'a PackageMap,
    reporter: &'a dyn StatusReporter,
}

impl<'a> ExecutionSupervisor<'a> {
    pub fn new(
        project_dir: &'a Path,
        config: &'a RunnerConfig,
        packages: &'a PackageMap,
        reporter: &'a dyn StatusReporter,
    ) -> Self {
        Self {
            project_dir,
            config,
            packages,
            reporter,
        }
    }

    /// Run `script` on `target`.
    ///
    /// A failure naming a missing module triggers at most one targeted
    /// install and one retry per call; any later failure is terminal.
    pub fn run(
        &self,
        script: &Path,
        args: &[String],
        profile: &ScriptProfile,
        target: RunTarget<'_>,
    ) -> Result<RunOutcome, CoreError> {
        if take_interrupt() {
            debug!("discarding an interrupt raised before the script started");
        }
        if profile.privileged {
            return self.run_elevated(script, args, &target.interpreter());
        }

        let mut repaired = false;
        loop {
            let out = self.execute(script, args, profile, target)?;
            if take_interrupt() {
                self.reporter.status(Status::Warning, "stopped by user");
                return Ok(RunOutcome::Interrupted);
            }
            if out.success() {
                info!("{} finished", script.display());
                return Ok(RunOutcome::Completed);
            }

            let failure = script_failed(script, &out);
            let RunTarget::Isolated(env) = target else {
                return Err(failure);
            };
            if repaired {
                warn!("{} failed again after repair", script.display());
                return Err(failure);
            }
            let Some(module) = missing_module(&out.stderr) else {
                return Err(failure);
            };
            if !self.repair(module, env) {
                return Err(failure);
            }
            repaired = true;
            self.reporter
                .status(Status::Progress, "retrying script after repair");
        }
    }

    fn execute(
        &self,
        script: &Path,
        args: &[String],
        profile: &ScriptProfile,
        target: RunTarget<'_>,
    ) -> Result<ProcessOutput, CoreError> {
        let launcher = match target {
            RunTarget::Isolated(env) if profile.web_ui => {
                Some(env.executable(runveer_schema::WEB_UI_MODULE))
                    .filter(|p| p.is_file())
            }
            _ => None,
        };

        let (mut cmd, mode) = if let Some(launcher) = launcher {
            self.reporter.panel(
                "Running web app",
                &format!(
                    "{}\n\nThe app opens in your browser at http://localhost:8501\nPress Ctrl+C to stop the server",
                    display_name(script)
                ),
            );
            let mut cmd = Command::new(launcher);
            cmd.arg("run").arg(script);
            (cmd, StreamMode::TeeStderr)
        } else {
            let mut cmd = Command::new(target.interpreter());
            cmd.arg(script);
            if profile.interactive {
                self.reporter.status(
                    Status::Info,
                    "interactive script detected, running without output capture",
                );
                (cmd, StreamMode::TeeStderr)
            } else {
                self.reporter
                    .status(Status::Progress, &format!("running {}", display_name(script)));
                (cmd, StreamMode::Capture)
            }
        };
        cmd.args(args).current_dir(self.project_dir);

        debug!("executing {cmd:?}");
        let out = run_with(&mut cmd, mode, None)?;

        if mode == StreamMode::Capture {
            if !out.stdout.trim().is_empty() {
                self.reporter.panel("Output", out.stdout.trim_end());
            }
            if !out.stderr.trim().is_empty() {
                self.reporter.panel("Errors", out.stderr.trim_end());
            }
        }
        Ok(out)
    }

    /// Install the package providing `module` into `env`. `false` when the
    /// operator declined or the install failed.
    fn repair(&self, module: &str, env: &Environment) -> bool {
        let top_level = module.split('.').next().unwrap_or(module);
        if !self.packages.is_mapped(top_level) {
            debug!("no package mapping for '{top_level}', using the module name");
        }
        let packages = self.packages.packages_for(top_level);
        self.reporter.status(
            Status::Warning,
            &format!("missing module '{module}' (package: {})", packages.join(", ")),
        );

        let approved = match self.config.auto_fix {
            AutoFix::Always => true,
            AutoFix::Never => false,
            AutoFix::Ask => self.reporter.confirm(
                &format!("Install {} and retry?", packages.join(", ")),
                true,
            ),
        };
        if !approved {
            self.reporter.status(
                Status::Info,
                &format!(
                    "manual fix: run '{} install {}'",
                    env.installer().display(),
                    packages.join(" ")
                ),
            );
            return false;
        }

        let installer =
            Installer::new(env.installer()).with_timeouts(self.config.timeouts.install());
        for package in &packages {
            self.reporter.start_task(&format!("installing {package}"));
            if let Err(e) = installer.install_package(package) {
                self.reporter
                    .finish_task(false, &format!("failed to install {package}: {e}"));
                return false;
            }
            self.reporter
                .finish_task(true, &format!("installed {package}"));
        }
        true
    }

    fn run_elevated(
        &self,
        script: &Path,
        args: &[String],
        interpreter: &Path,
    ) -> Result<RunOutcome, CoreError> {
        let port = self.config.privileged_port;
        if port_in_use(port) {
            self.reporter.panel(
                "Port conflict",
                &format!("Port {port} is already in use by another process."),
            );
            self.reporter.status(
                Status::Info,
                &format!("check what is using it with: sudo lsof -i :{port}"),
            );
            return Err(CoreError::PortInUse(port));
        }

        self.reporter.status(
            Status::Progress,
            &format!("running {} with sudo", display_name(script)),
        );
        let mut cmd = elevated_command(interpreter, script);
        cmd.args(args).current_dir(self.project_dir);
        let out = run_with(&mut cmd, StreamMode::Inherit, None)?;
        if take_interrupt() {
            self.reporter.status(Status::Warning, "stopped by user");
            return Ok(RunOutcome::Interrupted);
        }
        if out.success() {
            Ok(RunOutcome::Completed)
        } else {
            self.reporter.status(
                Status::Info,
                &format!(
                    "to run it manually: sudo {} {}",
                    interpreter.display(),
                    script.display()
                ),
            );
            Err(script_failed(script, &out))
        }
    }
}

fn display_name(script: &Path) -> String {
    script
        .file_name()
        .map_or_else(|| script.display().to_string(), |n| n.to_string_lossy().into_owned())
}

fn script_failed(script: &Path, out: &ProcessOutput) -> CoreError {
    let reason = match out.code {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_owned(),
    };
    CoreError::ScriptFailed {
        script: display_name(script),
        reason,
        stderr: out.stderr.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_missing_module() {
        let stderr = "Traceback (most recent call last):\n  File \"a.py\", line 1, in <module>\n    import yaml\nModuleNotFoundError: No module named 'yaml'\n";
        assert_eq!(missing_module(stderr), Some("yaml"));
    }

    #[test]
    fn extracts_dotted_module() {
        assert_eq!(
            missing_module("ModuleNotFoundError: No module named 'google.protobuf'"),
            Some("google.protobuf")
        );
    }

    #[test]
    fn other_errors_have_no_missing_module() {
        assert_eq!(missing_module("ZeroDivisionError: division by zero"), None);
        assert_eq!(missing_module(""), None);
    }

    #[test]
    fn failure_reason_names_exit_code() {
        let out = ProcessOutput {
            code: Some(2),
            stdout: String::new(),
            stderr: "boom".to_owned(),
        };
        let err = script_failed(Path::new("/p/app.py"), &out);
        assert_eq!(err.to_string(), "script 'app.py' failed: exit code 2");
    }

    struct Quiet;

    impl StatusReporter for Quiet {
        fn status(&self, _level: Status, _message: &str) {}
        fn panel(&self, _title: &str, _body: &str) {}
        fn confirm(&self, _question: &str, default: bool) -> bool {
            default
        }
    }

    #[cfg(unix)]
    #[test]
    fn pending_interrupt_is_not_blamed_on_the_script() {
        let _guard = crate::signal::FLAG_GUARD
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("ok.sh");
        std::fs::write(&script, "exit 0\n").unwrap();
        let config = RunnerConfig::default();
        let packages = PackageMap::builtin();
        let supervisor = ExecutionSupervisor::new(dir.path(), &config, &packages, &Quiet);
        let profile = ScriptProfile::from_source("exit 0\n", config.privileged_port);

        crate::signal::raise_interrupt();
        let outcome = supervisor
            .run(&script, &[], &profile, RunTarget::System(Path::new("/bin/sh")))
            .unwrap();

        assert_eq!(outcome, RunOutcome::Completed);
    }
}
