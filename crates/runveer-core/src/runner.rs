use crate::config::RunnerConfig;
use crate::discovery::{describe_scripts, discover_scripts};
use crate::report::{report_install_event, report_setup_event, ScriptEntry, Status, StatusReporter};
use crate::signal::take_interrupt;
use crate::supervisor::{ExecutionSupervisor, RunOutcome, RunTarget};
use crate::CoreError;
use runveer_runtime::{query_stdlib, select_backend, InstallOutcome, Installer};
use runveer_schema::{
    compute_fingerprint, Fingerprint, ModuleClassifier, PackageMap, Resolution, Resolver,
    ScriptProfile, BUNDLED_STDLIB,
};
use runveer_store::{EnvBackend, Environment, EnvironmentStore, StoreError};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Result of `Runner::setup_env`.
#[derive(Debug)]
pub struct SetupReport {
    pub environment: Environment,
    /// `None` when there was no manifest to install.
    pub install: Option<InstallOutcome>,
}

/// Result of `Runner::clean`.
#[derive(Debug, Default)]
pub struct CleanReport {
    pub removed: Vec<String>,
}

/// The end-to-end pipeline for one project directory.
pub struct Runner<'a> {
    project_dir: PathBuf,
    config: &'a RunnerConfig,
    reporter: &'a dyn StatusReporter,
    store: EnvironmentStore,
    resolver: Resolver,
}

impl<'a> Runner<'a> {
    pub fn new(
        project_dir: impl Into<PathBuf>,
        config: &'a RunnerConfig,
        reporter: &'a dyn StatusReporter,
    ) -> Result<Self, CoreError> {
        let backend = select_backend(&config.backend, &config.interpreter)?;
        Ok(Self::with_backend(project_dir, config, reporter, backend))
    }

    pub fn with_backend(
        project_dir: impl Into<PathBuf>,
        config: &'a RunnerConfig,
        reporter: &'a dyn StatusReporter,
        backend: Box<dyn EnvBackend>,
    ) -> Self {
        let project_dir = project_dir.into();
        let local = config.local_modules.iter().cloned();
        let classifier = match query_stdlib(&config.interpreter, config.timeouts.probe()) {
            Some(names) => {
                let bundled = BUNDLED_STDLIB.iter().map(|m| (*m).to_owned());
                ModuleClassifier::with_stdlib(names.into_iter().chain(bundled), local)
            }
            None => {
                debug!("using the bundled stdlib list");
                ModuleClassifier::bundled(local)
            }
        };
        debug!("classifier knows {} stdlib modules", classifier.stdlib_len());
        let packages = PackageMap::builtin().with_overrides(&config.packages);
        let resolver =
            Resolver::new(classifier, packages).with_dev_dependencies(config.dev_dependencies);
        let store = EnvironmentStore::new(&project_dir, backend)
            .with_probe_timeout(config.timeouts.probe());

        Self {
            project_dir,
            config,
            reporter,
            store,
            resolver,
        }
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn config(&self) -> &RunnerConfig {
        self.config
    }

    pub fn store(&self) -> &EnvironmentStore {
        &self.store
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.config.manifest_path(&self.project_dir)
    }

    pub fn scripts(&self) -> Result<Vec<PathBuf>, CoreError> {
        Ok(discover_scripts(
            &self.project_dir,
            &self.config.source_extension,
            &self.config.exclude,
        )?)
    }

    pub fn list_scripts(&self) -> Result<Vec<ScriptEntry>, CoreError> {
        Ok(describe_scripts(
            self.scripts()?,
            self.resolver.classifier(),
            self.config.privileged_port,
        ))
    }

    /// Resolve `script` against the project directory.
    pub fn locate_script(&self, script: &Path) -> Result<PathBuf, CoreError> {
        let path = if script.is_absolute() {
            script.to_path_buf()
        } else {
            self.project_dir.join(script)
        };
        if path.is_file() {
            Ok(path)
        } else {
            Err(CoreError::ScriptNotFound(script.to_path_buf()))
        }
    }

    /// Profile a script; an unreadable one is reported and treated as having
    /// no imports.
    pub fn profile(&self, script: &Path) -> ScriptProfile {
        let port = self.config.privileged_port;
        ScriptProfile::from_file(script, port).unwrap_or_else(|e| {
            self.reporter.status(Status::Warning, &e.to_string());
            ScriptProfile::from_source("", port)
        })
    }

    /// Resolve a script's dependencies and write the manifest.
    pub fn resolve_script(&self, script: &Path) -> Result<Resolution, CoreError> {
        let script = self.locate_script(script)?;
        let profile = self.profile(&script);
        self.write_resolution(&profile)
    }

    pub fn fingerprint(&self) -> Result<Fingerprint, CoreError> {
        Ok(compute_fingerprint(
            &self.project_dir,
            &self.config.source_extension,
            &self.manifest_path(),
        )?)
    }

    /// Prepare the environment for the current fingerprint and install the
    /// manifest into it when one exists.
    pub fn setup_env(&self) -> Result<SetupReport, CoreError> {
        let fingerprint = self.fingerprint()?;
        let environment = self.prepare_environment(&fingerprint)?;
        let manifest = self.manifest_path();
        let install = if manifest.is_file() {
            let lock = environment.lock()?;
            let outcome = self.install(&environment, &manifest);
            if let Some(lock) = lock {
                lock.release();
            }
            Some(outcome?)
        } else {
            None
        };
        Ok(SetupReport {
            environment,
            install,
        })
    }

    /// Forcibly remove the environment, and its fallback siblings when
    /// `include_fallbacks` is set.
    pub fn clean(&self, include_fallbacks: bool) -> Result<CleanReport, CoreError> {
        let name = &self.config.env_name;
        let mut names = vec![name.clone()];
        if include_fallbacks {
            names.extend(self.store.siblings(name)?);
        }

        let mut report = CleanReport::default();
        for name in names {
            let removed = self
                .store
                .destroy(&name, &mut |e| report_setup_event(self.reporter, &e))?;
            if removed {
                report.removed.push(name);
            }
        }
        Ok(report)
    }

    /// Install `manifest_path` into `env`, reporting partial failures.
    pub fn install(
        &self,
        env: &Environment,
        manifest_path: &Path,
    ) -> Result<InstallOutcome, CoreError> {
        let installer =
            Installer::new(env.installer()).with_timeouts(self.config.timeouts.install());
        let outcome =
            installer.install(manifest_path, &mut |e| report_install_event(self.reporter, &e))?;

        match &outcome {
            InstallOutcome::Bulk => self.reporter.finish_task(true, "dependencies installed"),
            InstallOutcome::PerPackage {
                installed, failed, ..
            } => {
                if failed.is_empty() {
                    self.reporter.finish_task(
                        true,
                        &format!("installed {} package(s) individually", installed.len()),
                    );
                } else {
                    let names: Vec<&str> = failed.iter().map(|f| f.package.as_str()).collect();
                    self.reporter.finish_task(
                        false,
                        &format!(
                            "installed {} package(s), {} failed",
                            installed.len(),
                            failed.len()
                        ),
                    );
                    self.reporter.status(
                        Status::Warning,
                        &format!("could not install: {}", names.join(", ")),
                    );
                }
            }
            InstallOutcome::TimedOut { secs } => self.reporter.finish_task(
                false,
                &format!("installation timed out after {secs}s, try again"),
            ),
        }
        Ok(outcome)
    }

    /// Profile, resolve, fingerprint, prepare, install, then run `script`.
    ///
    /// A script that needs nothing beyond the standard library, or an
    /// environment that cannot be created, runs on the base interpreter.
    pub fn run_script(&self, script: &Path, args: &[String]) -> Result<RunOutcome, CoreError> {
        let script = self.locate_script(script)?;
        let profile = self.profile(&script);
        let supervisor = ExecutionSupervisor::new(
            &self.project_dir,
            self.config,
            self.resolver.packages(),
            self.reporter,
        );
        let system = RunTarget::System(&self.config.interpreter);

        if !profile.has_external_dependencies(self.resolver.classifier()) {
            self.reporter.status(
                Status::Success,
                "script uses only the standard library, running directly",
            );
            return supervisor.run(&script, args, &profile, system);
        }

        self.reporter
            .status(Status::Info, "script has external dependencies");
        if let Resolution::NoExternalDependencies = self.write_resolution(&profile)? {
            return supervisor.run(&script, args, &profile, system);
        }

        let fingerprint = self.fingerprint()?;
        let env = match self.prepare_environment(&fingerprint) {
            Ok(env) => env,
            Err(e @ (StoreError::CreationFailed { .. } | StoreError::FallbackExhausted(_))) => {
                warn!("environment unavailable: {e}");
                if take_interrupt() {
                    self.reporter.status(Status::Warning, "stopped by user");
                    return Ok(RunOutcome::Interrupted);
                }
                self.reporter.finish_task(false, &e.to_string());
                self.reporter.status(
                    Status::Warning,
                    "failed to set up the environment, running directly",
                );
                return supervisor.run(&script, args, &profile, system);
            }
            Err(e) => return Err(e.into()),
        };
        info!("using environment {}", env.root().display());
        if take_interrupt() {
            self.reporter.status(Status::Warning, "stopped by user");
            return Ok(RunOutcome::Interrupted);
        }

        let lock = env.lock()?;
        if lock.is_none() {
            debug!("environment lock is held by another process");
        }
        let result = self.install(&env, &self.manifest_path()).and_then(|_| {
            if take_interrupt() {
                self.reporter.status(Status::Warning, "stopped by user");
                return Ok(RunOutcome::Interrupted);
            }
            supervisor.run(&script, args, &profile, RunTarget::Isolated(&env))
        });
        if let Some(lock) = lock {
            lock.release();
        }
        result
    }

    fn prepare_environment(&self, fingerprint: &Fingerprint) -> Result<Environment, StoreError> {
        self.store
            .setup_observed(&self.config.env_name, fingerprint, &mut |e| {
                report_setup_event(self.reporter, &e);
            })
    }

    fn write_resolution(&self, profile: &ScriptProfile) -> Result<Resolution, CoreError> {
        let resolution = self.resolver.resolve_profile(profile);
        let manifest_path = self.manifest_path();
        match &resolution {
            Resolution::Manifest(manifest) => {
                manifest.write_to_file(&manifest_path)?;
                self.reporter.status(
                    Status::Success,
                    &format!(
                        "wrote {} package(s) to {}",
                        manifest.len(),
                        self.config.manifest.display()
                    ),
                );
            }
            Resolution::NoExternalDependencies => {
                self.reporter
                    .status(Status::Info, "no external dependencies");
            }
        }
        if self.config.dev_dependencies {
            self.resolver
                .write_dev_manifest(&self.config.dev_manifest_path(&self.project_dir))?;
        }
        Ok(resolution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{raise_interrupt, FLAG_GUARD};
    use runveer_runtime::MockBackend;
    use std::cell::RefCell;
    use std::time::Duration;

    #[derive(Default)]
    struct Lines(RefCell<Vec<String>>);

    impl StatusReporter for Lines {
        fn status(&self, _level: Status, message: &str) {
            self.0.borrow_mut().push(message.to_owned());
        }

        fn panel(&self, title: &str, _body: &str) {
            self.0.borrow_mut().push(format!("panel: {title}"));
        }

        fn confirm(&self, _question: &str, default: bool) -> bool {
            default
        }
    }

    /// Lays out a mock environment, then behaves as if Ctrl-C arrived
    /// while it was being created.
    struct InterruptedCreation(MockBackend);

    impl EnvBackend for InterruptedCreation {
        fn name(&self) -> &str {
            "interrupted"
        }

        fn create(&self, root: &Path) -> Result<(), StoreError> {
            self.0.create(root)?;
            raise_interrupt();
            Ok(())
        }

        fn probe(&self, interpreter: &Path, timeout: Duration) -> bool {
            self.0.probe(interpreter, timeout)
        }
    }

    #[test]
    fn interrupt_during_setup_stops_before_install() {
        let _guard = FLAG_GUARD
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.py"), "import requests\n").unwrap();
        let config = RunnerConfig {
            interpreter: PathBuf::from("/nonexistent/runveer-python"),
            ..RunnerConfig::default()
        };
        let reporter = Lines::default();
        let runner = Runner::with_backend(
            dir.path(),
            &config,
            &reporter,
            Box::new(InterruptedCreation(MockBackend::new())),
        );

        // The mock installer is not executable, so reaching install would fail.
        let outcome = runner.run_script(Path::new("app.py"), &[]).unwrap();

        assert_eq!(outcome, RunOutcome::Interrupted);
        assert!(!take_interrupt());
        assert!(reporter.0.borrow().iter().any(|l| l == "stopped by user"));
        assert!(!dir.path().join("venv/.lock").exists());
    }
}
