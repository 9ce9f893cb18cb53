#![cfg(unix)]

use runveer_core::{
    AutoFix, CoreError, ExecutionSupervisor, RunOutcome, RunTarget, Runner, RunnerConfig, Status,
    StatusReporter,
};
use runveer_schema::{PackageMap, ScriptProfile};
use runveer_store::{EnvBackend, EnvLayout, EnvironmentStore, StoreError};
use std::cell::{Cell, RefCell};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Environment interpreter stand-in. Its behaviour is steered by marker
/// files in the state directory:
/// `crash` fails with an unrelated error, `always-fail` keeps reporting the
/// missing module, otherwise it succeeds once `installed-pyyaml` exists.
const PYTHON: &str = r#"#!/bin/sh
if [ "$1" = "--version" ]; then echo "Python 3.12.0"; exit 0; fi
echo run >> "$STATE/runs"
if [ -f "$STATE/crash" ]; then echo "ZeroDivisionError: division by zero" >&2; exit 3; fi
if [ -f "$STATE/always-fail" ] || [ ! -f "$STATE/installed-pyyaml" ]; then
  echo "ModuleNotFoundError: No module named 'yaml'" >&2
  exit 1
fi
echo "hello from $1"
"#;

/// Installer stand-in: logs every call and records single-package installs.
const PIP: &str = r#"#!/bin/sh
echo "$@" >> "$STATE/pip.log"
if [ "$1" = "install" ] && [ "$2" != "-r" ] && [ "$2" != "--upgrade" ]; then
  touch "$STATE/installed-$2"
fi
exit 0
"#;

fn write_executable(path: &Path, body: &str, state: &Path) {
    let body = body.replacen("#!/bin/sh\n", &format!("#!/bin/sh\nSTATE='{}'\n", state.display()), 1);
    fs::write(path, body).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

/// Creates fake environment executables. A `block-stamp` marker in the
/// state directory leaves a directory where the fingerprint stamp belongs.
struct ShellBackend {
    state: PathBuf,
    creations: Arc<AtomicUsize>,
    fail: bool,
}

impl EnvBackend for ShellBackend {
    fn name(&self) -> &str {
        "shell"
    }

    fn create(&self, root: &Path) -> Result<(), StoreError> {
        if self.fail {
            return Err(StoreError::CreationFailed {
                name: root.display().to_string(),
                reason: "no venv module".to_owned(),
            });
        }
        self.creations.fetch_add(1, Ordering::SeqCst);
        let layout = EnvLayout::new(root);
        fs::create_dir_all(layout.bin_dir())?;
        write_executable(&layout.interpreter(), PYTHON, &self.state);
        write_executable(&layout.installer(), PIP, &self.state);
        if self.state.join("block-stamp").exists() {
            fs::create_dir(layout.fingerprint_file())?;
        }
        Ok(())
    }

    fn probe(&self, interpreter: &Path, _timeout: Duration) -> bool {
        interpreter.is_file()
    }
}

#[derive(Default)]
struct RecordingReporter {
    lines: RefCell<Vec<(Status, String)>>,
    panels: RefCell<Vec<(String, String)>>,
    answer: bool,
    confirms: Cell<usize>,
}

impl StatusReporter for RecordingReporter {
    fn status(&self, level: Status, message: &str) {
        self.lines.borrow_mut().push((level, message.to_owned()));
    }

    fn panel(&self, title: &str, body: &str) {
        self.panels
            .borrow_mut()
            .push((title.to_owned(), body.to_owned()));
    }

    fn confirm(&self, _question: &str, _default: bool) -> bool {
        self.confirms.set(self.confirms.get() + 1);
        self.answer
    }
}

struct Fixture {
    project: tempfile::TempDir,
    state: tempfile::TempDir,
    creations: Arc<AtomicUsize>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            project: tempfile::tempdir().unwrap(),
            state: tempfile::tempdir().unwrap(),
            creations: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn dir(&self) -> &Path {
        self.project.path()
    }

    fn backend(&self, fail: bool) -> Box<dyn EnvBackend> {
        Box::new(ShellBackend {
            state: self.state.path().to_path_buf(),
            creations: Arc::clone(&self.creations),
            fail,
        })
    }

    fn script(&self, name: &str, source: &str) -> PathBuf {
        let path = self.dir().join(name);
        fs::write(&path, source).unwrap();
        path
    }

    fn mark(&self, marker: &str) {
        fs::write(self.state.path().join(marker), "").unwrap();
    }

    fn runs(&self) -> usize {
        fs::read_to_string(self.state.path().join("runs"))
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }

    fn pip_calls(&self) -> Vec<String> {
        fs::read_to_string(self.state.path().join("pip.log"))
            .map(|s| s.lines().map(str::to_owned).collect())
            .unwrap_or_default()
    }

    /// Base interpreter stand-in that refuses the stdlib query and echoes
    /// the script it was given.
    fn base_interpreter(&self) -> PathBuf {
        let path = self.state.path().join("base-python");
        write_executable(
            &path,
            "#!/bin/sh\nif [ \"$1\" = \"-c\" ]; then exit 1; fi\necho \"base ran $1\"\n",
            self.state.path(),
        );
        path
    }
}

fn config(auto_fix: AutoFix) -> RunnerConfig {
    RunnerConfig {
        interpreter: PathBuf::from("/nonexistent/runveer-python"),
        auto_fix,
        ..RunnerConfig::default()
    }
}

fn supervise(
    fx: &Fixture,
    config: &RunnerConfig,
    reporter: &RecordingReporter,
) -> Result<RunOutcome, CoreError> {
    let store = EnvironmentStore::new(fx.dir(), fx.backend(false));
    let env = store
        .setup("venv", &runveer_schema::Fingerprint::new("f"))
        .unwrap();
    let script = fx.script("app.py", "import yaml\nprint(yaml.__version__)\n");
    let profile = ScriptProfile::from_file(&script, config.privileged_port).unwrap();
    let packages = PackageMap::builtin();
    let supervisor = ExecutionSupervisor::new(fx.dir(), config, &packages, reporter);
    supervisor.run(&script, &[], &profile, RunTarget::Isolated(&env))
}

#[test]
fn missing_module_is_installed_then_retried_once() {
    let fx = Fixture::new();
    let reporter = RecordingReporter::default();

    let outcome = supervise(&fx, &config(AutoFix::Always), &reporter).unwrap();

    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(fx.runs(), 2);
    assert_eq!(fx.pip_calls(), vec!["install pyyaml".to_owned()]);
    assert!(reporter
        .panels
        .borrow()
        .iter()
        .any(|(title, body)| title == "Output" && body.contains("hello from")));
}

#[test]
fn second_failure_after_repair_is_terminal() {
    let fx = Fixture::new();
    fx.mark("always-fail");
    let reporter = RecordingReporter::default();

    let err = supervise(&fx, &config(AutoFix::Always), &reporter).unwrap_err();

    let CoreError::ScriptFailed { stderr, .. } = &err else {
        panic!("expected a script failure");
    };
    assert!(stderr.contains("No module named 'yaml'"));
    assert_eq!(fx.runs(), 2);
    assert_eq!(fx.pip_calls(), vec!["install pyyaml".to_owned()]);
}

#[test]
fn declined_repair_is_not_retried() {
    let fx = Fixture::new();
    let reporter = RecordingReporter::default();

    let err = supervise(&fx, &config(AutoFix::Ask), &reporter).unwrap_err();

    assert!(matches!(err, CoreError::ScriptFailed { .. }));
    assert_eq!(reporter.confirms.get(), 1);
    assert_eq!(fx.runs(), 1);
    assert!(fx.pip_calls().is_empty());
    assert!(reporter.lines.borrow().iter().any(|(level, msg)| {
        *level == Status::Info
            && msg.starts_with("manual fix: run '")
            && msg.contains("bin/pip")
            && msg.ends_with(" install pyyaml'")
    }));
}

#[test]
fn approved_repair_asks_once() {
    let fx = Fixture::new();
    let reporter = RecordingReporter {
        answer: true,
        ..RecordingReporter::default()
    };

    supervise(&fx, &config(AutoFix::Ask), &reporter).unwrap();
    assert_eq!(reporter.confirms.get(), 1);
    assert_eq!(fx.runs(), 2);
}

#[test]
fn unrelated_failure_is_reported_verbatim() {
    let fx = Fixture::new();
    fx.mark("crash");
    let reporter = RecordingReporter::default();

    let err = supervise(&fx, &config(AutoFix::Always), &reporter).unwrap_err();

    assert_eq!(err.to_string(), "script 'app.py' failed: exit code 3");
    assert_eq!(fx.runs(), 1);
    assert!(fx.pip_calls().is_empty());
    assert!(reporter
        .panels
        .borrow()
        .iter()
        .any(|(title, body)| title == "Errors" && body.contains("ZeroDivisionError")));
}

#[test]
fn pipeline_builds_installs_runs_and_then_reuses() {
    let fx = Fixture::new();
    fx.mark("installed-pyyaml");
    fx.script("app.py", "import os\nimport yaml\n");
    let config = config(AutoFix::Never);
    let reporter = RecordingReporter::default();
    let runner = Runner::with_backend(fx.dir(), &config, &reporter, fx.backend(false));

    let outcome = runner.run_script(Path::new("app.py"), &[]).unwrap();

    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(
        fs::read_to_string(fx.dir().join("requirements.txt")).unwrap(),
        "pyyaml\n"
    );
    let env_root = fx.dir().join("venv");
    assert!(env_root.join(".project_fingerprint").is_file());
    assert!(!env_root.join(".lock").exists());
    let calls = fx.pip_calls();
    assert_eq!(calls[0], "install --upgrade pip");
    assert!(calls[1].starts_with("install -r "));

    runner.run_script(Path::new("app.py"), &[]).unwrap();
    assert_eq!(fx.creations.load(Ordering::SeqCst), 1);
    assert_eq!(fx.runs(), 2);
}

#[test]
fn changed_source_rebuilds_environment() {
    let fx = Fixture::new();
    fx.mark("installed-pyyaml");
    fx.script("app.py", "import yaml\n");
    let config = config(AutoFix::Never);
    let reporter = RecordingReporter::default();
    let runner = Runner::with_backend(fx.dir(), &config, &reporter, fx.backend(false));

    runner.run_script(Path::new("app.py"), &[]).unwrap();
    fx.script("helper.py", "VALUE = 1\n");
    runner.run_script(Path::new("app.py"), &[]).unwrap();

    assert_eq!(fx.creations.load(Ordering::SeqCst), 2);
}

#[test]
fn stdlib_only_script_runs_on_base_interpreter() {
    let fx = Fixture::new();
    fx.script("tool.py", "import os, sys\nprint(sys.argv)\n");
    let config = RunnerConfig {
        interpreter: fx.base_interpreter(),
        ..RunnerConfig::default()
    };
    let reporter = RecordingReporter::default();
    let runner = Runner::with_backend(fx.dir(), &config, &reporter, fx.backend(false));

    let outcome = runner.run_script(Path::new("tool.py"), &[]).unwrap();

    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(fx.creations.load(Ordering::SeqCst), 0);
    assert!(!fx.dir().join("requirements.txt").exists());
    assert!(reporter
        .panels
        .borrow()
        .iter()
        .any(|(_, body)| body.contains("base ran")));
}

#[test]
fn creation_failure_falls_back_to_base_interpreter() {
    let fx = Fixture::new();
    fx.script("app.py", "import requests\n");
    let config = RunnerConfig {
        interpreter: fx.base_interpreter(),
        ..RunnerConfig::default()
    };
    let reporter = RecordingReporter::default();
    let runner = Runner::with_backend(fx.dir(), &config, &reporter, fx.backend(true));

    let outcome = runner.run_script(Path::new("app.py"), &[]).unwrap();

    assert_eq!(outcome, RunOutcome::Completed);
    assert!(reporter
        .lines
        .borrow()
        .iter()
        .any(|(level, msg)| *level == Status::Warning && msg.contains("running directly")));
}

#[test]
fn unwritable_stamp_falls_back_to_base_interpreter() {
    let fx = Fixture::new();
    fx.mark("block-stamp");
    fx.script("app.py", "import requests\n");
    let config = RunnerConfig {
        interpreter: fx.base_interpreter(),
        ..RunnerConfig::default()
    };
    let reporter = RecordingReporter::default();
    let runner = Runner::with_backend(fx.dir(), &config, &reporter, fx.backend(false));

    let outcome = runner.run_script(Path::new("app.py"), &[]).unwrap();

    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(fx.creations.load(Ordering::SeqCst), 1);
    assert!(fx.pip_calls().is_empty());
    assert!(reporter
        .lines
        .borrow()
        .iter()
        .any(|(level, msg)| *level == Status::Warning && msg.contains("running directly")));
    assert!(reporter
        .panels
        .borrow()
        .iter()
        .any(|(_, body)| body.contains("base ran")));
}

#[test]
fn resolve_script_applies_coupling_rule() {
    let fx = Fixture::new();
    fx.script("db.py", "import psycopg2\nimport db_utils\n");
    let config = config(AutoFix::Never);
    let reporter = RecordingReporter::default();
    let runner = Runner::with_backend(fx.dir(), &config, &reporter, fx.backend(false));

    let resolution = runner.resolve_script(Path::new("db.py")).unwrap();

    let packages: Vec<&str> = resolution.manifest().unwrap().packages().collect();
    assert_eq!(packages, ["psycopg2-binary", "python-dotenv"]);
    assert_eq!(
        fs::read_to_string(fx.dir().join("requirements.txt")).unwrap(),
        "psycopg2-binary\npython-dotenv\n"
    );
}

#[test]
fn missing_script_is_reported() {
    let fx = Fixture::new();
    let config = config(AutoFix::Never);
    let reporter = RecordingReporter::default();
    let runner = Runner::with_backend(fx.dir(), &config, &reporter, fx.backend(false));

    let err = runner.run_script(Path::new("nope.py"), &[]).unwrap_err();
    assert!(matches!(err, CoreError::ScriptNotFound(_)));
}

#[test]
fn clean_removes_environment_and_fallbacks() {
    let fx = Fixture::new();
    let config = config(AutoFix::Never);
    let reporter = RecordingReporter::default();
    let runner = Runner::with_backend(fx.dir(), &config, &reporter, fx.backend(false));

    let report = runner.setup_env().unwrap();
    assert!(report.install.is_none());
    fs::create_dir(fx.dir().join("venv_1700000000")).unwrap();

    let cleaned = runner.clean(true).unwrap();
    assert_eq!(cleaned.removed, vec!["venv", "venv_1700000000"]);
    assert!(!fx.dir().join("venv").exists());
    assert!(runner.clean(false).unwrap().removed.is_empty());
}

#[test]
fn clean_all_removes_fallback_of_long_name() {
    let fx = Fixture::new();
    let long = "e".repeat(60);
    let config = RunnerConfig {
        env_name: long.clone(),
        ..config(AutoFix::Never)
    };
    let reporter = RecordingReporter::default();
    let runner = Runner::with_backend(fx.dir(), &config, &reporter, fx.backend(false));
    runner.setup_env().unwrap();
    let fallback = format!("{long}_1700000000");
    fs::create_dir(fx.dir().join(&fallback)).unwrap();

    let cleaned = runner.clean(true).unwrap();

    assert_eq!(cleaned.removed, vec![long.clone(), fallback.clone()]);
    assert!(!fx.dir().join(&long).exists());
    assert!(!fx.dir().join(&fallback).exists());
}
