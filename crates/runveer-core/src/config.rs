use runveer_runtime::InstallTimeouts;
use runveer_schema::{DEFAULT_LOCAL_MODULES, DEFAULT_PRIVILEGED_PORT};
use runveer_store::{validate_env_name, DEFAULT_ENV_NAME};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Project configuration file, looked up in the project directory.
pub const CONFIG_FILE: &str = "runveer.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// What to do when a script fails on a missing module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoFix {
    #[default]
    Ask,
    Always,
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct Timeouts {
    pub probe_secs: u64,
    pub bulk_install_secs: u64,
    pub package_install_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            probe_secs: 5,
            bulk_install_secs: 300,
            package_install_secs: 120,
        }
    }
}

impl Timeouts {
    pub fn probe(&self) -> Duration {
        Duration::from_secs(self.probe_secs)
    }

    pub fn install(&self) -> InstallTimeouts {
        InstallTimeouts {
            bulk: Duration::from_secs(self.bulk_install_secs),
            package: Duration::from_secs(self.package_install_secs),
        }
    }
}

/// Immutable run configuration, loaded once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct RunnerConfig {
    pub env_name: String,
    /// Environment creation backend: `venv` or `mock`.
    pub backend: String,
    pub manifest: PathBuf,
    pub dev_manifest: PathBuf,
    /// Base interpreter used to create environments and to run
    /// standard-library-only scripts.
    pub interpreter: PathBuf,
    pub source_extension: String,
    /// Script file names never offered for running.
    pub exclude: Vec<String>,
    pub local_modules: Vec<String>,
    pub dev_dependencies: bool,
    pub auto_fix: AutoFix,
    pub privileged_port: u16,
    pub timeouts: Timeouts,
    /// Extra import-name to package-name mappings.
    pub packages: BTreeMap<String, Vec<String>>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            env_name: DEFAULT_ENV_NAME.to_owned(),
            backend: "venv".to_owned(),
            manifest: PathBuf::from("requirements.txt"),
            dev_manifest: PathBuf::from("requirements-dev.txt"),
            interpreter: PathBuf::from(default_interpreter()),
            source_extension: "py".to_owned(),
            exclude: Vec::new(),
            local_modules: DEFAULT_LOCAL_MODULES
                .iter()
                .map(|m| (*m).to_owned())
                .collect(),
            dev_dependencies: false,
            auto_fix: AutoFix::Ask,
            privileged_port: DEFAULT_PRIVILEGED_PORT,
            timeouts: Timeouts::default(),
            packages: BTreeMap::new(),
        }
    }
}

fn default_interpreter() -> &'static str {
    if cfg!(windows) {
        "python"
    } else {
        "python3"
    }
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub env_name: Option<String>,
    pub auto_fix: Option<AutoFix>,
}

impl RunnerConfig {
    pub fn parse(input: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `<project_dir>/runveer.toml`, or the defaults when it is absent.
    pub fn load(project_dir: &Path) -> Result<Self, ConfigError> {
        let path = project_dir.join(CONFIG_FILE);
        if !path.is_file() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        Self::parse(&content, &path)
    }

    pub fn with_overrides(mut self, overrides: Overrides) -> Result<Self, ConfigError> {
        if let Some(name) = overrides.env_name {
            self.env_name = name;
        }
        if let Some(auto_fix) = overrides.auto_fix {
            self.auto_fix = auto_fix;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_env_name(&self.env_name).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.source_extension.is_empty() || self.source_extension.contains('.') {
            return Err(ConfigError::Invalid(format!(
                "source_extension must be a bare extension, got '{}'",
                self.source_extension
            )));
        }
        let t = &self.timeouts;
        if t.probe_secs == 0 || t.bulk_install_secs == 0 || t.package_install_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be positive".to_owned()));
        }
        Ok(())
    }

    pub fn manifest_path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.manifest)
    }

    pub fn dev_manifest_path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.dev_manifest)
    }
}
