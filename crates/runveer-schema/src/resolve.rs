use crate::analysis::ScriptProfile;
use crate::classify::ModuleClassifier;
use crate::imports::ImportSet;
use crate::manifest::{Manifest, ManifestError};
use crate::packages::{PackageMap, CONFIG_LOADER_PACKAGE, CONFIG_LOADER_TRIGGERS, WEB_UI_MODULE};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::debug;

/// Tooling packages added to the manifest when development dependencies are
/// requested.
pub const DEV_PACKAGES: &[&str] = &["black", "flake8", "mypy", "pytest"];

/// Contents of the separate development manifest.
pub const DEV_MANIFEST_PACKAGES: &[&str] = &["black", "flake8", "mypy", "pre-commit", "pytest"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Manifest(Manifest),
    /// Every import is standard-library or local. Not an error.
    NoExternalDependencies,
}

impl Resolution {
    pub fn manifest(&self) -> Option<&Manifest> {
        match self {
            Resolution::Manifest(m) => Some(m),
            Resolution::NoExternalDependencies => None,
        }
    }

    /// Persist the manifest to `path`. Writes nothing when there are no
    /// external dependencies; returns whether a file was written.
    pub fn write_to_file(&self, path: &Path) -> Result<bool, ManifestError> {
        match self {
            Resolution::Manifest(m) => {
                m.write_to_file(path)?;
                Ok(true)
            }
            Resolution::NoExternalDependencies => Ok(false),
        }
    }
}

/// Maps imported module names to installable packages.
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    classifier: ModuleClassifier,
    packages: PackageMap,
    dev_dependencies: bool,
}

impl Resolver {
    pub fn new(classifier: ModuleClassifier, packages: PackageMap) -> Self {
        Self {
            classifier,
            packages,
            dev_dependencies: false,
        }
    }

    #[must_use]
    pub fn with_dev_dependencies(mut self, enabled: bool) -> Self {
        self.dev_dependencies = enabled;
        self
    }

    pub fn classifier(&self) -> &ModuleClassifier {
        &self.classifier
    }

    pub fn packages(&self) -> &PackageMap {
        &self.packages
    }

    /// Resolve an import set.
    pub fn resolve(&self, imports: &ImportSet) -> Resolution {
        self.resolve_with(imports, false)
    }

    /// Resolve a script, including the content-based web-UI detection.
    pub fn resolve_profile(&self, profile: &ScriptProfile) -> Resolution {
        self.resolve_with(&profile.imports, profile.web_ui)
    }

    fn resolve_with(&self, imports: &ImportSet, web_ui_detected: bool) -> Resolution {
        let mut requirements = BTreeSet::new();

        for module in imports {
            if self.classifier.is_local(module) {
                debug!("skipping local module: {module}");
                continue;
            }
            if self.classifier.is_stdlib(module) {
                debug!("skipping stdlib module: {module}");
                continue;
            }
            let pkgs = self.packages.packages_for(module);
            debug!("mapped {module} to {pkgs:?}");
            requirements.extend(pkgs);
        }

        // Database helpers load credentials from an env file.
        if CONFIG_LOADER_TRIGGERS
            .iter()
            .any(|t| imports.contains(*t))
        {
            requirements.insert(CONFIG_LOADER_PACKAGE.to_owned());
        }

        if web_ui_detected || imports.contains(WEB_UI_MODULE) {
            requirements.insert(WEB_UI_MODULE.to_owned());
        }

        if self.dev_dependencies {
            requirements.extend(DEV_PACKAGES.iter().map(|p| (*p).to_owned()));
        }

        if requirements.is_empty() {
            Resolution::NoExternalDependencies
        } else {
            Resolution::Manifest(Manifest::new(requirements))
        }
    }

    /// Write the development manifest next to the main one.
    pub fn write_dev_manifest(&self, path: &Path) -> Result<(), ManifestError> {
        Manifest::new(DEV_MANIFEST_PACKAGES.iter().copied()).write_to_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn imports(names: &[&str]) -> ImportSet {
        names.iter().map(|s| (*s).to_owned()).collect()
    }

    fn packages(r: &Resolution) -> Vec<String> {
        r.manifest()
            .map(|m| m.packages().map(str::to_owned).collect())
            .unwrap_or_default()
    }

    #[test]
    fn local_and_stdlib_are_skipped() {
        let r = Resolver::default().resolve(&imports(&["requests", "os", "db_utils"]));
        assert_eq!(packages(&r), ["requests"]);
    }

    #[test]
    fn database_driver_pulls_in_config_loader() {
        let r = Resolver::default().resolve(&imports(&["psycopg2"]));
        assert_eq!(packages(&r), ["psycopg2-binary", "python-dotenv"]);
    }

    #[test]
    fn dotenv_maps_without_duplicates() {
        let r = Resolver::default().resolve(&imports(&["dotenv", "psycopg2"]));
        assert_eq!(packages(&r), ["psycopg2-binary", "python-dotenv"]);
    }

    #[test]
    fn web_ui_detected_by_content_is_added() {
        let profile = ScriptProfile {
            imports: imports(&["os"]),
            interactive: false,
            privileged: false,
            web_ui: true,
        };
        let r = Resolver::default().resolve_profile(&profile);
        assert_eq!(packages(&r), ["streamlit"]);
    }

    #[test]
    fn stdlib_only_is_not_an_error() {
        let r = Resolver::default().resolve(&imports(&["os", "sys", "json"]));
        assert_eq!(r, Resolution::NoExternalDependencies);
    }

    #[test]
    fn no_manifest_file_without_dependencies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requirements.txt");
        let written = Resolution::NoExternalDependencies
            .write_to_file(&path)
            .unwrap();
        assert!(!written);
        assert!(!path.exists());
    }

    #[test]
    fn resolving_twice_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requirements.txt");
        let set = imports(&["yaml", "requests", "cv2", "os"]);
        let resolver = Resolver::default();

        resolver.resolve(&set).write_to_file(&path).unwrap();
        let first = std::fs::read(&path).unwrap();
        resolver.resolve(&set).write_to_file(&path).unwrap();
        assert_eq!(first, std::fs::read(&path).unwrap());
        assert_eq!(first, b"opencv-python\npyyaml\nrequests\n");
    }

    #[test]
    fn dev_dependencies_are_optional() {
        let r = Resolver::default()
            .with_dev_dependencies(true)
            .resolve(&imports(&["requests"]));
        assert_eq!(
            packages(&r),
            ["black", "flake8", "mypy", "pytest", "requests"]
        );
    }

    #[test]
    fn dev_manifest_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requirements-dev.txt");
        Resolver::default().write_dev_manifest(&path).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "black\nflake8\nmypy\npre-commit\npytest\n"
        );
    }
}
