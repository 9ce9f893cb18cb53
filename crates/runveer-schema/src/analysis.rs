//! Source-level heuristics that decide how a script must be run.

use crate::classify::ModuleClassifier;
use crate::imports::{extract_imports, ImportSet};
use crate::packages::WEB_UI_MODULE;
use crate::AnalysisError;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

/// Port whose binding requires elevated privileges on most systems.
pub const DEFAULT_PRIVILEGED_PORT: u16 = 80;

static INPUT_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\binput\s*\(").expect("valid input() pattern"));
static WEB_UI_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^\s*(import|from)\s+{WEB_UI_MODULE}\b"))
        .expect("valid web-ui import pattern")
});

/// Everything the runner needs to know about one script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptProfile {
    pub imports: ImportSet,
    /// Blocks on standard input somewhere in its source.
    pub interactive: bool,
    /// Looks like it binds the privileged port.
    pub privileged: bool,
    /// A web-UI framework app that must be started through its launcher.
    pub web_ui: bool,
}

impl ScriptProfile {
    pub fn from_source(source: &str, privileged_port: u16) -> Self {
        let imports = extract_imports(source);
        let web_ui = imports.contains(WEB_UI_MODULE) || is_web_ui(source);
        Self {
            interactive: is_interactive(source),
            privileged: is_privileged(source, privileged_port),
            web_ui,
            imports,
        }
    }

    pub fn from_file(path: &Path, privileged_port: u16) -> Result<Self, AnalysisError> {
        let source = std::fs::read_to_string(path).map_err(|source| AnalysisError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_source(&source, privileged_port))
    }

    pub fn has_external_dependencies(&self, classifier: &ModuleClassifier) -> bool {
        has_external_dependencies(&self.imports, classifier, self.web_ui)
    }
}

pub fn is_interactive(source: &str) -> bool {
    INPUT_CALL.is_match(source)
}

/// Textual patterns that suggest the script binds `port`.
pub fn is_privileged(source: &str, port: u16) -> bool {
    let patterns = [
        format!(r"(?i)port\s*[=:]\s*{port}\b"),
        format!(r"bind.*\b{port}\b"),
        format!(r":{port}\b"),
    ];
    patterns
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .any(|re| re.is_match(source))
}

/// A web-UI framework import on any non-comment line.
pub fn is_web_ui(source: &str) -> bool {
    source
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .any(|l| WEB_UI_IMPORT.is_match(l))
}

pub fn has_external_dependencies(
    imports: &ImportSet,
    classifier: &ModuleClassifier,
    web_ui: bool,
) -> bool {
    web_ui || imports.iter().any(|m| classifier.is_external(m))
}
