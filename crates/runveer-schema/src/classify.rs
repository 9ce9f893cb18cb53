use crate::stdlib::BUNDLED_STDLIB;
use std::collections::HashSet;

/// Project-internal helper modules that are never installable dependencies.
pub const DEFAULT_LOCAL_MODULES: &[&str] = &["db_utils"];

/// Decides whether an imported module is standard-library, project-local,
/// or an external dependency.
#[derive(Debug, Clone)]
pub struct ModuleClassifier {
    stdlib: HashSet<String>,
    local: HashSet<String>,
}

impl Default for ModuleClassifier {
    fn default() -> Self {
        Self::bundled(DEFAULT_LOCAL_MODULES.iter().copied())
    }
}

impl ModuleClassifier {
    /// Classifier backed by the bundled standard-library enumeration.
    pub fn bundled<I, S>(local: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_stdlib(BUNDLED_STDLIB.iter().copied(), local)
    }

    /// Classifier backed by an explicit standard-library list, typically the
    /// one reported by the base interpreter.
    pub fn with_stdlib<I, S, L, T>(stdlib: I, local: L) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        L: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            stdlib: stdlib.into_iter().map(Into::into).collect(),
            local: local.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_stdlib(&self, module: &str) -> bool {
        self.stdlib.contains(module)
    }

    pub fn is_local(&self, module: &str) -> bool {
        self.local.contains(module)
    }

    pub fn is_external(&self, module: &str) -> bool {
        !self.is_local(module) && !self.is_stdlib(module)
    }

    pub fn stdlib_len(&self) -> usize {
        self.stdlib.len()
    }
}
