use std::collections::BTreeMap;

/// Modules whose presence implies the env-file loader package is needed.
pub const CONFIG_LOADER_TRIGGERS: &[&str] = &["psycopg2", "dotenv"];
pub const CONFIG_LOADER_PACKAGE: &str = "python-dotenv";

/// The web-UI framework whose apps are started through their own launcher.
pub const WEB_UI_MODULE: &str = "streamlit";

/// Import names whose installable package name differs (or which pull in
/// more than one package).
const BUILTIN_MAP: &[(&str, &[&str])] = &[
    ("PIL", &["pillow"]),
    ("binance", &["python-binance"]),
    ("bs4", &["beautifulsoup4"]),
    ("cv2", &["opencv-python"]),
    ("dotenv", &["python-dotenv"]),
    ("psycopg2", &["psycopg2-binary"]),
    ("sklearn", &["scikit-learn"]),
    ("talib", &["TA-Lib"]),
    ("yaml", &["pyyaml"]),
];

/// Static import-name to package-name table.
#[derive(Debug, Clone)]
pub struct PackageMap {
    entries: BTreeMap<String, Vec<String>>,
}

impl Default for PackageMap {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PackageMap {
    pub fn builtin() -> Self {
        let entries = BUILTIN_MAP
            .iter()
            .map(|(module, pkgs)| {
                (
                    (*module).to_owned(),
                    pkgs.iter().map(|p| (*p).to_owned()).collect(),
                )
            })
            .collect();
        Self { entries }
    }

    /// Add or replace entries; later entries win.
    #[must_use]
    pub fn with_overrides(mut self, overrides: &BTreeMap<String, Vec<String>>) -> Self {
        for (module, pkgs) in overrides {
            self.entries.insert(module.clone(), pkgs.clone());
        }
        self
    }

    /// Installable packages for `module`, defaulting to the module name.
    pub fn packages_for(&self, module: &str) -> Vec<String> {
        self.entries
            .get(module)
            .cloned()
            .unwrap_or_else(|| vec![module.to_owned()])
    }

    pub fn is_mapped(&self, module: &str) -> bool {
        self.entries.contains_key(module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapped_modules() {
        let m = PackageMap::builtin();
        assert_eq!(m.packages_for("yaml"), ["pyyaml"]);
        assert_eq!(m.packages_for("cv2"), ["opencv-python"]);
        assert_eq!(m.packages_for("psycopg2"), ["psycopg2-binary"]);
        assert!(m.is_mapped("PIL"));
    }

    #[test]
    fn unmapped_module_defaults_to_its_name() {
        let m = PackageMap::builtin();
        assert_eq!(m.packages_for("requests"), ["requests"]);
        assert!(!m.is_mapped("requests"));
    }

    #[test]
    fn overrides_replace_builtin_entries() {
        let mut extra = BTreeMap::new();
        extra.insert("yaml".to_owned(), vec!["ruamel.yaml".to_owned()]);
        extra.insert("jwt".to_owned(), vec!["PyJWT".to_owned()]);
        let m = PackageMap::builtin().with_overrides(&extra);
        assert_eq!(m.packages_for("yaml"), ["ruamel.yaml"]);
        assert_eq!(m.packages_for("jwt"), ["PyJWT"]);
    }
}
