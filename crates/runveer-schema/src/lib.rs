//! Script analysis, project identity, and dependency manifests for runveer.
//!
//! This crate defines the pure layer: import extraction from Python sources
//! (`extract_imports`), standard-library/local classification
//! (`ModuleClassifier`), script trait heuristics (`ScriptProfile`),
//! content fingerprinting of a project (`compute_fingerprint`), the
//! import-to-package table (`PackageMap`), dependency resolution
//! (`Resolver`), and the newline-delimited `Manifest` format.

pub mod analysis;
pub mod classify;
pub mod fingerprint;
pub mod imports;
pub mod manifest;
pub mod packages;
pub mod resolve;
pub mod stdlib;
pub mod types;

pub use analysis::{
    has_external_dependencies, is_interactive, is_privileged, is_web_ui, ScriptProfile,
    DEFAULT_PRIVILEGED_PORT,
};
pub use classify::{ModuleClassifier, DEFAULT_LOCAL_MODULES};
pub use fingerprint::{compute_fingerprint, list_sources};
pub use imports::{extract_imports, scan_import_lines, ImportSet};
pub use manifest::{Manifest, ManifestError};
pub use packages::{PackageMap, CONFIG_LOADER_PACKAGE, CONFIG_LOADER_TRIGGERS, WEB_UI_MODULE};
pub use resolve::{Resolution, Resolver, DEV_MANIFEST_PACKAGES, DEV_PACKAGES};
pub use stdlib::BUNDLED_STDLIB;
pub use types::{Fingerprint, PackageName};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("failed to read script '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
