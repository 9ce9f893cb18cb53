use crate::report::ScriptEntry;
use runveer_schema::{list_sources, ModuleClassifier, ScriptProfile};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Runnable scripts in `project_dir`, sorted, minus `exclude`d file names.
pub fn discover_scripts(
    project_dir: &Path,
    extension: &str,
    exclude: &[String],
) -> io::Result<Vec<PathBuf>> {
    Ok(list_sources(project_dir, extension)?
        .into_iter()
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_none_or(|n| !exclude.iter().any(|e| e == n))
        })
        .collect())
}

/// Profile each script for presentation; unreadable scripts are kept with
/// no profile.
pub fn describe_scripts(
    scripts: Vec<PathBuf>,
    classifier: &ModuleClassifier,
    privileged_port: u16,
) -> Vec<ScriptEntry> {
    scripts
        .into_iter()
        .map(|path| {
            let profile = match ScriptProfile::from_file(&path, privileged_port) {
                Ok(profile) => Some(profile),
                Err(e) => {
                    debug!("{e}");
                    None
                }
            };
            let has_dependencies = profile
                .as_ref()
                .is_some_and(|p| p.has_external_dependencies(classifier));
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            ScriptEntry {
                path,
                name,
                profile,
                has_dependencies,
            }
        })
        .collect()
}
