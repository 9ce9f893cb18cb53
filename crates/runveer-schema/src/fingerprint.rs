use crate::types::Fingerprint;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Project source files: regular files directly inside `project_dir` whose
/// extension is `extension`, sorted by path.
pub fn list_sources(project_dir: &Path, extension: &str) -> io::Result<Vec<PathBuf>> {
    let mut sources: Vec<PathBuf> = std::fs::read_dir(project_dir)?
        .flatten()
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == extension))
        .collect();
    sources.sort();
    Ok(sources)
}

/// Compute the content identity of a project.
///
/// Every source file's bytes are streamed into one blake3 hasher in sorted
/// path order, followed by the manifest's bytes when `manifest` exists.
/// Files that cannot be read are skipped: the fingerprint may then
/// under-detect changes to them, but computing it never fails on a single
/// bad file. Modification times play no part.
pub fn compute_fingerprint(
    project_dir: &Path,
    extension: &str,
    manifest: &Path,
) -> io::Result<Fingerprint> {
    let mut hasher = blake3::Hasher::new();

    for source in list_sources(project_dir, extension)? {
        hash_file(&mut hasher, &source);
    }
    if manifest.is_file() {
        hash_file(&mut hasher, manifest);
    }

    Ok(Fingerprint::new(hasher.finalize().to_hex().to_string()))
}

fn hash_file(hasher: &mut blake3::Hasher, path: &Path) {
    let result = File::open(path).and_then(|mut f| io::copy(&mut f, hasher));
    if let Err(e) = result {
        debug!("skipping unreadable file {} in fingerprint: {e}", path.display());
    }
}
