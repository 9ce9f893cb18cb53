use std::fs;
use std::io;
use std::path::Path;

/// Grant the owner write access to every entry under `root` (and traverse
/// access to every directory) so a subsequent recursive delete can succeed.
pub fn make_tree_writable(root: &Path) -> io::Result<()> {
    let meta = fs::symlink_metadata(root)?;
    if meta.file_type().is_symlink() {
        return Ok(());
    }
    if meta.is_dir() {
        set_writable(root, &meta, true)?;
        for entry in fs::read_dir(root)? {
            make_tree_writable(&entry?.path())?;
        }
    } else {
        set_writable(root, &meta, false)?;
    }
    Ok(())
}

#[cfg(unix)]
fn set_writable(path: &Path, meta: &fs::Metadata, is_dir: bool) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mode = meta.permissions().mode();
    let wanted = if is_dir { mode | 0o700 } else { mode | 0o200 };
    if wanted != mode {
        fs::set_permissions(path, fs::Permissions::from_mode(wanted))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_writable(path: &Path, meta: &fs::Metadata, _is_dir: bool) -> io::Result<()> {
    let mut perms = meta.permissions();
    if perms.readonly() {
        #[allow(clippy::permissions_set_readonly_false)]
        perms.set_readonly(false);
        fs::set_permissions(path, perms)?;
    }
    Ok(())
}
