use std::fs;
use std::io;
use std::path::Path;
use walkdir::WalkDir;

/// Copy the directory tree at `src` to `dst`.
///
/// Symbolic links inside the tree are recreated as links, not followed.
/// File permissions are kept; directory permissions are applied once the
/// tree is complete so read-only directories can still be filled.
pub fn copy_tree(src: &Path, dst: &Path) -> io::Result<()> {
    let mut dir_permissions = Vec::new();

    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| io::Error::other(e.to_string()))?;
        let target = dst.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
            dir_permissions.push((target, entry.metadata()?.permissions()));
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }

    for (dir, permissions) in dir_permissions.into_iter().rev() {
        fs::set_permissions(dir, permissions)?;
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(src)?, dst)
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, _dst: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("cannot copy symbolic link {}", src.display()),
    ))
}
