use crate::copy::copy_tree;
use crate::staging::StagingArea;
use crate::CoreError;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

#[cfg(unix)]
const SCRIPT_MODE: u32 = 0o755;
const SCRIPT_NAMES: [&str; 2] = ["preinstall", "postinstall"];

/// Where install scripts come from.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptSources<'a> {
    pub folder: Option<&'a Path>,
    pub preinstall: Option<&'a Path>,
    pub postinstall: Option<&'a Path>,
}

/// Resolve the scripts directory handed to `pkgbuild`.
///
/// A lone scripts folder is used in place. Individual preinstall or
/// postinstall scripts are merged with the folder's contents into a fresh
/// `scripts/` inside the staging area.
pub fn merge_scripts(
    sources: &ScriptSources<'_>,
    staging: &StagingArea,
) -> Result<Option<PathBuf>, CoreError> {
    if let Some(folder) = sources.folder {
        if !folder.exists() {
            return Err(CoreError::ScriptNotFound(folder.to_path_buf()));
        }
    }
    if sources.preinstall.is_none() && sources.postinstall.is_none() {
        return Ok(sources.folder.map(Path::to_path_buf));
    }

    let scripts_dir = staging.create_scripts_dir()?;
    if let Some(folder) = sources.folder {
        info!(
            "copying {} to {}",
            folder.display(),
            scripts_dir.display()
        );
        for entry in fs::read_dir(folder)? {
            let entry = entry?;
            let target = scripts_dir.join(entry.file_name());
            if entry.file_type()?.is_dir() {
                copy_tree(&entry.path(), &target)?;
            } else {
                fs::copy(entry.path(), &target)?;
            }
        }
        for name in SCRIPT_NAMES {
            let script = scripts_dir.join(name);
            if script.is_file() {
                make_executable(&script)?;
            }
        }
    }

    for (name, source) in SCRIPT_NAMES
        .into_iter()
        .zip([sources.preinstall, sources.postinstall])
    {
        let Some(source) = source else { continue };
        if !source.is_file() {
            return Err(CoreError::ScriptNotFound(source.to_path_buf()));
        }
        let target = scripts_dir.join(name);
        if target.symlink_metadata().is_ok() {
            return Err(CoreError::ScriptConflict(name.to_owned()));
        }
        fs::copy(source, &target)?;
        make_executable(&target)?;
        info!("copied {} to {}", source.display(), target.display());
    }

    Ok(Some(scripts_dir))
}

#[cfg(unix)]
fn make_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(SCRIPT_MODE))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}
