use crate::CoreError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const APP_EXTENSION: &str = "app";

fn is_application(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == APP_EXTENSION) && path.is_dir()
}

/// Application bundles at the top level of each directory.
///
/// Subdirectories are not searched. Directories that cannot be read are
/// skipped. Results are sorted per directory.
pub fn find_applications(dirs: &[PathBuf]) -> Vec<PathBuf> {
    let mut apps = Vec::new();
    for dir in dirs {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("skipping {}: {e}", dir.display());
                continue;
            }
        };
        let mut found: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| is_application(path))
            .collect();
        found.sort();
        apps.extend(found);
    }
    apps
}

/// Exactly one application, or the matching error.
pub fn require_single(mut apps: Vec<PathBuf>) -> Result<PathBuf, CoreError> {
    match apps.len() {
        0 => Err(CoreError::ApplicationNotFound),
        1 => Ok(apps.remove(0)),
        _ => Err(CoreError::AmbiguousApplication(apps)),
    }
}
