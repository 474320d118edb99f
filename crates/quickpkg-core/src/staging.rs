use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const PREFIX: &str = "quickpkg-";
const PAYLOAD: &str = "payload";
const UNARCHIVE: &str = "unarchive";
const SCRIPTS: &str = "scripts";

/// Run-scoped working directory.
///
/// Laid out as `payload/` plus, on demand, `unarchive/` and `scripts/`. The
/// whole tree is removed when the area is dropped, unless cleanup was turned
/// off for inspection.
#[derive(Debug)]
pub struct StagingArea {
    root: PathBuf,
    cleanup: bool,
}

impl StagingArea {
    /// Create a fresh `quickpkg-XXXXXX` directory under `parent`, or under the
    /// system temp directory.
    pub fn create(parent: Option<&Path>, cleanup: bool) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(PREFIX);
        let dir = match parent {
            Some(parent) => builder.tempdir_in(parent)?,
            None => builder.tempdir()?,
        };
        let area = Self {
            root: dir.keep(),
            cleanup,
        };
        fs::create_dir(area.payload_dir())?;
        debug!("staging area: {}", area.root.display());
        Ok(area)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn payload_dir(&self) -> PathBuf {
        self.root.join(PAYLOAD)
    }

    pub fn unarchive_dir(&self) -> PathBuf {
        self.root.join(UNARCHIVE)
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.root.join(SCRIPTS)
    }

    /// Create `unarchive/` and return it.
    pub fn create_unarchive_dir(&self) -> io::Result<PathBuf> {
        let dir = self.unarchive_dir();
        fs::create_dir(&dir)?;
        Ok(dir)
    }

    /// Create an empty `scripts/` and return it.
    pub fn create_scripts_dir(&self) -> io::Result<PathBuf> {
        let dir = self.scripts_dir();
        fs::create_dir(&dir)?;
        Ok(dir)
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        if !self.cleanup {
            info!("leaving staging area at {}", self.root.display());
            return;
        }
        match fs::remove_dir_all(&self.root) {
            Ok(()) => debug!("removed staging area {}", self.root.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "failed to remove staging area {}: {e}",
                self.root.display()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_and_cleanup() {
        let parent = tempfile::tempdir().unwrap();
        let area = StagingArea::create(Some(parent.path()), true).unwrap();
        let root = area.root().to_path_buf();

        assert!(root.starts_with(parent.path()));
        assert!(root
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("quickpkg-"));
        assert!(area.payload_dir().is_dir());
        assert!(!area.unarchive_dir().exists());

        let unarchive = area.create_unarchive_dir().unwrap();
        let scripts = area.create_scripts_dir().unwrap();
        assert!(unarchive.is_dir());
        assert!(scripts.is_dir());

        drop(area);
        assert!(!root.exists());
    }

    #[test]
    fn disabled_cleanup_keeps_directory() {
        let parent = tempfile::tempdir().unwrap();
        let area = StagingArea::create(Some(parent.path()), false).unwrap();
        let root = area.root().to_path_buf();
        drop(area);
        assert!(root.join("payload").is_dir());
    }

    #[test]
    fn each_run_gets_its_own_directory() {
        let parent = tempfile::tempdir().unwrap();
        let a = StagingArea::create(Some(parent.path()), true).unwrap();
        let b = StagingArea::create(Some(parent.path()), true).unwrap();
        assert_ne!(a.root(), b.root());
    }

    #[test]
    fn missing_parent_is_an_error() {
        let parent = tempfile::tempdir().unwrap();
        let missing = parent.path().join("nope");
        assert!(StagingArea::create(Some(&missing), true).is_err());
    }
}
