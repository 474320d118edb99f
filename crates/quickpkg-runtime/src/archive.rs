use crate::process::{CommandRunner, Invocation};
use crate::RuntimeError;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub const UNZIP: &str = "/usr/bin/unzip";
pub const XIP: &str = "/usr/bin/xip";

/// Expands zip and xip archives with the system tools.
pub struct ArchiveStager {
    runner: Arc<dyn CommandRunner>,
}

impl ArchiveStager {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    pub fn extract_zip(&self, archive: &Path, destination: &Path) -> Result<(), RuntimeError> {
        info!("unarchiving {}", archive.display());
        let inv = Invocation::new(UNZIP)
            .arg("-q")
            .arg_path(archive)
            .arg("-d")
            .arg_path(destination);
        self.expand(archive, &inv)
    }

    /// `xip` always expands into its working directory.
    pub fn extract_self_extracting(
        &self,
        archive: &Path,
        destination: &Path,
    ) -> Result<(), RuntimeError> {
        info!("expanding {}", archive.display());
        let inv = Invocation::new(XIP)
            .arg("--expand")
            .arg_path(archive)
            .current_dir(destination);
        self.expand(archive, &inv)
    }

    fn expand(&self, archive: &Path, inv: &Invocation) -> Result<(), RuntimeError> {
        let result = self.runner.run(inv)?;
        if result.success() {
            Ok(())
        } else {
            Err(RuntimeError::ExtractionFailed(format!(
                "{} (exit {}): {}",
                archive.display(),
                result.exit_code,
                result.stderr
            )))
        }
    }
}
