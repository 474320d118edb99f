use crate::copy::copy_tree;
use crate::resolve::{find_applications, require_single};
use crate::scripts::{merge_scripts, ScriptSources};
use crate::staging::StagingArea;
use crate::CoreError;
use quickpkg_runtime::{
    ArchiveStager, CommandRunner, PackageBuilder, PackageOptions, PackageRequest, VolumeManager,
};
use quickpkg_schema::{resolve_output_path, AppMetadata, InputKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// What to stage and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRequest {
    pub input: PathBuf,
    /// Parent of the staging directory; the system temp dir when `None`.
    pub staging_parent: Option<PathBuf>,
    pub scripts: Option<PathBuf>,
    pub preinstall: Option<PathBuf>,
    pub postinstall: Option<PathBuf>,
    /// Remove the staging area and detach volumes when done.
    pub cleanup: bool,
}

impl StageRequest {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            staging_parent: None,
            scripts: None,
            preinstall: None,
            postinstall: None,
            cleanup: true,
        }
    }

    fn script_sources(&self) -> ScriptSources<'_> {
        ScriptSources {
            folder: self.scripts.as_deref(),
            preinstall: self.preinstall.as_deref(),
            postinstall: self.postinstall.as_deref(),
        }
    }
}

/// A staged application ready for packaging.
///
/// Owns the staging area; dropping this value tears it down.
#[derive(Debug)]
pub struct StagedPayload {
    staging: StagingArea,
    app: PathBuf,
    metadata: AppMetadata,
    scripts: Option<PathBuf>,
}

impl StagedPayload {
    pub fn payload_dir(&self) -> PathBuf {
        self.staging.payload_dir()
    }

    /// The copied bundle inside the payload directory.
    pub fn app_path(&self) -> &Path {
        &self.app
    }

    pub fn metadata(&self) -> &AppMetadata {
        &self.metadata
    }

    pub fn scripts_dir(&self) -> Option<&Path> {
        self.scripts.as_deref()
    }

    pub fn staging_root(&self) -> &Path {
        self.staging.root()
    }
}

/// Result of a successful package build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildResult {
    pub package: PathBuf,
    pub metadata: AppMetadata,
}

/// Detaches every volume this run attached when dropped.
struct DetachGuard<'a> {
    volumes: &'a VolumeManager,
    enabled: bool,
}

impl Drop for DetachGuard<'_> {
    fn drop(&mut self) {
        if self.enabled {
            self.volumes.detach_all();
        }
    }
}

/// Turns an installer item into a staged payload and, optionally, a package.
pub struct Pipeline {
    volumes: VolumeManager,
    archives: ArchiveStager,
    packages: PackageBuilder,
}

impl Pipeline {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            volumes: VolumeManager::new(runner.clone()),
            archives: ArchiveStager::new(runner.clone()),
            packages: PackageBuilder::new(runner),
        }
    }

    pub fn volumes(&self) -> &VolumeManager {
        &self.volumes
    }

    /// Locate the application in `request.input` and copy it into a fresh
    /// staging area.
    ///
    /// Volumes attached along the way are detached once the copy is done, or
    /// as soon as any step fails. Both that and removal of the staging area
    /// are skipped when `request.cleanup` is off.
    pub fn stage(&self, request: &StageRequest) -> Result<StagedPayload, CoreError> {
        let input = request.input.as_path();
        let kind = InputKind::from_path(input).ok_or_else(|| {
            CoreError::UnsupportedInput(format!(
                "{} is not a supported installer item (expected one of: {})",
                input.display(),
                InputKind::supported_extensions()
            ))
        })?;
        if !input.exists() {
            return Err(CoreError::InputNotFound(input.to_path_buf()));
        }
        info!("processing {kind}: {}", input.display());

        let staging = StagingArea::create(request.staging_parent.as_deref(), request.cleanup)?;
        let guard = DetachGuard {
            volumes: &self.volumes,
            enabled: request.cleanup,
        };

        let app = self.acquire(kind, input, &staging)?;
        info!("found application: {}", app.display());

        let name = app.file_name().ok_or(CoreError::ApplicationNotFound)?;
        let staged_app = staging.payload_dir().join(name);
        copy_tree(&app, &staged_app)?;
        debug!("copied {} to {}", app.display(), staged_app.display());
        drop(guard);

        let metadata = AppMetadata::from_bundle(&staged_app)?;
        info!(
            "name: {}, identifier: {}, version: {}",
            metadata.name, metadata.identifier, metadata.version
        );
        if let Some(min_os) = &metadata.minimum_system_version {
            info!("minimum macOS: {min_os}");
        }

        let scripts = merge_scripts(&request.script_sources(), &staging)?;

        Ok(StagedPayload {
            staging,
            app: staged_app,
            metadata,
            scripts,
        })
    }

    fn acquire(
        &self,
        kind: InputKind,
        input: &Path,
        staging: &StagingArea,
    ) -> Result<PathBuf, CoreError> {
        let search = match kind {
            InputKind::Bundle => return Ok(input.to_path_buf()),
            InputKind::DiskImage => self
                .volumes
                .attach(input)
                .map_err(CoreError::Acquisition)?,
            InputKind::ZipArchive => {
                let dir = staging.create_unarchive_dir()?;
                self.archives
                    .extract_zip(input, &dir)
                    .map_err(CoreError::Acquisition)?;
                vec![dir]
            }
            InputKind::SelfExtractingArchive => {
                let dir = staging.create_unarchive_dir()?;
                self.archives
                    .extract_self_extracting(input, &dir)
                    .map_err(CoreError::Acquisition)?;
                vec![dir]
            }
        };
        require_single(find_applications(&search))
    }

    /// Stage `request` and build a package from it.
    pub fn build(
        &self,
        request: &StageRequest,
        options: &PackageOptions,
    ) -> Result<BuildResult, CoreError> {
        let staged = self.stage(request)?;
        let output = resolve_output_path(options.output.as_deref(), staged.metadata());
        let payload = staged.payload_dir();

        let package = self.packages.build(
            &PackageRequest {
                payload: &payload,
                scripts: staged.scripts_dir(),
                metadata: staged.metadata(),
                work_dir: staged.staging_root(),
                output: &output,
            },
            options,
        )?;

        Ok(BuildResult {
            package,
            metadata: staged.metadata.clone(),
        })
    }
}
