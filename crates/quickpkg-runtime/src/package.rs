//! Installer package assembly through `pkgbuild` and `productbuild`.

use crate::process::{CommandRunner, Invocation};
use crate::RuntimeError;
use quickpkg_schema::{set_relocatable, AppMetadata, Compression, Ownership, PackageType};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub const PKGBUILD: &str = "/usr/bin/pkgbuild";
pub const PRODUCTBUILD: &str = "/usr/bin/productbuild";
pub const DEFAULT_INSTALL_LOCATION: &str = "/Applications";

/// Identity and keychain options for the tool that writes the final package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SigningOptions {
    pub identity: Option<String>,
    pub keychain: Option<String>,
    pub cert: Option<String>,
}

impl SigningOptions {
    fn args(&self) -> Vec<String> {
        let mut args = Vec::new();
        for (flag, value) in [
            ("--sign", &self.identity),
            ("--keychain", &self.keychain),
            ("--cert", &self.cert),
        ] {
            if let Some(value) = value {
                args.push(flag.to_owned());
                args.push(value.clone());
            }
        }
        args
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageOptions {
    pub install_location: String,
    pub ownership: Option<Ownership>,
    pub compression: Compression,
    pub package_type: PackageType,
    pub relocatable: bool,
    pub signing: SigningOptions,
    /// Output path or template; `None` uses the default template.
    pub output: Option<PathBuf>,
}

impl Default for PackageOptions {
    fn default() -> Self {
        Self {
            install_location: DEFAULT_INSTALL_LOCATION.to_owned(),
            ownership: None,
            compression: Compression::default(),
            package_type: PackageType::default(),
            relocatable: false,
            signing: SigningOptions::default(),
            output: None,
        }
    }
}

/// Inputs for one package build, all borrowed from the staged run.
#[derive(Debug, Clone, Copy)]
pub struct PackageRequest<'a> {
    pub payload: &'a Path,
    pub scripts: Option<&'a Path>,
    pub metadata: &'a AppMetadata,
    /// Scratch directory for the component plist and intermediate package.
    pub work_dir: &'a Path,
    pub output: &'a Path,
}

pub struct PackageBuilder {
    runner: Arc<dyn CommandRunner>,
}

impl PackageBuilder {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Write the component property list for the payload and return its path.
    pub fn analyze(
        &self,
        request: &PackageRequest<'_>,
        options: &PackageOptions,
    ) -> Result<PathBuf, RuntimeError> {
        let meta = request.metadata;
        let plist = request
            .work_dir
            .join(format!("{}.plist", meta.identifier));
        let inv = Invocation::new(PKGBUILD)
            .arg("--analyze")
            .arg("--root")
            .arg_path(request.payload)
            .args(["--identifier", meta.identifier.as_str()])
            .args(["--version", meta.version.as_str()])
            .args(["--install-location", options.install_location.as_str()])
            .arg_path(&plist);
        let result = self.runner.run_checked(&inv)?;
        if !result.stdout.is_empty() {
            info!("{}", result.stdout);
        }
        Ok(plist)
    }

    /// Build the package described by `request` and return the output path.
    pub fn build(
        &self,
        request: &PackageRequest<'_>,
        options: &PackageOptions,
    ) -> Result<PathBuf, RuntimeError> {
        let meta = request.metadata;
        let component_plist = self.analyze(request, options)?;
        if !options.relocatable {
            debug!("marking {} as not relocatable", component_plist.display());
            set_relocatable(&component_plist, false)?;
        }

        let component_pkg = match options.package_type {
            PackageType::Component => request.output.to_path_buf(),
            PackageType::Distribution => request
                .work_dir
                .join(format!("{}-component.pkg", meta.name.replace(' ', ""))),
        };

        let mut inv = Invocation::new(PKGBUILD)
            .arg("--root")
            .arg_path(request.payload)
            .arg("--component-plist")
            .arg_path(&component_plist)
            .args(["--identifier", meta.identifier.as_str()])
            .args(["--version", meta.version.as_str()])
            .args(["--install-location", options.install_location.as_str()]);
        if let Some(scripts) = request.scripts {
            info!("scripts path: {}", scripts.display());
            inv = inv.arg("--scripts").arg_path(scripts);
        }
        if let Some(ownership) = options.ownership {
            inv = inv.args(["--ownership", ownership.as_str()]);
        }
        inv = inv.args(["--compression", options.compression.as_str()]);
        if let Some(min_os) = &meta.minimum_system_version {
            inv = inv.args(["--min-os-version", min_os.as_str()]);
        }
        if options.package_type == PackageType::Component {
            inv = inv.args(options.signing.args());
        }
        inv = inv.arg_path(&component_pkg);

        info!("building package: {}", component_pkg.display());
        self.run_builder(&inv)?;

        if options.package_type == PackageType::Distribution {
            let inv = Invocation::new(PRODUCTBUILD)
                .arg("--package")
                .arg_path(&component_pkg)
                .args(options.signing.args())
                .arg_path(request.output);
            info!("building distribution package: {}", request.output.display());
            self.run_builder(&inv)?;
        }

        Ok(request.output.to_path_buf())
    }

    fn run_builder(&self, inv: &Invocation) -> Result<(), RuntimeError> {
        let result = self.runner.run(inv)?;
        if !result.stdout.is_empty() {
            info!("{}", result.stdout);
        }
        if result.success() {
            Ok(())
        } else {
            Err(RuntimeError::PackageBuildFailed(format!(
                "{} ({}) {}",
                inv.program_name(),
                result.exit_code,
                result.stderr
            )))
        }
    }
}
