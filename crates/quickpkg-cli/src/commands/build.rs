use super::{
    json_pretty, skip_prereqs, spin_fail, spin_ok, spinner, CommandError, EXIT_SUCCESS,
};
use quickpkg_core::{Pipeline, StageRequest};
use quickpkg_runtime::{
    check_prereqs, format_missing, PackageOptions, SigningOptions, SystemRunner,
    DEFAULT_INSTALL_LOCATION,
};
use quickpkg_schema::{
    expand_tilde, normalize_input_path, Compression, Defaults, InputKind, Ownership, PackageType,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Default, clap::Args)]
pub struct BuildArgs {
    /// Path to the installer item (.app, .dmg, .zip, or .xip).
    pub item: String,
    /// Folder with scripts passed to pkgbuild.
    #[arg(long)]
    pub scripts: Option<String>,
    /// Preinstall script, merged with the scripts folder.
    #[arg(long, visible_alias = "pre")]
    pub preinstall: Option<String>,
    /// Postinstall script, merged with the scripts folder.
    #[arg(long, visible_alias = "post")]
    pub postinstall: Option<String>,
    /// Install location [default: /Applications].
    #[arg(long)]
    pub install_location: Option<String>,
    /// Payload ownership: recommended, preserve, or preserve-other.
    #[arg(long)]
    pub ownership: Option<Ownership>,
    /// Payload compression: latest or legacy [default: latest].
    #[arg(long)]
    pub compression: Option<Compression>,
    /// Build a bare component package.
    #[arg(long, conflicts_with = "distribution")]
    pub component: bool,
    /// Wrap the component in a distribution package (the default).
    #[arg(long)]
    pub distribution: bool,
    /// Output path; may contain {name}, {version} and {identifier}.
    #[arg(short, long, visible_alias = "out")]
    pub output: Option<String>,
    /// Remove temporary files and detach disk images (the default).
    #[arg(long, overrides_with = "no_clean")]
    pub clean: bool,
    /// Keep temporary files and leave disk images attached.
    #[arg(long, overrides_with = "clean")]
    pub no_clean: bool,
    /// Allow the installer to relocate the application if it was moved.
    #[arg(long, overrides_with = "no_relocatable")]
    pub relocatable: bool,
    /// Always install to the install location (the default).
    #[arg(long, overrides_with = "relocatable")]
    pub no_relocatable: bool,
    /// Signing identity.
    #[arg(long)]
    pub sign: Option<String>,
    /// Keychain to search for the signing identity.
    #[arg(long)]
    pub keychain: Option<String>,
    /// Intermediate certificate to embed in the signature.
    #[arg(long)]
    pub cert: Option<String>,
    /// Create the staging directory here instead of the temp dir.
    #[arg(long)]
    pub staging_dir: Option<PathBuf>,
}

fn flag(yes: bool, no: bool) -> Option<bool> {
    match (yes, no) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

fn user_path(raw: &str) -> Result<PathBuf, CommandError> {
    normalize_input_path(raw)
        .map_err(|e| CommandError::usage(format!("cannot resolve path {raw}: {e}")))
}

fn optional_path(raw: Option<&String>) -> Result<Option<PathBuf>, CommandError> {
    raw.map(|r| user_path(r)).transpose()
}

/// Merge command-line flags over config-file defaults over built-in ones.
pub fn resolve(
    args: &BuildArgs,
    defaults: &Defaults,
) -> Result<(StageRequest, PackageOptions), CommandError> {
    let input = user_path(&args.item)?;

    let package_type = if args.component {
        PackageType::Component
    } else if args.distribution {
        PackageType::Distribution
    } else {
        defaults.package_type.unwrap_or_default()
    };

    let request = StageRequest {
        input,
        staging_parent: args.staging_dir.clone(),
        scripts: optional_path(args.scripts.as_ref())?,
        preinstall: optional_path(args.preinstall.as_ref())?,
        postinstall: optional_path(args.postinstall.as_ref())?,
        cleanup: flag(args.clean, args.no_clean)
            .or(defaults.clean)
            .unwrap_or(true),
    };

    let options = PackageOptions {
        install_location: args
            .install_location
            .clone()
            .or_else(|| defaults.install_location.clone())
            .unwrap_or_else(|| DEFAULT_INSTALL_LOCATION.to_owned()),
        ownership: args.ownership.or(defaults.ownership),
        compression: args
            .compression
            .or(defaults.compression)
            .unwrap_or_default(),
        package_type,
        relocatable: flag(args.relocatable, args.no_relocatable)
            .or(defaults.relocatable)
            .unwrap_or(false),
        signing: SigningOptions {
            identity: args.sign.clone().or_else(|| defaults.sign.clone()),
            keychain: args.keychain.clone().or_else(|| defaults.keychain.clone()),
            cert: args.cert.clone().or_else(|| defaults.cert.clone()),
        },
        output: args
            .output
            .as_deref()
            .or(defaults.output.as_deref())
            .map(expand_tilde),
    };

    Ok((request, options))
}

pub fn run(args: &BuildArgs, defaults: &Defaults, json: bool) -> Result<u8, CommandError> {
    let (request, options) = resolve(args, defaults)?;

    let kind = InputKind::from_path(&request.input).ok_or_else(|| {
        CommandError::usage(format!(
            "{} is not a supported installer item (expected one of: {})",
            request.input.display(),
            InputKind::supported_extensions()
        ))
    })?;

    if skip_prereqs() {
        debug!("skipping prerequisite checks");
    } else {
        let missing = check_prereqs(kind, options.package_type);
        if !missing.is_empty() {
            return Err(CommandError::failure(format_missing(&missing)));
        }
    }

    let pipeline = Pipeline::new(Arc::new(SystemRunner::new()));
    let pb = if json {
        None
    } else {
        Some(spinner(&format!("packaging {}...", request.input.display())))
    };

    let result = match pipeline.build(&request, &options) {
        Ok(r) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, "package built");
            }
            r
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, "build failed");
            }
            return Err(e.into());
        }
    };

    if json {
        let payload = serde_json::json!({
            "package": result.package,
            "metadata": result.metadata,
            "package_type": options.package_type,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("{}", result.package.display());
    }
    Ok(EXIT_SUCCESS)
}
