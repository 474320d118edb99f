use crate::document::{parse_dictionary, DocumentError};
use plist::{Dictionary, Value};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("application at {0} does not have an Info.plist")]
    InfoPlistMissing(PathBuf),
    #[error("failed to parse Info.plist: missing {0}")]
    MissingField(&'static str),
    #[error("failed to parse Info.plist: {0}")]
    Document(#[from] DocumentError),
}

const NAME_KEYS: &[&str] = &["CFBundleName", "CFBundleDisplayName"];
const IDENTIFIER_KEYS: &[&str] = &["CFBundleIdentifier"];
const VERSION_KEYS: &[&str] = &["CFBundleShortVersionString", "CFBundleVersion"];
const MINIMUM_SYSTEM_KEY: &str = "LSMinimumSystemVersion";

/// Fields of an application's `Info.plist` needed to name and build a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppMetadata {
    pub name: String,
    pub identifier: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum_system_version: Option<String>,
}

impl AppMetadata {
    /// Read `Contents/Info.plist` of the bundle at `bundle`.
    pub fn from_bundle(bundle: &Path) -> Result<Self, MetadataError> {
        let info_plist = bundle.join("Contents").join("Info.plist");
        if !info_plist.is_file() {
            return Err(MetadataError::InfoPlistMissing(bundle.to_path_buf()));
        }
        let data = std::fs::read(&info_plist).map_err(DocumentError::from)?;
        let info = parse_dictionary(&data)?;
        Self::from_info(&info, bundle)
    }

    /// Validate a parsed `Info.plist` in one pass.
    ///
    /// Each field walks its fallback keys in order and takes the first
    /// non-empty string. The name finally falls back to the bundle's file
    /// stem; identifier and version have no fallback.
    pub fn from_info(info: &Dictionary, bundle: &Path) -> Result<Self, MetadataError> {
        let name = first_non_empty(info, NAME_KEYS)
            .or_else(|| {
                bundle
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .filter(|stem| !stem.is_empty())
            })
            .ok_or(MetadataError::MissingField("bundle name"))?;
        let identifier = first_non_empty(info, IDENTIFIER_KEYS)
            .ok_or(MetadataError::MissingField("CFBundleIdentifier"))?;
        let version = first_non_empty(info, VERSION_KEYS)
            .ok_or(MetadataError::MissingField("version information"))?;
        let minimum_system_version = first_non_empty(info, &[MINIMUM_SYSTEM_KEY]);

        Ok(Self {
            name,
            identifier,
            version,
            minimum_system_version,
        })
    }
}

fn first_non_empty(info: &Dictionary, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| info.get(key).and_then(Value::as_string))
        .find(|value| !value.is_empty())
        .map(str::to_owned)
}
