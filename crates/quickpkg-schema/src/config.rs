use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

/// Payload ownership mode passed through to `pkgbuild --ownership`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Ownership {
    Recommended,
    Preserve,
    PreserveOther,
}

impl Ownership {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Recommended => "recommended",
            Self::Preserve => "preserve",
            Self::PreserveOther => "preserve-other",
        }
    }
}

/// Payload compression passed through to `pkgbuild --compression`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Compression {
    #[default]
    Latest,
    Legacy,
}

impl Compression {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Latest => "latest",
            Self::Legacy => "legacy",
        }
    }
}

/// Whether the result is a bare component package or a distribution
/// package wrapping it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PackageType {
    Component,
    #[default]
    Distribution,
}

impl PackageType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Component => "component",
            Self::Distribution => "distribution",
        }
    }
}

macro_rules! str_enum_impls {
    ($ty:ty, [$($variant:expr),+ $(,)?]) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let candidates = [$($variant),+];
                candidates
                    .into_iter()
                    .find(|c| c.as_str() == s)
                    .ok_or_else(|| {
                        let names: Vec<_> = candidates.iter().map(|c| c.as_str()).collect();
                        format!("invalid value '{s}', expected one of: {}", names.join(", "))
                    })
            }
        }
    };
}

str_enum_impls!(
    Ownership,
    [
        Ownership::Recommended,
        Ownership::Preserve,
        Ownership::PreserveOther
    ]
);
str_enum_impls!(Compression, [Compression::Latest, Compression::Legacy]);
str_enum_impls!(PackageType, [PackageType::Component, PackageType::Distribution]);

/// User defaults read from `~/.config/quickpkg/config.toml`.
///
/// Every key is optional; command-line flags take precedence over these
/// values, which in turn take precedence over built-in defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Defaults {
    #[serde(default)]
    pub install_location: Option<String>,
    #[serde(default)]
    pub ownership: Option<Ownership>,
    #[serde(default)]
    pub compression: Option<Compression>,
    #[serde(default)]
    pub package_type: Option<PackageType>,
    #[serde(default)]
    pub relocatable: Option<bool>,
    #[serde(default)]
    pub clean: Option<bool>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub sign: Option<String>,
    #[serde(default)]
    pub keychain: Option<String>,
    #[serde(default)]
    pub cert: Option<String>,
}

impl Defaults {
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Load the per-user config file if there is one.
    pub fn load_default() -> Result<Self, ConfigError> {
        match default_config_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    let home = std::env::var("HOME").ok()?;
    Some(PathBuf::from(home).join(".config/quickpkg/config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let defaults = Defaults::parse(
            r#"
install_location = "/Applications/Utilities"
ownership = "preserve-other"
compression = "legacy"
package_type = "component"
relocatable = true
clean = false
output = "~/Packages/{name}-{version}.pkg"
sign = "Developer ID Installer: Example Corp (ABCDE12345)"
keychain = "/Library/Keychains/System.keychain"
"#,
        )
        .unwrap();

        assert_eq!(
            defaults.install_location.as_deref(),
            Some("/Applications/Utilities")
        );
        assert_eq!(defaults.ownership, Some(Ownership::PreserveOther));
        assert_eq!(defaults.compression, Some(Compression::Legacy));
        assert_eq!(defaults.package_type, Some(PackageType::Component));
        assert_eq!(defaults.relocatable, Some(true));
        assert_eq!(defaults.clean, Some(false));
        assert!(defaults.cert.is_none());
    }

    #[test]
    fn empty_config_is_all_none() {
        assert_eq!(Defaults::parse("").unwrap(), Defaults::default());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = Defaults::parse("install-location = \"/Applications\"").unwrap_err();
        assert!(matches!(err, ConfigError::ParseToml(_)));
    }

    #[test]
    fn invalid_enum_value_is_rejected() {
        assert!(Defaults::parse("ownership = \"everyone\"").is_err());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "relocatable = false\n").unwrap();
        let defaults = Defaults::load(&path).unwrap();
        assert_eq!(defaults.relocatable, Some(false));
    }

    #[test]
    fn enums_parse_from_cli_strings() {
        assert_eq!(
            "preserve-other".parse::<Ownership>().unwrap(),
            Ownership::PreserveOther
        );
        assert_eq!("latest".parse::<Compression>().unwrap(), Compression::Latest);
        assert_eq!(
            "distribution".parse::<PackageType>().unwrap(),
            PackageType::Distribution
        );
        let err = "bogus".parse::<Ownership>().unwrap_err();
        assert!(err.contains("recommended, preserve, preserve-other"));
    }

    #[test]
    fn enums_display_as_tool_arguments() {
        assert_eq!(Ownership::Recommended.to_string(), "recommended");
        assert_eq!(Compression::Legacy.to_string(), "legacy");
        assert_eq!(PackageType::Component.to_string(), "component");
    }
}
