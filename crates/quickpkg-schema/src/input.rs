use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// The kind of installer item, derived from its file extension only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    Bundle,
    DiskImage,
    ZipArchive,
    SelfExtractingArchive,
}

impl InputKind {
    pub const ALL: [InputKind; 4] = [
        InputKind::Bundle,
        InputKind::DiskImage,
        InputKind::ZipArchive,
        InputKind::SelfExtractingArchive,
    ];

    /// Map a path's extension (case-insensitive) to an input kind.
    ///
    /// Returns `None` for unsupported or missing extensions. No content
    /// sniffing is ever done.
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        Self::from_extension(&ext)
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.extension() == ext)
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Bundle => "app",
            Self::DiskImage => "dmg",
            Self::ZipArchive => "zip",
            Self::SelfExtractingArchive => "xip",
        }
    }

    /// Comma-separated list of supported extensions, for error messages.
    pub fn supported_extensions() -> String {
        Self::ALL
            .iter()
            .map(|k| k.extension())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Bundle => "application bundle",
            Self::DiskImage => "disk image",
            Self::ZipArchive => "zip archive",
            Self::SelfExtractingArchive => "xip archive",
        };
        f.write_str(label)
    }
}
