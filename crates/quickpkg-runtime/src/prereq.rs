use crate::archive::{UNZIP, XIP};
use crate::package::{PKGBUILD, PRODUCTBUILD};
use crate::volume::HDIUTIL;
use quickpkg_schema::{InputKind, PackageType};
use std::fmt;
use std::path::Path;

const MACOS_HINT: &str = "ships with macOS; quickpkg only runs on macOS";

/// A system tool quickpkg drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tool {
    pub name: &'static str,
    pub path: &'static str,
    pub purpose: &'static str,
}

impl Tool {
    pub fn available(&self) -> bool {
        Path::new(self.path).is_file()
    }
}

pub const TOOLS: &[Tool] = &[
    Tool {
        name: "hdiutil",
        path: HDIUTIL,
        purpose: "mounting disk images",
    },
    Tool {
        name: "unzip",
        path: UNZIP,
        purpose: "extracting zip archives",
    },
    Tool {
        name: "xip",
        path: XIP,
        purpose: "expanding xip archives",
    },
    Tool {
        name: "pkgbuild",
        path: PKGBUILD,
        purpose: "building component packages",
    },
    Tool {
        name: "productbuild",
        path: PRODUCTBUILD,
        purpose: "building distribution packages",
    },
];

fn tool(name: &str) -> Option<&'static Tool> {
    TOOLS.iter().find(|t| t.name == name)
}

/// Tools needed to turn an input of `kind` into a package of `package_type`.
pub fn required_tools(kind: InputKind, package_type: PackageType) -> Vec<&'static Tool> {
    let mut names = vec![];
    match kind {
        InputKind::Bundle => {}
        InputKind::DiskImage => names.push("hdiutil"),
        InputKind::ZipArchive => names.push("unzip"),
        InputKind::SelfExtractingArchive => names.push("xip"),
    }
    names.push("pkgbuild");
    if package_type == PackageType::Distribution {
        names.push("productbuild");
    }
    names.into_iter().filter_map(tool).collect()
}

/// A missing prerequisite with actionable install instructions.
#[derive(Debug)]
pub struct MissingPrereq {
    pub name: &'static str,
    pub purpose: &'static str,
    pub install_hint: &'static str,
}

impl fmt::Display for MissingPrereq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  - {}: {} (install: {})",
            self.name, self.purpose, self.install_hint
        )
    }
}

impl From<&Tool> for MissingPrereq {
    fn from(tool: &Tool) -> Self {
        Self {
            name: tool.name,
            purpose: tool.purpose,
            install_hint: MACOS_HINT,
        }
    }
}

/// Check the tools for one conversion.
/// Returns a list of missing items. Empty list means all prerequisites are met.
pub fn check_prereqs(kind: InputKind, package_type: PackageType) -> Vec<MissingPrereq> {
    required_tools(kind, package_type)
        .into_iter()
        .filter(|t| !t.available())
        .map(MissingPrereq::from)
        .collect()
}

/// Format a list of missing prerequisites into a user-friendly error message.
pub fn format_missing(missing: &[MissingPrereq]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("missing prerequisites:\n");
    for m in missing {
        let _ = writeln!(msg, "{m}");
    }
    msg.push_str("\nquickpkg drives these system tools to build installer packages.");
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(tools: &[&Tool]) -> Vec<&'static str> {
        tools.iter().map(|t| t.name).collect()
    }

    #[test]
    fn required_tools_follow_input_kind() {
        assert_eq!(
            names(&required_tools(InputKind::DiskImage, PackageType::Component)),
            ["hdiutil", "pkgbuild"]
        );
        assert_eq!(
            names(&required_tools(InputKind::ZipArchive, PackageType::Distribution)),
            ["unzip", "pkgbuild", "productbuild"]
        );
        assert_eq!(
            names(&required_tools(
                InputKind::SelfExtractingArchive,
                PackageType::Component
            )),
            ["xip", "pkgbuild"]
        );
        assert_eq!(
            names(&required_tools(InputKind::Bundle, PackageType::Component)),
            ["pkgbuild"]
        );
    }

    #[test]
    fn every_tool_has_an_absolute_path() {
        for t in TOOLS {
            assert!(Path::new(t.path).is_absolute(), "{}", t.name);
        }
    }

    #[test]
    fn missing_prereq_display() {
        let m = MissingPrereq::from(&TOOLS[0]);
        let s = format!("{m}");
        assert!(s.contains("hdiutil"));
        assert!(s.contains("mounting disk images"));
        assert!(s.contains("macOS"));
    }

    #[test]
    fn format_missing_produces_readable_output() {
        let items: Vec<MissingPrereq> = TOOLS[3..].iter().map(MissingPrereq::from).collect();
        let output = format_missing(&items);
        assert!(output.contains("missing prerequisites:"));
        assert!(output.contains("pkgbuild"));
        assert!(output.contains("productbuild"));
    }
}
