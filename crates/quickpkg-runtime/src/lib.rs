//! External tool layer for quickpkg.
//!
//! This crate implements everything that talks to system utilities: the
//! bounded `CommandRunner` abstraction (with a real `SystemRunner` and a
//! scripted `MockRunner`), the `VolumeManager` that attaches and detaches disk
//! images through `hdiutil` while remembering which volumes it owns, the
//! `ArchiveStager` for `unzip`/`xip`, the `PackageBuilder` that drives
//! `pkgbuild`/`productbuild`, and prerequisite checks for those tools.

pub mod archive;
pub mod mock;
pub mod package;
pub mod prereq;
pub mod process;
pub mod volume;

pub use archive::ArchiveStager;
pub use mock::MockRunner;
pub use package::{
    PackageBuilder, PackageOptions, PackageRequest, SigningOptions, DEFAULT_INSTALL_LOCATION,
};
pub use prereq::{check_prereqs, format_missing, required_tools, MissingPrereq, Tool, TOOLS};
pub use process::{CommandResult, CommandRunner, Invocation, SystemRunner, MAX_OUTPUT_BYTES};
pub use volume::VolumeManager;

use quickpkg_schema::DocumentError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("{program} wrote more than {limit} bytes to {stream}")]
    OutputLimitExceeded {
        program: String,
        stream: &'static str,
        limit: usize,
    },
    #[error("command failed ({code}): {command}\n{stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },
    #[error("error mounting disk image: {0}")]
    MountFailed(String),
    #[error("error extracting archive: {0}")]
    ExtractionFailed(String),
    #[error("package build failed: {0}")]
    PackageBuildFailed(String),
    #[error("tool output error: {0}")]
    Document(#[from] DocumentError),
    #[error("internal state poisoned: {0}")]
    StatePoisoned(String),
}
