//! Acquisition and staging pipeline for quickpkg.
//!
//! This crate ties the schema and runtime layers together into the
//! `Pipeline`: it dispatches on the input kind, attaches or extracts the
//! input, resolves exactly one application bundle, copies it into an isolated
//! `StagingArea`, merges install scripts, and hands the payload to the package
//! builder. Mounted volumes and the staging directory are released on every
//! exit path.

pub mod copy;
pub mod pipeline;
pub mod resolve;
pub mod scripts;
pub mod staging;

pub use copy::copy_tree;
pub use pipeline::{BuildResult, Pipeline, StageRequest, StagedPayload};
pub use resolve::{find_applications, require_single};
pub use scripts::{merge_scripts, ScriptSources};
pub use staging::StagingArea;

use quickpkg_runtime::RuntimeError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0}")]
    UnsupportedInput(String),
    #[error("no file found at {0}")]
    InputNotFound(PathBuf),
    #[error("could not find an application")]
    ApplicationNotFound,
    #[error("found too many applications: {}", display_paths(.0))]
    AmbiguousApplication(Vec<PathBuf>),
    #[error("script source {0} does not exist")]
    ScriptNotFound(PathBuf),
    #[error("{0} script already exists in the scripts folder")]
    ScriptConflict(String),
    #[error("application metadata error: {0}")]
    Metadata(#[from] quickpkg_schema::MetadataError),
    #[error("{0}")]
    Document(#[from] quickpkg_schema::DocumentError),
    #[error("{0}")]
    Runtime(#[from] RuntimeError),
    /// A tool failure while attaching or extracting the input.
    #[error("{0}")]
    Acquisition(#[source] RuntimeError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Coarse failure class, used by the CLI to pick an exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad arguments or inputs supplied by the user.
    Usage,
    /// The input could not be turned into a single application bundle.
    Acquisition,
    /// Everything after acquisition, including package assembly.
    Build,
}

impl CoreError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnsupportedInput(_)
            | Self::InputNotFound(_)
            | Self::ScriptNotFound(_)
            | Self::ScriptConflict(_) => ErrorCategory::Usage,
            Self::ApplicationNotFound
            | Self::AmbiguousApplication(_)
            | Self::Metadata(_)
            | Self::Document(_)
            | Self::Acquisition(_) => ErrorCategory::Acquisition,
            Self::Runtime(
                RuntimeError::MountFailed(_)
                | RuntimeError::ExtractionFailed(_)
                | RuntimeError::Document(_),
            ) => ErrorCategory::Acquisition,
            Self::Runtime(_) | Self::Io(_) => ErrorCategory::Build,
        }
    }
}
