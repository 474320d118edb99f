//! Data model for quickpkg.
//!
//! This crate defines the schema layer: input kind detection (`InputKind`),
//! property-list handling for tool output and component plists (`document`),
//! application metadata extracted from `Info.plist` (`AppMetadata`), output
//! path templating, path normalization, and the optional configuration file
//! with its option enums.

pub mod config;
pub mod document;
pub mod input;
pub mod metadata;
pub mod output;
pub mod paths;

pub use config::{
    default_config_path, Compression, ConfigError, Defaults, Ownership, PackageType,
};
pub use document::{
    extract_embedded_document, parse_array, parse_dictionary, set_relocatable, DocumentError,
};
pub use input::InputKind;
pub use metadata::{AppMetadata, MetadataError};
pub use output::{render_template, resolve_output_path, DEFAULT_OUTPUT_TEMPLATE};
pub use paths::{expand_tilde, normalize_input_path, normalize_lexically};
