//! Property-list documents produced by `hdiutil` and `pkgbuild`.
//!
//! Some tools print diagnostic text around the plist on the same stream, so
//! the first document has to be cut out of the raw output before parsing.

use plist::{Dictionary, Value};
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

const DOCUMENT_OPEN: &str = "<?xml version";
const DOCUMENT_CLOSE: &str = "</plist>";

/// Component plist key toggled by [`set_relocatable`].
pub const RELOCATABLE_KEY: &str = "BundleIsRelocatable";

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("no embedded property list found in tool output")]
    NoEmbeddedDocument,
    #[error("malformed property list: {0}")]
    Malformed(#[from] plist::Error),
    #[error("unexpected property list shape: expected {expected}")]
    UnexpectedShape { expected: &'static str },
    #[error("property list I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Cut the first XML property list out of mixed tool output.
///
/// The closing marker is searched for only after the opening marker, and the
/// returned document always ends with a newline.
pub fn extract_embedded_document(text: &str) -> Result<String, DocumentError> {
    let start = text
        .find(DOCUMENT_OPEN)
        .ok_or(DocumentError::NoEmbeddedDocument)?;
    let search_from = start + DOCUMENT_OPEN.len();
    let end = text[search_from..]
        .find(DOCUMENT_CLOSE)
        .map(|offset| search_from + offset + DOCUMENT_CLOSE.len())
        .ok_or(DocumentError::NoEmbeddedDocument)?;

    let mut document = text[start..end].to_owned();
    document.push('\n');
    Ok(document)
}

fn parse_value(bytes: &[u8]) -> Result<Value, DocumentError> {
    Ok(Value::from_reader(Cursor::new(bytes))?)
}

/// Parse a document whose top level must be a dictionary.
pub fn parse_dictionary(bytes: &[u8]) -> Result<Dictionary, DocumentError> {
    parse_value(bytes)?
        .into_dictionary()
        .ok_or(DocumentError::UnexpectedShape {
            expected: "dictionary",
        })
}

/// Parse a document whose top level must be an array of dictionaries.
pub fn parse_array(bytes: &[u8]) -> Result<Vec<Dictionary>, DocumentError> {
    let not_an_array = || DocumentError::UnexpectedShape {
        expected: "array of dictionaries",
    };
    parse_value(bytes)?
        .into_array()
        .ok_or_else(not_an_array)?
        .into_iter()
        .map(|item| item.into_dictionary().ok_or_else(not_an_array))
        .collect()
}

/// Force `BundleIsRelocatable` to `relocatable` on every component that
/// declares it, then rewrite the component plist in place as XML.
///
/// Components without the key are left untouched.
pub fn set_relocatable(path: &Path, relocatable: bool) -> Result<(), DocumentError> {
    let data = std::fs::read(path)?;
    let mut components = parse_array(&data)?;

    for component in &mut components {
        if component.contains_key(RELOCATABLE_KEY) {
            component.insert(RELOCATABLE_KEY.to_owned(), Value::Boolean(relocatable));
        }
    }

    let document = Value::Array(components.into_iter().map(Value::Dictionary).collect());
    let mut out = Vec::new();
    document.to_writer_xml(&mut out)?;
    std::fs::write(path, out)?;
    Ok(())
}
