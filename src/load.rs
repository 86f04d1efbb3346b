use std::ffi::OsStr;
use std::path::Path;

use serde_json::Value;

use crate::error::LoadError;

/// The serialization format of a rules-definition file, chosen by file
/// extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RulesFormat {
    Json,
    Yaml,
}

impl RulesFormat {
    /// Determine the format from a file or object path.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::UnsupportedExtension`] for anything other
    /// than `.json`, `.yaml`, or `.yml`.
    pub fn from_path(path: &Path) -> Result<Self, LoadError> {
        let extension = path
            .extension()
            .and_then(OsStr::to_str)
            .unwrap_or_default();
        match extension {
            "json" => Ok(RulesFormat::Json),
            "yaml" | "yml" => Ok(RulesFormat::Yaml),
            other => Err(LoadError::UnsupportedExtension {
                extension: other.to_owned(),
            }),
        }
    }
}

/// Source of rule-definition text living outside the local filesystem.
/// Implemented by the object-storage collaborator.
pub trait ObjectStore {
    /// Fetch the text content of an object.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] if the object cannot be fetched.
    fn get_textfile_object(&self, bucket: &str, object: &str) -> Result<String, LoadError>;
}

/// Parse rules-definition text into the raw definition list.
///
/// The document shape is `{"rules": [...]}`; a missing or non-list
/// `rules` key yields an empty list rather than an error.
///
/// # Errors
///
/// Returns [`LoadError`] if the text fails to parse in the given format.
pub fn parse_rule_definitions(text: &str, format: RulesFormat) -> Result<Vec<Value>, LoadError> {
    let document: Value = match format {
        RulesFormat::Json => serde_json::from_str(text)?,
        RulesFormat::Yaml => serde_yaml::from_str(text)?,
    };
    Ok(match document.get("rules") {
        Some(Value::Array(rules)) => rules.clone(),
        _ => Vec::new(),
    })
}

/// Read and parse a rules-definition file from the local filesystem.
///
/// # Errors
///
/// Returns [`LoadError`] on an empty path, an unsupported extension, an
/// I/O failure, or a parse failure.
pub fn load_rule_definitions(path: impl AsRef<Path>) -> Result<Vec<Value>, LoadError> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        return Err(LoadError::EmptyRulesPath);
    }
    let format = RulesFormat::from_path(path)?;
    let text = std::fs::read_to_string(path)?;
    parse_rule_definitions(&text, format)
}

/// Fetch and parse a rules-definition object from an [`ObjectStore`],
/// with the format chosen by the object name's extension.
///
/// # Errors
///
/// Returns [`LoadError`] on an unsupported extension, a fetch failure, or
/// a parse failure.
pub fn load_rule_definitions_from_store(
    store: &dyn ObjectStore,
    bucket: &str,
    object: &str,
) -> Result<Vec<Value>, LoadError> {
    let format = RulesFormat::from_path(Path::new(object))?;
    let text = store.get_textfile_object(bucket, object)?;
    parse_rule_definitions(&text, format)
}
