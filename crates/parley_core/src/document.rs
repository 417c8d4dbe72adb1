//! Loading of flow and personality documents.
//!
//! Documents are JSON, YAML or TOML, picked by file extension, and come
//! back as a JSON value with key order preserved so that "first declared
//! state" means what the author wrote.

use crate::error::ConfigError;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::Path;

pub fn load_document(path: impl AsRef<Path>) -> Result<Value, ConfigError> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let parse_error = |message: String| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    };

    let value = match extension.as_str() {
        "json" => serde_json::from_str(&content).map_err(|e| parse_error(e.to_string()))?,
        "yaml" | "yml" => serde_yaml::from_str(&content).map_err(|e| parse_error(e.to_string()))?,
        "toml" => toml::from_str(&content).map_err(|e| parse_error(e.to_string()))?,
        _ => {
            return Err(ConfigError::UnsupportedFormat {
                path: path.to_path_buf(),
                extension,
            })
        }
    };

    tracing::info!("Loaded document {}", path.display());
    Ok(value)
}

/// Deserialize an already-loaded document into its schema type.
pub fn from_document<T: DeserializeOwned>(what: &'static str, value: Value) -> Result<T, ConfigError> {
    serde_json::from_value(value).map_err(|e| ConfigError::schema(what, e))
}
