//! Input document loading (dialogue scripts, request files).

use serde::de::DeserializeOwned;
use std::fs;
use std::io::{self, Read};
use std::path::Path;
use thiserror::Error;

/// Error type for request loading.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("failed to read file: {0}")]
    ReadFile(#[from] io::Error),
    #[error("failed to parse YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),
    #[error("failed to parse JSON: {0}")]
    ParseJson(#[from] serde_json::Error),
    #[error("failed to parse input (tried JSON and YAML)")]
    ParseFailed,
}

/// Loads a document from a YAML or JSON file, or from stdin when `path`
/// is `-`.
pub fn load_request<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, RequestError> {
    if path.as_ref() == Path::new("-") {
        return load_request_from_stdin();
    }
    let data = fs::read(path.as_ref())?;
    parse_request(&data, path.as_ref())
}

/// Parses document data based on file extension or content.
pub fn parse_request<T: DeserializeOwned>(
    data: &[u8],
    path: impl AsRef<Path>,
) -> Result<T, RequestError> {
    let ext = path
        .as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());

    match ext.as_deref() {
        Some("yaml") | Some("yml") => Ok(serde_yaml::from_slice(data)?),
        Some("json") => Ok(serde_json::from_slice(data)?),
        _ => parse_any(data),
    }
}

/// Loads a document from stdin.
pub fn load_request_from_stdin<T: DeserializeOwned>() -> Result<T, RequestError> {
    let mut data = Vec::new();
    io::stdin().read_to_end(&mut data)?;
    parse_any(&data)
}

// JSON first: the script generator emits JSON, and JSON is also YAML.
fn parse_any<T: DeserializeOwned>(data: &[u8]) -> Result<T, RequestError> {
    if let Ok(v) = serde_json::from_slice(data) {
        return Ok(v);
    }
    if let Ok(v) = serde_yaml::from_slice(data) {
        return Ok(v);
    }
    Err(RequestError::ParseFailed)
}
