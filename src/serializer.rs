use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{Error, Result};

/// Encodes a message as pretty-printed JSON.
pub fn to_json<T: Serialize>(message: &T) -> Result<String> {
    serde_json::to_string_pretty(message)
        .map_err(|e| Error::Internal(format!("cannot encode message to JSON: {e}")))
}

/// Decodes a message from JSON.
pub fn from_json<T: DeserializeOwned>(data: &str) -> Result<T> {
    serde_json::from_str(data)
        .map_err(|e| Error::InvalidArgument(format!("cannot decode message from JSON: {e}")))
}

/// Writes `message` as JSON to `path`.
pub async fn write_json_file<T: Serialize>(message: &T, path: impl AsRef<Path>) -> Result<()> {
    let json = to_json(message)?;
    tokio::fs::write(path, json).await?;
    Ok(())
}

/// Reads a message from the JSON file at `path`.
pub async fn read_json_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let data = tokio::fs::read_to_string(path).await?;
    from_json(&data)
}
