//! Version marker file shared by instances and the staging directory
//!
//! A directory's installed build is recorded in `currentVersion.json` as
//! `{ "Version": "1.21.44" }`.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

/// Marker file name inside an instance or staging directory
pub const MARKER_FILE: &str = "currentVersion.json";

/// Sentinel used when no usable marker is present
pub const UNKNOWN_VERSION: &str = "Unknown";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionMarker {
    #[serde(rename = "Version")]
    pub version: String,
}

impl VersionMarker {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }
}

/// Read the marker in `dir`.
///
/// Returns `Ok(None)` when the file does not exist and an error when it exists
/// but cannot be read or parsed.
pub async fn read_marker(dir: &Path) -> AppResult<Option<String>> {
    let path = dir.join(MARKER_FILE);
    if !fs::try_exists(&path).await.unwrap_or(false) {
        return Ok(None);
    }

    let content = fs::read_to_string(&path)
        .await
        .map_err(|e| AppError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
    let marker: VersionMarker = serde_json::from_str(&content)?;

    Ok(Some(marker.version))
}

/// Read the marker in `dir`, collapsing every failure to [`UNKNOWN_VERSION`]
pub async fn read_marker_or_unknown(dir: &Path) -> String {
    match read_marker(dir).await {
        Ok(Some(version)) => version,
        _ => UNKNOWN_VERSION.to_string(),
    }
}

/// Write (or overwrite) the marker in `dir`
pub async fn write_marker(dir: &Path, version: &str) -> AppResult<()> {
    let path = dir.join(MARKER_FILE);
    let json = serde_json::to_string(&VersionMarker::new(version))?;
    fs::write(&path, json)
        .await
        .map_err(|e| AppError::Io(format!("Failed to write {}: {}", path.display(), e)))
}
