//! Input collaborator: where raw units come from.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::flow::RawUnit;

/// The input sequence could not be obtained. Fatal to the batch.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid manifest {}: {message}", path.display())]
    Manifest { path: PathBuf, message: String },
}

/// Supplies the raw units of one batch.
#[async_trait]
pub trait UnitSource: Send + Sync {
    async fn fetch_units(&self) -> Result<Vec<RawUnit>, SourceError>;
}

/// Units listed in a JSON manifest, payloads stored as files beside it.
///
/// ```json
/// {"units": [{"unit_id": "301xx", "version_number": 3, "logical_name": "Lead_Convert",
///             "payload_path": "Lead_Convert-3.json", "declared_api_revision": 58.0}]}
/// ```
///
/// Relative `payload_path`s resolve against the manifest's directory.
pub struct ManifestSource {
    path: PathBuf,
}

#[derive(Deserialize)]
struct Manifest {
    units: Vec<ManifestEntry>,
}

#[derive(Deserialize)]
struct ManifestEntry {
    unit_id: String,
    version_number: u32,
    logical_name: String,
    payload_path: PathBuf,
    #[serde(default)]
    declared_api_revision: Option<f64>,
}

impl ManifestSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(path: &Path) -> Result<String, SourceError> {
        tokio::fs::read_to_string(path).await.map_err(|source| SourceError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[async_trait]
impl UnitSource for ManifestSource {
    async fn fetch_units(&self) -> Result<Vec<RawUnit>, SourceError> {
        let content = Self::read(&self.path).await?;
        let manifest: Manifest = serde_json::from_str(&content).map_err(|e| SourceError::Manifest {
            path: self.path.clone(),
            message: e.to_string(),
        })?;

        let base = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut units = Vec::with_capacity(manifest.units.len());
        for entry in manifest.units {
            let payload_path = if entry.payload_path.is_absolute() {
                entry.payload_path
            } else {
                base.join(&entry.payload_path)
            };
            let payload = Self::read(&payload_path).await?;

            let mut unit = RawUnit::new(entry.unit_id, entry.version_number, entry.logical_name, payload);
            unit.declared_api_revision = entry.declared_api_revision;
            units.push(unit);
        }

        tracing::debug!(manifest = %self.path.display(), units = units.len(), "Loaded manifest");
        Ok(units)
    }
}
