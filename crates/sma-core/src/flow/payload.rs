//! Raw unit descriptors as delivered by the transport collaborator.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// A raw flow definition, either serialized text or an already-decoded document.
#[derive(Debug, Clone, PartialEq)]
pub enum RawPayload {
    /// Markup or document text, not yet classified.
    Text(String),
    /// Decoded structured document.
    Document(serde_json::Value),
}

impl RawPayload {
    /// SHA256 of the payload, for provenance on the stored unit.
    pub fn hash(&self) -> String {
        let mut hasher = Sha256::new();
        match self {
            RawPayload::Text(text) => hasher.update(text.as_bytes()),
            RawPayload::Document(value) => hasher.update(value.to_string().as_bytes()),
        }
        hex::encode(hasher.finalize())
    }
}

impl From<String> for RawPayload {
    fn from(text: String) -> Self {
        RawPayload::Text(text)
    }
}

impl From<&str> for RawPayload {
    fn from(text: &str) -> Self {
        RawPayload::Text(text.to_string())
    }
}

impl From<serde_json::Value> for RawPayload {
    fn from(value: serde_json::Value) -> Self {
        RawPayload::Document(value)
    }
}

/// Serialization variant of a flow definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawFormat {
    /// Tag markup returned by older API revisions.
    LegacyMarkup,
    /// Nested mapping/sequence document returned by newer API revisions.
    StructuredDocument,
}

impl RawFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            RawFormat::LegacyMarkup => "legacy_markup",
            RawFormat::StructuredDocument => "structured_document",
        }
    }
}

impl fmt::Display for RawFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One automation unit as handed over by the transport collaborator.
#[derive(Debug, Clone)]
pub struct RawUnit {
    /// Stable external identifier of this flow version.
    pub unit_id: String,
    pub version_number: u32,
    /// API name of the flow; shared by all its versions.
    pub logical_name: String,
    pub raw_payload: RawPayload,
    /// API revision the payload was fetched with, when known.
    pub declared_api_revision: Option<f64>,
}

impl RawUnit {
    pub fn new(
        unit_id: impl Into<String>,
        version_number: u32,
        logical_name: impl Into<String>,
        raw_payload: impl Into<RawPayload>,
    ) -> Self {
        Self {
            unit_id: unit_id.into(),
            version_number,
            logical_name: logical_name.into(),
            raw_payload: raw_payload.into(),
            declared_api_revision: None,
        }
    }

    pub fn with_api_revision(mut self, revision: f64) -> Self {
        self.declared_api_revision = Some(revision);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable() {
        let a = RawPayload::from("<Flow/>");
        let b = RawPayload::from("<Flow/>".to_string());
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.hash().len(), 64);
        assert_ne!(a.hash(), RawPayload::from("<Flow></Flow>").hash());
    }
}
