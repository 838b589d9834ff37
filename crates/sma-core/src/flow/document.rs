//! Structured-document parser (serde_json).

use std::borrow::Cow;

use serde_json::Value;

use super::error::FlowError;
use super::model::NormalizedFlow;
use super::payload::{RawFormat, RawPayload};
use super::traits::PayloadParser;
use super::tree::{build_flow, SourceNode};
use super::vocabulary::{self, DOCUMENT_MARKER_KEYS, METADATA_ENVELOPE};

/// Parser for nested mapping/sequence flow definitions.
#[derive(Debug, Default)]
pub struct DocumentParser;

impl DocumentParser {
    pub fn new() -> Self {
        Self
    }
}

impl PayloadParser for DocumentParser {
    fn format(&self) -> RawFormat {
        RawFormat::StructuredDocument
    }

    fn detect(&self, payload: &RawPayload) -> bool {
        match payload {
            RawPayload::Document(value) => looks_like_flow(value),
            RawPayload::Text(text) => {
                if !text.trim_start().starts_with('{') {
                    return false;
                }
                // Undecodable object text is still claimed so the failure is
                // reported as a broken document rather than an unknown format.
                match serde_json::from_str::<Value>(text) {
                    Ok(value) => looks_like_flow(&value),
                    Err(_) => true,
                }
            }
        }
    }

    fn normalize(&self, unit_id: &str, payload: &RawPayload) -> Result<NormalizedFlow, FlowError> {
        let value: Cow<'_, Value> = match payload {
            RawPayload::Document(value) => Cow::Borrowed(value),
            RawPayload::Text(text) => Cow::Owned(
                serde_json::from_str(text)
                    .map_err(|e| FlowError::normalization(unit_id, format!("malformed document: {}", e)))?,
            ),
        };

        let root = unwrap_envelope(&value);
        if !root.is_object() {
            return Err(FlowError::normalization(unit_id, "document root must be a mapping"));
        }

        build_flow(root, RawFormat::StructuredDocument).map_err(|m| FlowError::normalization(unit_id, m))
    }
}

/// Strip the `{"Metadata": {...}}` wrapper some tooling endpoints add.
fn unwrap_envelope(value: &Value) -> &Value {
    match value.get(METADATA_ENVELOPE) {
        Some(inner) if inner.is_object() => inner,
        _ => value,
    }
}

fn looks_like_flow(value: &Value) -> bool {
    match unwrap_envelope(value).as_object() {
        Some(map) => map
            .keys()
            .any(|k| DOCUMENT_MARKER_KEYS.contains(&k.as_str()) || vocabulary::is_element_tag(k)),
        None => false,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => items.iter().find_map(scalar_text),
        Value::Null | Value::Object(_) => None,
    }
}

impl SourceNode for Value {
    fn text(&self, key: &str) -> Option<String> {
        self.get(key).and_then(scalar_text)
    }

    fn texts(&self, key: &str) -> Vec<String> {
        match self.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter(|i| !i.is_array())
                .filter_map(scalar_text)
                .collect(),
            Some(other) => scalar_text(other).into_iter().collect(),
            None => Vec::new(),
        }
    }

    fn nodes(&self, key: &str) -> Vec<&Self> {
        match self.get(key) {
            Some(v @ Value::Object(_)) => vec![v],
            Some(Value::Array(items)) => items.iter().filter(|i| i.is_object()).collect(),
            _ => Vec::new(),
        }
    }

    fn keys(&self) -> Vec<&str> {
        match self.as_object() {
            Some(map) => map.keys().map(String::as_str).collect(),
            None => Vec::new(),
        }
    }

    fn has_scalar(&self, key: &str) -> bool {
        match self.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .any(|i| !i.is_object() && !i.is_array() && scalar_text(i).is_some()),
            Some(Value::Object(_)) | None => false,
            Some(other) => scalar_text(other).is_some(),
        }
    }
}
