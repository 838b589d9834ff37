//! Parser registry: format detection and dispatch.

use std::sync::Arc;

use super::document::DocumentParser;
use super::error::FlowError;
use super::markup::MarkupParser;
use super::model::NormalizedFlow;
use super::payload::{RawFormat, RawPayload};
use super::traits::PayloadParser;

/// Registry of payload parsers.
///
/// Detection asks each registered parser in order; the first one that
/// recognizes the payload's shape wins. Registers both built-in parsers on
/// creation.
pub struct ParserRegistry {
    parsers: Vec<Arc<dyn PayloadParser>>,
}

impl ParserRegistry {
    /// Create a new registry with the markup and document parsers.
    pub fn new() -> Self {
        let mut registry = Self { parsers: Vec::new() };

        registry.register(Arc::new(MarkupParser::new()));
        registry.register(Arc::new(DocumentParser::new()));

        registry
    }

    /// Register a parser. A later parser replaces an earlier one for the same format.
    pub fn register(&mut self, parser: Arc<dyn PayloadParser>) {
        self.parsers.retain(|p| p.format() != parser.format());
        self.parsers.push(parser);
    }

    /// Get the parser for a format.
    pub fn parser_for(&self, format: RawFormat) -> Option<Arc<dyn PayloadParser>> {
        self.parsers.iter().find(|p| p.format() == format).cloned()
    }

    /// Classify a payload.
    pub fn detect(&self, unit_id: &str, payload: &RawPayload) -> Result<RawFormat, FlowError> {
        self.parsers
            .iter()
            .find(|p| p.detect(payload))
            .map(|p| p.format())
            .ok_or_else(|| {
                let reason = match payload {
                    RawPayload::Text(t) if t.trim().is_empty() => "empty payload",
                    RawPayload::Text(_) => "neither flow markup nor a flow document",
                    RawPayload::Document(_) => "document has no flow definition keys",
                };
                FlowError::unrecognized(unit_id, reason)
            })
    }

    /// Normalize a payload already classified as `format`.
    pub fn normalize(
        &self,
        unit_id: &str,
        format: RawFormat,
        payload: &RawPayload,
    ) -> Result<NormalizedFlow, FlowError> {
        let parser = self
            .parser_for(format)
            .ok_or_else(|| FlowError::unrecognized(unit_id, format!("no parser registered for {}", format)))?;
        parser.normalize(unit_id, payload)
    }

    /// Detect and normalize in one step.
    pub fn parse(&self, unit_id: &str, payload: &RawPayload) -> Result<NormalizedFlow, FlowError> {
        let format = self.detect(unit_id, payload)?;
        self.normalize(unit_id, format, payload)
    }

    /// Formats with a registered parser.
    pub fn supported_formats(&self) -> Vec<RawFormat> {
        self.parsers.iter().map(|p| p.format()).collect()
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}
