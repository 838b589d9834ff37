//! Core parser trait for format-specific payload decoding.

use super::error::FlowError;
use super::model::NormalizedFlow;
use super::payload::{RawFormat, RawPayload};

/// Format-specific payload parser.
///
/// Implement this trait for each serialization variant. Each parser is
/// responsible for:
///
/// 1. **Detection**: recognizing payloads of its format by shape alone
/// 2. **Decoding**: turning the payload into a source tree, failing on
///    structurally invalid input
/// 3. **Normalization**: handing the tree to the shared canonical builder
pub trait PayloadParser: Send + Sync {
    /// Format this parser handles.
    fn format(&self) -> RawFormat;

    /// Cheap shape check used by format detection. Never fails.
    ///
    /// Returning `true` does not promise that [`normalize`](Self::normalize)
    /// succeeds: a truncated definition is still claimed by its format.
    fn detect(&self, payload: &RawPayload) -> bool;

    /// Decode and normalize a payload of this format.
    fn normalize(&self, unit_id: &str, payload: &RawPayload) -> Result<NormalizedFlow, FlowError>;
}
