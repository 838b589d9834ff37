//! Detection and normalization errors.

use thiserror::Error;

/// Errors raised while classifying or normalizing one raw payload.
///
/// Both variants abort only the unit they belong to.
#[derive(Debug, Error)]
pub enum FlowError {
    /// The payload matches neither supported serialization.
    #[error("Unrecognized payload format for {unit_id}: {reason}")]
    FormatUnrecognized { unit_id: String, reason: String },

    /// The payload matches a format but is structurally invalid.
    #[error("Normalization failed for {unit_id}: {message}")]
    Normalization { unit_id: String, message: String },
}

impl FlowError {
    pub fn unrecognized(unit_id: impl Into<String>, reason: impl Into<String>) -> Self {
        FlowError::FormatUnrecognized {
            unit_id: unit_id.into(),
            reason: reason.into(),
        }
    }

    pub fn normalization(unit_id: impl Into<String>, message: impl Into<String>) -> Self {
        FlowError::Normalization {
            unit_id: unit_id.into(),
            message: message.into(),
        }
    }

    /// Unit the error belongs to.
    pub fn unit_id(&self) -> &str {
        match self {
            FlowError::FormatUnrecognized { unit_id, .. } => unit_id,
            FlowError::Normalization { unit_id, .. } => unit_id,
        }
    }
}
