//! Flow payload detection and normalization.
//!
//! Turns a raw flow definition in either serialization into one canonical
//! [`NormalizedFlow`].
//!
//! ## Components
//!
//! - `PayloadParser` trait - Common interface for format-specific parsers
//! - `ParserRegistry` - Format detection and dispatch
//! - `MarkupParser` - Legacy tag markup (quick-xml)
//! - `DocumentParser` - Structured documents (serde_json)
//! - `vocabulary` - The single source-name to element-kind mapping

mod document;
mod error;
mod markup;
mod model;
mod payload;
mod registry;
mod traits;
mod tree;
pub mod vocabulary;

pub use document::DocumentParser;
pub use error::FlowError;
pub use markup::MarkupParser;
pub use model::{
    AssignmentItem, CanonicalElement, Condition, DecisionRule, ElementBody, ElementKind,
    ElementSummary, FieldMapping, FlowValue, NormalizedFlow, OutputBinding, ProcessKind,
    RecordFilter, UnitMetadata, UnitStatus, VariableDecl,
};
pub use payload::{RawFormat, RawPayload, RawUnit};
pub use registry::ParserRegistry;
pub use traits::PayloadParser;
