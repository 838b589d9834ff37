//! Field-reference facts and extraction warnings.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::flow::ElementKind;

/// How an element uses a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Read,
    Write,
    Both,
}

impl Direction {
    /// Combine two usages of the same field by the same element.
    pub fn union(self, other: Direction) -> Direction {
        if self == other {
            self
        } else {
            Direction::Both
        }
    }

    pub fn reads(&self) -> bool {
        matches!(self, Direction::Read | Direction::Both)
    }

    pub fn writes(&self) -> bool {
        matches!(self, Direction::Write | Direction::Both)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Read => "read",
            Direction::Write => "write",
            Direction::Both => "both",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One element of one unit version touching one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldReferenceFact {
    pub schema_entity: String,
    pub field_name: String,
    pub unit_id: String,
    pub version_number: u32,
    pub element_name: String,
    pub element_kind: ElementKind,
    pub direction: Direction,
    /// Process variable the value flows through, if any.
    pub bound_variable: Option<String>,
}

/// An element whose references could not be read. Only that element is skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("Element {element_name} ({element_kind}): {message}")]
pub struct ExtractionWarning {
    pub element_name: String,
    pub element_kind: ElementKind,
    pub message: String,
}

/// Facts and warnings for one unit version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub facts: Vec<FieldReferenceFact>,
    pub warnings: Vec<ExtractionWarning>,
}
