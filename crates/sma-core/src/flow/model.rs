//! Canonical, format-independent model of one flow version.
//!
//! Both payload parsers produce a [`NormalizedFlow`]. Elements are a closed
//! sum type: each [`ElementBody`] variant carries only the parts the
//! extractor reads for that kind.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::payload::RawFormat;

/// Kind of a canonical element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Lookup,
    Create,
    Update,
    Delete,
    Decision,
    Assignment,
    Loop,
    Other,
}

impl ElementKind {
    pub const ALL: [ElementKind; 8] = [
        ElementKind::Lookup,
        ElementKind::Create,
        ElementKind::Update,
        ElementKind::Delete,
        ElementKind::Decision,
        ElementKind::Assignment,
        ElementKind::Loop,
        ElementKind::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lookup => "lookup",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Decision => "decision",
            Self::Assignment => "assignment",
            Self::Loop => "loop",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Right-hand value of a filter, mapping, condition or assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowValue {
    /// Reference to a variable, element output or record field.
    Reference(String),
    /// String literal; may embed `{!merge.field}` expressions.
    Text(String),
    /// Number, boolean, date or empty literal.
    Constant,
}

/// Filter condition on a record element; `field` belongs to the element's object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFilter {
    pub field: String,
    pub operator: Option<String>,
    pub value: Option<FlowValue>,
}

/// Input assignment `field = value` on a create or update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    pub field: String,
    pub value: Option<FlowValue>,
}

/// Output assignment of a lookup: `field` is copied into `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputBinding {
    pub field: String,
    pub target: Option<String>,
}

/// One condition of a decision rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub left: String,
    pub operator: Option<String>,
    pub right: Option<FlowValue>,
}

/// One outcome branch of a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionRule {
    pub name: Option<String>,
    pub conditions: Vec<Condition>,
}

/// One `target op value` line of an assignment element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentItem {
    pub target: String,
    pub operator: Option<String>,
    pub value: Option<FlowValue>,
}

/// Kind-specific content of a canonical element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementBody {
    Lookup {
        object: Option<String>,
        filters: Vec<RecordFilter>,
        outputs: Vec<OutputBinding>,
        queried_fields: Vec<String>,
        output_reference: Option<String>,
        stores_output: bool,
    },
    Create {
        object: Option<String>,
        inputs: Vec<FieldMapping>,
        input_reference: Option<String>,
    },
    Update {
        object: Option<String>,
        filters: Vec<RecordFilter>,
        inputs: Vec<FieldMapping>,
        input_reference: Option<String>,
    },
    Delete {
        object: Option<String>,
        filters: Vec<RecordFilter>,
        input_reference: Option<String>,
    },
    Decision {
        rules: Vec<DecisionRule>,
    },
    Assignment {
        items: Vec<AssignmentItem>,
    },
    Loop {
        collection_reference: Option<String>,
    },
    /// Unrecognized or non-data element; only counted.
    Other {
        source_tag: String,
    },
}

impl ElementBody {
    pub fn kind(&self) -> ElementKind {
        match self {
            Self::Lookup { .. } => ElementKind::Lookup,
            Self::Create { .. } => ElementKind::Create,
            Self::Update { .. } => ElementKind::Update,
            Self::Delete { .. } => ElementKind::Delete,
            Self::Decision { .. } => ElementKind::Decision,
            Self::Assignment { .. } => ElementKind::Assignment,
            Self::Loop { .. } => ElementKind::Loop,
            Self::Other { .. } => ElementKind::Other,
        }
    }
}

/// One node of the normalized automation tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalElement {
    /// Author-assigned name, or `kind#index` when the source had none.
    pub name: String,
    /// True when `name` was synthesized.
    pub synthesized_name: bool,
    pub body: ElementBody,
}

impl CanonicalElement {
    pub fn kind(&self) -> ElementKind {
        self.body.kind()
    }
}

/// Variable declared by the flow itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableDecl {
    pub name: String,
    pub data_type: Option<String>,
    /// SObject type for record variables.
    pub object_type: Option<String>,
    pub is_collection: bool,
}

/// What kind of automation a flow version is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessKind {
    RecordTriggered,
    Scheduled,
    PlatformEvent,
    Screen,
    /// Autolaunched flow without a trigger; runs as a subprocess.
    Autolaunched,
    Other,
}

/// Lifecycle status of a flow version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Active,
    Draft,
    Obsolete,
}

/// Unit-level metadata read from the payload.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitMetadata {
    pub kind: ProcessKind,
    pub process_type: Option<String>,
    pub trigger_type: Option<String>,
    /// Schema entity whose records activate the flow.
    pub trigger_object: Option<String>,
    pub status: UnitStatus,
    pub label: Option<String>,
    pub api_version: Option<String>,
    pub description: Option<String>,
}

/// Element counts per kind, plus per source tag for `other` elements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementSummary {
    /// Keyed by [`ElementKind::as_str`].
    pub by_kind: BTreeMap<String, usize>,
    /// Source tag names of elements normalized to `other`.
    pub other_tags: BTreeMap<String, usize>,
    pub total: usize,
}

impl ElementSummary {
    pub fn from_elements(elements: &[CanonicalElement]) -> Self {
        let mut summary = Self::default();
        for element in elements {
            *summary
                .by_kind
                .entry(element.kind().as_str().to_string())
                .or_insert(0) += 1;
            if let ElementBody::Other { source_tag } = &element.body {
                *summary.other_tags.entry(source_tag.clone()).or_insert(0) += 1;
            }
            summary.total += 1;
        }
        summary
    }

    pub fn count(&self, kind: ElementKind) -> usize {
        self.by_kind.get(kind.as_str()).copied().unwrap_or(0)
    }
}

/// Output of normalization: metadata, declarations and ordered elements.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedFlow {
    pub format: RawFormat,
    pub metadata: UnitMetadata,
    pub variables: Vec<VariableDecl>,
    pub elements: Vec<CanonicalElement>,
    pub summary: ElementSummary,
}

impl NormalizedFlow {
    /// Find an element by name.
    pub fn element(&self, name: &str) -> Option<&CanonicalElement> {
        self.elements.iter().find(|e| e.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts_other_tags() {
        let elements = vec![
            CanonicalElement {
                name: "Check".into(),
                synthesized_name: false,
                body: ElementBody::Decision { rules: vec![] },
            },
            CanonicalElement {
                name: "other#0".into(),
                synthesized_name: true,
                body: ElementBody::Other {
                    source_tag: "screens".into(),
                },
            },
            CanonicalElement {
                name: "other#1".into(),
                synthesized_name: true,
                body: ElementBody::Other {
                    source_tag: "screens".into(),
                },
            },
        ];

        let summary = ElementSummary::from_elements(&elements);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.count(ElementKind::Decision), 1);
        assert_eq!(summary.count(ElementKind::Other), 2);
        assert_eq!(summary.count(ElementKind::Loop), 0);
        assert_eq!(summary.other_tags.get("screens"), Some(&2));
    }
}
