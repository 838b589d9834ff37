//! Canonical tree construction over either source tree.
//!
//! The markup and document parsers each decode their input into their own
//! tree type and expose it through [`SourceNode`]. Everything from there on
//! (metadata, declarations, elements, synthesized names, ordering) is built
//! here once, so both formats land on the same canonical shape.

use std::collections::HashMap;

use super::model::{
    AssignmentItem, CanonicalElement, Condition, DecisionRule, ElementBody, ElementKind,
    ElementSummary, FieldMapping, FlowValue, NormalizedFlow, OutputBinding, ProcessKind,
    RecordFilter, UnitMetadata, UnitStatus, VariableDecl,
};
use super::payload::RawFormat;
use super::vocabulary::{self, keys, TagClass};

/// Read access to a decoded source tree.
pub(crate) trait SourceNode {
    /// Trimmed, non-empty scalar text of the first child named `key`.
    fn text(&self, key: &str) -> Option<String>;

    /// Scalar texts of all children named `key`, in document order.
    fn texts(&self, key: &str) -> Vec<String>;

    /// Structural children named `key`, in document order.
    fn nodes(&self, key: &str) -> Vec<&Self>;

    /// Distinct child names, in order of first appearance.
    fn keys(&self) -> Vec<&str>;

    /// True if any child named `key` is a non-empty scalar.
    fn has_scalar(&self, key: &str) -> bool;
}

struct PendingElement {
    kind: ElementKind,
    tag: String,
    name: Option<String>,
    body: ElementBody,
}

/// Build the canonical flow from a decoded root node.
pub(crate) fn build_flow<N: SourceNode>(root: &N, format: RawFormat) -> Result<NormalizedFlow, String> {
    let metadata = read_metadata(root);
    let variables = read_variables(root);

    let mut pending = Vec::new();
    for key in root.keys() {
        match vocabulary::classify(key) {
            TagClass::Element(kind) => {
                if root.has_scalar(key) {
                    return Err(format!("`{}` must hold element entries, found a scalar", key));
                }
                for node in root.nodes(key) {
                    pending.push(PendingElement {
                        kind,
                        tag: key.to_string(),
                        name: node.text(keys::NAME),
                        body: build_body(kind, key, node),
                    });
                }
            }
            TagClass::Unrecognized => {
                for node in root.nodes(key) {
                    pending.push(PendingElement {
                        kind: ElementKind::Other,
                        tag: key.to_string(),
                        name: node.text(keys::NAME),
                        body: ElementBody::Other {
                            source_tag: key.to_string(),
                        },
                    });
                }
            }
            TagClass::Declaration | TagClass::Attribute => {}
        }
    }

    // Stable: document order is kept within one source collection.
    pending.sort_by(|a, b| (a.kind, &a.tag).cmp(&(b.kind, &b.tag)));

    let mut positions: HashMap<ElementKind, usize> = HashMap::new();
    let elements: Vec<CanonicalElement> = pending
        .into_iter()
        .map(|p| {
            let position = positions.entry(p.kind).or_insert(0);
            let index = *position;
            *position += 1;

            let (name, synthesized_name) = match p.name {
                Some(name) => (name, false),
                None => (format!("{}#{}", p.kind.as_str(), index), true),
            };
            CanonicalElement {
                name,
                synthesized_name,
                body: p.body,
            }
        })
        .collect();

    let summary = ElementSummary::from_elements(&elements);

    Ok(NormalizedFlow {
        format,
        metadata,
        variables,
        elements,
        summary,
    })
}

fn read_metadata<N: SourceNode>(root: &N) -> UnitMetadata {
    let process_type = root.text(keys::PROCESS_TYPE);
    let start = root.nodes(keys::START).into_iter().next();
    let trigger_type = start.and_then(|s| s.text(keys::TRIGGER_TYPE));
    let trigger_object = start
        .and_then(|s| s.text(keys::OBJECT))
        .or_else(|| process_metadata_object(root));

    UnitMetadata {
        kind: process_kind(process_type.as_deref(), trigger_type.as_deref()),
        status: unit_status(root.text(keys::STATUS).as_deref()),
        label: root.text(keys::LABEL),
        api_version: root.text(keys::API_VERSION),
        description: root.text(keys::DESCRIPTION),
        process_type,
        trigger_type,
        trigger_object,
    }
}

/// Process Builder definitions carry their object as an `ObjectType` metadata value.
fn process_metadata_object<N: SourceNode>(root: &N) -> Option<String> {
    root.nodes(keys::PROCESS_METADATA_VALUES)
        .into_iter()
        .find(|m| m.text(keys::NAME).as_deref() == Some("ObjectType"))
        .and_then(|m| value_of(m, keys::VALUE))
        .and_then(|v| match v {
            FlowValue::Text(s) => Some(s),
            _ => None,
        })
}

fn process_kind(process_type: Option<&str>, trigger_type: Option<&str>) -> ProcessKind {
    match trigger_type {
        Some("RecordAfterSave") | Some("RecordBeforeSave") | Some("RecordBeforeDelete") => {
            ProcessKind::RecordTriggered
        }
        Some("Scheduled") => ProcessKind::Scheduled,
        Some("PlatformEvent") => ProcessKind::PlatformEvent,
        _ => match process_type {
            Some("Flow") => ProcessKind::Screen,
            Some("AutoLaunchedFlow") => ProcessKind::Autolaunched,
            Some("Workflow") => ProcessKind::RecordTriggered,
            _ => ProcessKind::Other,
        },
    }
}

fn unit_status(status: Option<&str>) -> UnitStatus {
    match status {
        Some(s) if s.eq_ignore_ascii_case("Active") => UnitStatus::Active,
        Some(s) if s.eq_ignore_ascii_case("Obsolete") => UnitStatus::Obsolete,
        _ => UnitStatus::Draft,
    }
}

fn read_variables<N: SourceNode>(root: &N) -> Vec<VariableDecl> {
    root.nodes(keys::VARIABLES)
        .into_iter()
        .filter_map(|v| {
            Some(VariableDecl {
                name: v.text(keys::NAME)?,
                data_type: v.text(keys::DATA_TYPE),
                object_type: v.text(keys::OBJECT_TYPE),
                is_collection: flag(v, keys::IS_COLLECTION),
            })
        })
        .collect()
}

fn build_body<N: SourceNode>(kind: ElementKind, tag: &str, node: &N) -> ElementBody {
    match kind {
        ElementKind::Lookup => ElementBody::Lookup {
            object: node.text(keys::OBJECT),
            filters: filters(node),
            outputs: node
                .nodes(keys::OUTPUT_ASSIGNMENTS)
                .into_iter()
                .filter_map(|o| {
                    Some(OutputBinding {
                        field: o.text(keys::FIELD)?,
                        target: o.text(keys::ASSIGN_TO_REFERENCE),
                    })
                })
                .collect(),
            queried_fields: node.texts(keys::QUERIED_FIELDS),
            output_reference: node.text(keys::OUTPUT_REFERENCE),
            stores_output: flag(node, keys::STORE_OUTPUT_AUTOMATICALLY),
        },
        ElementKind::Create => ElementBody::Create {
            object: node.text(keys::OBJECT),
            inputs: mappings(node),
            input_reference: node.text(keys::INPUT_REFERENCE),
        },
        ElementKind::Update => ElementBody::Update {
            object: node.text(keys::OBJECT),
            filters: filters(node),
            inputs: mappings(node),
            input_reference: node.text(keys::INPUT_REFERENCE),
        },
        ElementKind::Delete => ElementBody::Delete {
            object: node.text(keys::OBJECT),
            filters: filters(node),
            input_reference: node.text(keys::INPUT_REFERENCE),
        },
        ElementKind::Decision => ElementBody::Decision {
            rules: node
                .nodes(keys::RULES)
                .into_iter()
                .map(|rule| DecisionRule {
                    name: rule.text(keys::NAME),
                    conditions: rule
                        .nodes(keys::CONDITIONS)
                        .into_iter()
                        .filter_map(|c| {
                            Some(Condition {
                                left: c.text(keys::LEFT_VALUE_REFERENCE)?,
                                operator: c.text(keys::OPERATOR),
                                right: value_of(c, keys::RIGHT_VALUE),
                            })
                        })
                        .collect(),
                })
                .collect(),
        },
        ElementKind::Assignment => ElementBody::Assignment {
            items: node
                .nodes(keys::ASSIGNMENT_ITEMS)
                .into_iter()
                .filter_map(|item| {
                    Some(AssignmentItem {
                        target: item.text(keys::ASSIGN_TO_REFERENCE)?,
                        operator: item.text(keys::OPERATOR),
                        value: value_of(item, keys::VALUE),
                    })
                })
                .collect(),
        },
        ElementKind::Loop => ElementBody::Loop {
            collection_reference: node.text(keys::COLLECTION_REFERENCE),
        },
        ElementKind::Other => ElementBody::Other {
            source_tag: tag.to_string(),
        },
    }
}

fn filters<N: SourceNode>(node: &N) -> Vec<RecordFilter> {
    node.nodes(keys::FILTERS)
        .into_iter()
        .filter_map(|f| {
            Some(RecordFilter {
                field: f.text(keys::FIELD)?,
                operator: f.text(keys::OPERATOR),
                value: value_of(f, keys::VALUE),
            })
        })
        .collect()
}

fn mappings<N: SourceNode>(node: &N) -> Vec<FieldMapping> {
    node.nodes(keys::INPUT_ASSIGNMENTS)
        .into_iter()
        .filter_map(|m| {
            Some(FieldMapping {
                field: m.text(keys::FIELD)?,
                value: value_of(m, keys::VALUE),
            })
        })
        .collect()
}

fn value_of<N: SourceNode>(node: &N, key: &str) -> Option<FlowValue> {
    let value = node.nodes(key).into_iter().next()?;
    if let Some(reference) = value.text(keys::ELEMENT_REFERENCE) {
        return Some(FlowValue::Reference(reference));
    }
    if let Some(text) = value.text(keys::STRING_VALUE) {
        return Some(FlowValue::Text(text));
    }
    Some(FlowValue::Constant)
}

fn flag<N: SourceNode>(node: &N, key: &str) -> bool {
    node.text(key)
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}
