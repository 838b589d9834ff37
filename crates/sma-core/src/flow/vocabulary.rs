//! Source vocabulary shared by both payload formats.
//!
//! The markup and document serializations use the same names for element
//! collections and their properties. Classification of a source name into an
//! [`ElementKind`] happens only here.

use super::model::ElementKind;

/// Root tag of a legacy flow definition.
pub const ROOT_ELEMENT: &str = "Flow";

/// Envelope key wrapping the definition in tooling responses.
pub const METADATA_ENVELOPE: &str = "Metadata";

/// Element collections that carry field references.
const DATA_ELEMENT_TAGS: &[(&str, ElementKind)] = &[
    ("recordLookups", ElementKind::Lookup),
    ("recordCreates", ElementKind::Create),
    ("recordUpdates", ElementKind::Update),
    ("recordDeletes", ElementKind::Delete),
    ("decisions", ElementKind::Decision),
    ("assignments", ElementKind::Assignment),
    ("loops", ElementKind::Loop),
];

/// Element collections counted as `other`.
const OTHER_ELEMENT_TAGS: &[&str] = &[
    "actionCalls",
    "apexPluginCalls",
    "collectionProcessors",
    "customErrors",
    "orchestratedStages",
    "recordRollbacks",
    "screens",
    "steps",
    "subflows",
    "transforms",
    "waits",
];

/// Resource declarations; not elements.
const DECLARATION_TAGS: &[&str] = &[
    "variables",
    "formulas",
    "constants",
    "textTemplates",
    "choices",
    "dynamicChoiceSets",
    "stages",
];

/// Flow-level attributes; not elements.
const ATTRIBUTE_TAGS: &[&str] = &[
    "apiVersion",
    "description",
    "environments",
    "fullName",
    "interviewLabel",
    "isAdditionalPermissionRequiredToRun",
    "isTemplate",
    "label",
    "migratedFromWorkflowRuleName",
    "processMetadataValues",
    "processType",
    "runInMode",
    "sourceTemplate",
    "start",
    "startElementReference",
    "status",
    "timeZoneSidKey",
    "triggerOrder",
];

/// Top-level keys that mark a structured document as a flow definition.
pub const DOCUMENT_MARKER_KEYS: &[&str] = &["processType", "start", "status", "apiVersion", "label"];

/// Property names inside elements and declarations.
pub mod keys {
    pub const NAME: &str = "name";
    pub const OBJECT: &str = "object";
    pub const FILTERS: &str = "filters";
    pub const FIELD: &str = "field";
    pub const OPERATOR: &str = "operator";
    pub const VALUE: &str = "value";
    pub const INPUT_ASSIGNMENTS: &str = "inputAssignments";
    pub const OUTPUT_ASSIGNMENTS: &str = "outputAssignments";
    pub const ASSIGN_TO_REFERENCE: &str = "assignToReference";
    pub const QUERIED_FIELDS: &str = "queriedFields";
    pub const OUTPUT_REFERENCE: &str = "outputReference";
    pub const STORE_OUTPUT_AUTOMATICALLY: &str = "storeOutputAutomatically";
    pub const INPUT_REFERENCE: &str = "inputReference";
    pub const RULES: &str = "rules";
    pub const CONDITIONS: &str = "conditions";
    pub const LEFT_VALUE_REFERENCE: &str = "leftValueReference";
    pub const RIGHT_VALUE: &str = "rightValue";
    pub const ASSIGNMENT_ITEMS: &str = "assignmentItems";
    pub const COLLECTION_REFERENCE: &str = "collectionReference";

    pub const ELEMENT_REFERENCE: &str = "elementReference";
    pub const STRING_VALUE: &str = "stringValue";

    pub const PROCESS_TYPE: &str = "processType";
    pub const STATUS: &str = "status";
    pub const LABEL: &str = "label";
    pub const API_VERSION: &str = "apiVersion";
    pub const DESCRIPTION: &str = "description";
    pub const START: &str = "start";
    pub const TRIGGER_TYPE: &str = "triggerType";
    pub const PROCESS_METADATA_VALUES: &str = "processMetadataValues";

    pub const VARIABLES: &str = "variables";
    pub const DATA_TYPE: &str = "dataType";
    pub const OBJECT_TYPE: &str = "objectType";
    pub const IS_COLLECTION: &str = "isCollection";
}

/// How a top-level source name is treated during normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagClass {
    /// An element collection of the given kind.
    Element(ElementKind),
    /// Variable/formula/constant declarations.
    Declaration,
    /// Flow-level attribute.
    Attribute,
    /// Unknown name; structural entries become `other` elements.
    Unrecognized,
}

/// Classify a top-level tag or document key.
pub fn classify(tag: &str) -> TagClass {
    if let Some(kind) = kind_for_tag(tag) {
        return TagClass::Element(kind);
    }
    if OTHER_ELEMENT_TAGS.contains(&tag) {
        return TagClass::Element(ElementKind::Other);
    }
    if DECLARATION_TAGS.contains(&tag) {
        return TagClass::Declaration;
    }
    if ATTRIBUTE_TAGS.contains(&tag) {
        return TagClass::Attribute;
    }
    TagClass::Unrecognized
}

/// Element kind of a data element collection tag.
pub fn kind_for_tag(tag: &str) -> Option<ElementKind> {
    DATA_ELEMENT_TAGS
        .iter()
        .find(|(t, _)| *t == tag)
        .map(|(_, kind)| *kind)
}

/// Source collection tag of a data element kind (`None` for `other`).
pub fn tag_for_kind(kind: ElementKind) -> Option<&'static str> {
    DATA_ELEMENT_TAGS
        .iter()
        .find(|(_, k)| *k == kind)
        .map(|(tag, _)| *tag)
}

/// True if the key is an element collection of any kind.
pub fn is_element_tag(tag: &str) -> bool {
    matches!(classify(tag), TagClass::Element(_))
}
