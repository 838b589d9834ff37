//! Record types stored in the dependency graph.

use serde::{Deserialize, Serialize};
use std::fmt;
use surrealdb::sql::Datetime;

use crate::flow::{ElementSummary, NormalizedFlow, ProcessKind, RawFormat, RawUnit, UnitStatus};

/// One stored flow version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationUnit {
    pub unit_id: String,
    pub version_number: u32,
    pub logical_name: String,
    pub kind: ProcessKind,
    pub trigger_object: Option<String>,
    pub status: UnitStatus,
    pub raw_format: RawFormat,
    pub element_summary: ElementSummary,
    pub label: Option<String>,
    pub api_version: Option<String>,
    /// SHA256 of the raw payload.
    pub payload_hash: String,
    /// When this version was last ingested.
    pub ingested_at: Datetime,
}

impl AutomationUnit {
    /// Build the stored unit from its descriptor and normalized form.
    pub fn from_flow(unit: &RawUnit, flow: &NormalizedFlow) -> Self {
        Self {
            unit_id: unit.unit_id.clone(),
            version_number: unit.version_number,
            logical_name: unit.logical_name.clone(),
            kind: flow.metadata.kind,
            trigger_object: flow.metadata.trigger_object.clone(),
            status: flow.metadata.status,
            raw_format: flow.format,
            element_summary: flow.summary.clone(),
            label: flow.metadata.label.clone(),
            api_version: flow.metadata.api_version.clone(),
            payload_hash: unit.raw_payload.hash(),
            ingested_at: Datetime::default(),
        }
    }
}

/// Kind of automation that depends on a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependentKind {
    Process,
    CodeTrigger,
    Validation,
    Other,
}

impl DependentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Process => "process",
            Self::CodeTrigger => "code_trigger",
            Self::Validation => "validation",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for DependentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a dependent references a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceType {
    Read,
    Write,
    Filter,
    Assignment,
}

impl ReferenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Filter => "filter",
            Self::Assignment => "assignment",
        }
    }
}

/// One `(field, dependent, reference type)` row of the cross-automation graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub schema_entity: String,
    pub field_name: String,
    pub dependent_kind: DependentKind,
    pub dependent_id: String,
    pub dependent_name: String,
    pub reference_type: ReferenceType,
    /// First time this edge was seen; kept across re-ingestion.
    pub discovered_at: Datetime,
    pub last_verified_at: Datetime,
}

/// A field reference reported by a non-process analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependentReference {
    pub schema_entity: String,
    pub field_name: String,
    pub reference_type: ReferenceType,
}

impl DependentReference {
    pub fn new(
        schema_entity: impl Into<String>,
        field_name: impl Into<String>,
        reference_type: ReferenceType,
    ) -> Self {
        Self {
            schema_entity: schema_entity.into(),
            field_name: field_name.into(),
            reference_type,
        }
    }
}

/// Distinct dependents per kind for one field, or for one entity when
/// `field_name` is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageAggregate {
    pub schema_entity: String,
    pub field_name: Option<String>,
    pub process_count: usize,
    pub code_trigger_count: usize,
    pub validation_count: usize,
    pub other_count: usize,
    pub total_count: usize,
    pub computed_at: Datetime,
}

/// Scope of a coverage recomputation or read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoverageScope {
    Global,
    Entity(String),
}

/// Row counts of the graph tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub units: usize,
    pub facts: usize,
    pub edges: usize,
    pub coverage_rows: usize,
}
