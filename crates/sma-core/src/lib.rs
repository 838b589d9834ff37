//! SMA core: flow field-dependency extraction and the dependency graph.
//!
//! Raw flow definitions arrive from a transport collaborator in one of two
//! serializations. They are detected, normalized into a canonical element
//! tree, scanned for field references and persisted as a bidirectional
//! dependency graph.

pub mod batch;
pub mod config;
pub mod context;
pub mod extract;
pub mod flow;
pub mod graph;

pub use batch::{
    BatchOrchestrator, BatchReport, ManifestSource, SourceError, Stage, UnitErrorKind,
    UnitFailure, UnitOutcome, UnitSource, UnitState,
};
pub use config::{Config, ConfigError, ExtractionConfig, LoggingConfig, StorageConfig};
pub use context::OrgContext;
pub use extract::{
    extract_facts, Direction, Extraction, ExtractionWarning, FieldReferenceFact, NoResolver,
    VariableResolver,
};
pub use flow::{
    CanonicalElement, ElementBody, ElementKind, FlowError, NormalizedFlow, ParserRegistry,
    RawFormat, RawPayload, RawUnit,
};
pub use graph::{
    AutomationUnit, CoverageAggregate, CoverageScope, DependencyEdge, DependentKind,
    DependentReference, GraphError, GraphStats, GraphStore, ReferenceType, SurrealGraphStore,
};
