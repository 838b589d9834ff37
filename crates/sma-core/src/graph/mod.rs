//! Dependency graph for "what uses this field" and "what does this unit use".
//!
//! # Components
//!
//! - [`GraphStore`] - Store interface used by the orchestrator and query callers
//! - [`SurrealGraphStore`] - SurrealDB embedded implementation
//! - `projection` - Pure fact-to-edge and edge-to-coverage projections
//!
//! # Storage
//!
//! Uses SurrealDB embedded (RocksDB on disk, in-memory for tests), one
//! database per org. Stores:
//! - **automation_unit**: one row per stored flow version
//! - **field_ref**: field-reference facts, unique per unit version and element
//! - **dependency_edge**: cross-automation edges, unique per dependent and reference type
//! - **coverage**: materialized dependent counts per field and per entity
//!
//! Every lookup key pair is indexed so both query directions are index reads.

mod db;
mod error;
mod models;
mod projection;

pub use db::SurrealGraphStore;
pub use error::GraphError;
pub use models::{
    AutomationUnit, CoverageAggregate, CoverageScope, DependencyEdge, DependentKind,
    DependentReference, GraphStats, ReferenceType,
};

use async_trait::async_trait;

use crate::batch::BatchReport;
use crate::extract::FieldReferenceFact;

/// Persistent dependency graph.
///
/// Writes replace a whole unit (or dependent) at a time and are atomic;
/// reads never have side effects. A query for an entity or field with no
/// data returns an empty result.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Create tables and indexes. Safe to call again.
    async fn initialize(&self) -> Result<(), GraphError>;

    /// Check if the store has been initialized.
    async fn is_initialized(&self) -> Result<bool, GraphError>;

    /// Atomically replace the unit row and fact set of one unit version and
    /// re-project the unit's process edges.
    async fn replace_facts(
        &self,
        unit: &AutomationUnit,
        facts: &[FieldReferenceFact],
    ) -> Result<(), GraphError>;

    /// Atomically replace all edges of one non-process dependent.
    async fn replace_dependent_edges(
        &self,
        kind: DependentKind,
        dependent_id: &str,
        dependent_name: &str,
        refs: &[DependentReference],
    ) -> Result<(), GraphError>;

    /// Edges into one field, ordered by dependent kind, name, id and reference type.
    async fn dependents_of(
        &self,
        schema_entity: &str,
        field_name: &str,
    ) -> Result<Vec<DependencyEdge>, GraphError>;

    /// Facts of one unit across its stored versions, ordered by version,
    /// entity, field and element.
    async fn references_of(&self, dependent_id: &str) -> Result<Vec<FieldReferenceFact>, GraphError>;

    /// Rebuild coverage rows for the scope from the current edges.
    async fn recompute_coverage(&self, scope: &CoverageScope) -> Result<Vec<CoverageAggregate>, GraphError>;

    /// Read stored coverage rows for the scope.
    async fn get_coverage(&self, scope: &CoverageScope) -> Result<Vec<CoverageAggregate>, GraphError>;

    /// Persist the report of the latest batch run.
    async fn save_batch_report(&self, report: &BatchReport) -> Result<(), GraphError>;

    /// Report of the latest batch run, if any was saved.
    async fn latest_batch_report(&self) -> Result<Option<BatchReport>, GraphError>;

    /// Row counts per table.
    async fn stats(&self) -> Result<GraphStats, GraphError>;
}
